//! Non-follower analysis over two harvest results.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::Entity;

/// Which accounts to leave out of the non-follower list.
#[derive(Debug, Clone)]
pub struct NonFollowerFilter {
    pub exclude_verified: bool,
    /// Lower-cased handles that are never reported.
    whitelist: HashSet<String>,
}

impl Default for NonFollowerFilter {
    fn default() -> Self {
        Self {
            exclude_verified: true,
            whitelist: HashSet::new(),
        }
    }
}

impl NonFollowerFilter {
    pub fn with_exclude_verified(mut self, exclude: bool) -> Self {
        self.exclude_verified = exclude;
        self
    }

    pub fn with_whitelist<I, S>(mut self, handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.whitelist.extend(
            handles
                .into_iter()
                .map(|h| normalize(h.as_ref()))
                .filter(|h| !h.is_empty()),
        );
        self
    }

    /// Parse a whitelist file: one handle per line, `#` starts a comment.
    pub fn parse_whitelist(text: &str) -> Vec<String> {
        text.lines()
            .map(|l| l.split('#').next().unwrap_or("").trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_whitelisted(&self, handle: &str) -> bool {
        self.whitelist.contains(&normalize(handle))
    }

    fn keeps(&self, e: &Entity) -> bool {
        !(self.exclude_verified && e.is_verified) && !self.is_whitelisted(&e.handle)
    }
}

fn normalize(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_ascii_lowercase()
}

/// Result of comparing the two relations of one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonFollowerReport {
    pub total_followers: usize,
    pub total_following: usize,
    pub non_followers: Vec<Entity>,
    pub non_followers_count: usize,
}

/// Accounts in `following` that do not appear in `followers`, in
/// `following` order, after applying `filter`.
pub fn non_followers(
    followers: &[Entity],
    following: &[Entity],
    filter: &NonFollowerFilter,
) -> NonFollowerReport {
    let follower_set: HashSet<String> = followers.iter().map(|e| normalize(&e.handle)).collect();

    let mut seen = HashSet::new();
    let non_followers: Vec<Entity> = following
        .iter()
        .filter(|e| !follower_set.contains(&normalize(&e.handle)))
        .filter(|e| filter.keeps(e))
        .filter(|e| seen.insert(normalize(&e.handle)))
        .cloned()
        .collect();

    NonFollowerReport {
        total_followers: followers.len(),
        total_following: following.len(),
        non_followers_count: non_followers.len(),
        non_followers,
    }
}
