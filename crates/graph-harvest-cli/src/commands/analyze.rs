//! `graph-harvest non-followers`: compare two saved harvests.

use std::path::Path;

use anyhow::{bail, Context, Result};

use graph_harvest::{non_followers, HarvestReport, NonFollowerFilter, NonFollowerReport, Relation};

use super::read_json;

/// Build the filter from CLI flags and an optional whitelist file.
pub fn load_filter(include_verified: bool, whitelist: Option<&Path>) -> Result<NonFollowerFilter> {
    let filter = NonFollowerFilter::default().with_exclude_verified(!include_verified);
    let Some(path) = whitelist else {
        return Ok(filter);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read whitelist {}", path.display()))?;
    let handles = NonFollowerFilter::parse_whitelist(&text);
    tracing::debug!("whitelist {}: {} handles", path.display(), handles.len());
    Ok(filter.with_whitelist(handles))
}

/// Load a saved harvest and check it holds the expected relation.
pub fn load_harvest(path: &Path, expected: Relation) -> Result<HarvestReport> {
    let report: HarvestReport = read_json(path)?;
    if report.relation != expected {
        bail!(
            "{} holds {} but {} was expected",
            path.display(),
            report.relation,
            expected
        );
    }
    if report.possibly_incomplete() {
        tracing::warn!(
            "{} ended with {}; accounts missing from it will skew the result",
            path.display(),
            report.terminal
        );
    }
    Ok(report)
}

/// Accounts in `following` that are absent from `followers`.
pub fn run(
    followers: &HarvestReport,
    following: &HarvestReport,
    filter: &NonFollowerFilter,
) -> NonFollowerReport {
    if !followers.subject.eq_ignore_ascii_case(&following.subject) {
        tracing::warn!(
            "comparing followers of {} with following of {}",
            followers.subject,
            following.subject
        );
    }
    let report = non_followers(&followers.entities, &following.entities, filter);
    tracing::info!(
        "{} non-followers out of {} following ({} followers)",
        report.non_followers_count,
        report.total_following,
        report.total_followers
    );
    report
}
