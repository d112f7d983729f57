//! Session carrier, the authenticated cookie bundle handed to every job.
//!
//! Treated as read-only within a job: strategies render it into request
//! headers or browser cookies, but never write it back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cookie name holding the CSRF-equivalent token.
pub const CSRF_COOKIE: &str = "csrftoken";

/// Cookie domain applied when an exported cookie carries none.
pub const DEFAULT_COOKIE_DOMAIN: &str = ".instagram.com";

/// A single cookie. Extra fields from browser exports are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
        }
    }
}

/// Opaque authenticated credential set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCarrier {
    pub cookies: Vec<Cookie>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    Wrapped { cookies: Vec<Cookie> },
    Bare(Vec<Cookie>),
}

impl SessionCarrier {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    /// Parse either `[{name, value, ...}]` or `{"cookies": [...]}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: SessionFile =
            serde_json::from_str(raw).context("session file is not a cookie list")?;
        let cookies = match parsed {
            SessionFile::Wrapped { cookies } | SessionFile::Bare(cookies) => cookies,
        };
        Ok(Self { cookies })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session file: {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid session file: {}", path.display()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// The CSRF token, required for structured-endpoint eligibility.
    pub fn csrf_token(&self) -> Option<&str> {
        self.get(CSRF_COOKIE)
    }

    /// Render all cookies into a single `Cookie:` header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}
