//! Error taxonomy for strategies and jobs.

use std::time::Duration;

/// Failure of a single page, extraction pass, or action attempt.
///
/// These are recovered locally by the controller and the executor, except
/// `Unauthenticated` and `Cancelled`, which always propagate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// A prerequisite for this strategy is missing (e.g. no CSRF token).
    #[error("strategy unavailable: {0}")]
    Unavailable(String),

    /// The remote session is no longer valid.
    #[error("session is not authenticated")]
    Unauthenticated,

    /// The remote platform asked us to slow down.
    #[error("rate limited by remote platform")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeout, malformed response, missing control.
    #[error("transient remote error: {0}")]
    Transient(String),

    /// The job's cancellation token fired.
    #[error("cancelled")]
    Cancelled,
}

impl StrategyError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

impl From<anyhow::Error> for StrategyError {
    fn from(e: anyhow::Error) -> Self {
        Self::Transient(format!("{e:#}"))
    }
}

impl From<reqwest::Error> for StrategyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transient(format!("request timed out: {e}"))
        } else {
            Self::Transient(e.to_string())
        }
    }
}

/// Job-level harvest failure. A failed harvest yields zero entities.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HarvestError {
    /// Redirected to a login surface; restart with a fresh session.
    #[error("session is not authenticated")]
    Unauthenticated,

    /// The rendered-surface strategy failed and nothing else was left to try.
    #[error("rendered surface failed: {cause}")]
    Surface { cause: String },

    /// The rendering resource could not be acquired.
    #[error("rendering resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),
}

impl HarvestError {
    /// Short machine-friendly reason, used by sinks and the CLI.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Surface { .. } => "surface_failed",
            Self::ResourceUnavailable(_) => "resource_unavailable",
            Self::InvalidJob(_) => "invalid_job",
        }
    }
}

pub type StrategyResult<T> = Result<T, StrategyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_maps_to_transient() {
        let e: StrategyError = anyhow::anyhow!("navigation timed out after 100ms").into();
        assert_eq!(
            e,
            StrategyError::Transient("navigation timed out after 100ms".into())
        );
    }

    #[test]
    fn test_harvest_error_reason() {
        let e = HarvestError::Surface {
            cause: "list container never appeared".into(),
        };
        assert_eq!(e.reason(), "surface_failed");
        assert!(e.to_string().contains("never appeared"));
    }
}
