//! Core data types for harvest and action jobs.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::session::SessionCarrier;

/// A harvested account record.
///
/// `handle` is the natural key: it is unique within one harvest result.
/// The structured-endpoint-only fields stay `None` when the rendered
/// surface produced the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub is_private_account: Option<bool>,
    #[serde(default)]
    pub has_default_avatar: Option<bool>,
}

impl Entity {
    /// A record carrying nothing but its handle.
    pub fn bare(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            display_name: None,
            is_verified: false,
            avatar_url: None,
            remote_id: None,
            is_private_account: None,
            has_default_avatar: None,
        }
    }
}

/// Which side of the social graph to harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Followers,
    Following,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Followers => "followers",
            Self::Following => "following",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "followers" => Ok(Self::Followers),
            "following" => Ok(Self::Following),
            other => Err(format!("unknown relation '{other}' (expected followers|following)")),
        }
    }
}

/// An inclusive `[min, max]` delay range. Draws are uniform within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    /// Build a range, swapping the bounds if they arrive reversed.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    /// A range that never sleeps.
    pub fn zero() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn contains(&self, d: Duration) -> bool {
        d >= self.min && d <= self.max
    }
}

/// Input to one harvest invocation. Lives only for the duration of the call.
#[derive(Debug, Clone)]
pub struct HarvestJob {
    pub id: String,
    pub subject: String,
    pub relation: Relation,
    /// `None` means effectively unbounded.
    pub upper_bound: Option<usize>,
    pub session: SessionCarrier,
    pub headless: bool,
    pub cancel: CancellationToken,
}

impl HarvestJob {
    pub fn new(subject: impl Into<String>, relation: Relation, session: SessionCarrier) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject: subject.into().trim().trim_start_matches('@').to_string(),
            relation,
            upper_bound: None,
            session,
            headless: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_upper_bound(mut self, bound: Option<usize>) -> Self {
        self.upper_bound = bound;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The bound as a concrete count.
    pub fn limit(&self) -> usize {
        self.upper_bound.unwrap_or(usize::MAX)
    }
}

/// Which acquisition strategy produced a harvest result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Endpoint,
    Surface,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint => f.write_str("endpoint"),
            Self::Surface => f.write_str("surface"),
        }
    }
}

/// Why a harvest loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The structured endpoint reported no further pages.
    Exhausted,
    /// The requested upper bound was reached.
    UpperBound,
    /// The idle-round threshold was reached on the rendered surface.
    IdleRounds,
    /// A hard iteration ceiling stopped the loop. Possibly incomplete.
    SafetyLimit,
    /// The endpoint failed after at least one good page; partial result.
    EndpointInterrupted,
    /// The caller cancelled; partial result.
    Cancelled,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exhausted => "exhausted",
            Self::UpperBound => "upper_bound",
            Self::IdleRounds => "idle_rounds",
            Self::SafetyLimit => "safety_limit",
            Self::EndpointInterrupted => "endpoint_interrupted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Result of a harvest job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub job_id: String,
    pub subject: String,
    pub relation: Relation,
    pub entities: Vec<Entity>,
    pub count: usize,
    pub strategy: StrategyKind,
    pub terminal: TerminalReason,
}

impl HarvestReport {
    pub fn cancelled(&self) -> bool {
        self.terminal == TerminalReason::Cancelled
    }

    /// Whether the list may be missing entries.
    pub fn possibly_incomplete(&self) -> bool {
        matches!(
            self.terminal,
            TerminalReason::SafetyLimit
                | TerminalReason::EndpointInterrupted
                | TerminalReason::Cancelled
        )
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.handle.as_str())
    }
}

/// One account to act upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTarget {
    pub handle: String,
    #[serde(default)]
    pub remote_id: Option<String>,
}

impl ActionTarget {
    pub fn handle(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            remote_id: None,
        }
    }

    pub fn with_remote_id(handle: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            remote_id: Some(remote_id.into()),
        }
    }
}

impl From<&Entity> for ActionTarget {
    fn from(e: &Entity) -> Self {
        Self {
            handle: e.handle.clone(),
            remote_id: e.remote_id.clone(),
        }
    }
}

/// A pre-validated batch of mutating actions.
///
/// Quota admission happens before the job is built; the executor never
/// re-checks `quota_consumed`.
#[derive(Debug, Clone)]
pub struct ActionJob {
    pub id: String,
    pub targets: Vec<ActionTarget>,
    pub delay: DelayRange,
    pub quota_consumed: u32,
    pub session: SessionCarrier,
    pub headless: bool,
    pub cancel: CancellationToken,
}

impl ActionJob {
    pub fn new(targets: Vec<ActionTarget>, delay: DelayRange, session: SessionCarrier) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            targets,
            delay,
            quota_consumed: 0,
            session,
            headless: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_quota_consumed(mut self, consumed: u32) -> Self {
        self.quota_consumed = consumed;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// How a single action was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Direct call against the structured endpoint.
    Endpoint,
    /// Driven through the rendered profile page.
    Surface,
}

/// Per-item result of a mutating action. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub handle: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub path: ExecutionPath,
}

impl Outcome {
    pub fn ok(handle: impl Into<String>, path: ExecutionPath) -> Self {
        Self {
            handle: handle.into(),
            succeeded: true,
            error_reason: None,
            timestamp: Utc::now(),
            path,
        }
    }

    pub fn failed(
        handle: impl Into<String>,
        path: ExecutionPath,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            handle: handle.into(),
            succeeded: false,
            error_reason: Some(reason.into()),
            timestamp: Utc::now(),
            path,
        }
    }
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let successful = outcomes.iter().filter(|o| o.succeeded).count();
        Self {
            total: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
        }
    }
}

/// Why a batch stopped before its last target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    Cancelled,
    Unauthenticated,
}

/// Result of an action batch: one outcome per processed target, input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub job_id: String,
    pub requested: usize,
    pub outcomes: Vec<Outcome>,
    pub summary: BatchSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruption: Option<Interruption>,
}

impl BatchReport {
    pub fn new(
        job_id: String,
        requested: usize,
        outcomes: Vec<Outcome>,
        interruption: Option<Interruption>,
    ) -> Self {
        let summary = BatchSummary::from_outcomes(&outcomes);
        Self {
            job_id,
            requested,
            outcomes,
            summary,
            interruption,
        }
    }

    pub fn cancelled(&self) -> bool {
        self.interruption == Some(Interruption::Cancelled)
    }

    /// True only when every requested target produced a successful outcome.
    pub fn succeeded(&self) -> bool {
        self.interruption.is_none()
            && self.outcomes.len() == self.requested
            && self.summary.failed == 0
    }
}
