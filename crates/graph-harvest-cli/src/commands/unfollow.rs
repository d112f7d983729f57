//! `graph-harvest unfollow`: quota-checked, paced unfollow batches.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use graph_harvest::{
    ActionJob, ActionTarget, BatchReport, DailyQuota, DelayRange, Entity, ResultSink,
};

use super::Engine;

/// Shapes accepted by `--from`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TargetFile {
    NonFollowers { non_followers: Vec<Entity> },
    Harvest { entities: Vec<Entity> },
    Targets(Vec<ActionTarget>),
    Handles(Vec<String>),
}

/// Parse targets from a file body.
///
/// JSON input may be a non-follower report, a harvest report, an array of
/// `{handle, remoteId}` objects, or an array of handles. Anything else is
/// read as one handle per line with `#` comments.
pub fn parse_targets(text: &str) -> Result<Vec<ActionTarget>> {
    let trimmed = text.trim_start();
    let targets = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let parsed: TargetFile =
            serde_json::from_str(text).context("unrecognized JSON target list")?;
        match parsed {
            TargetFile::NonFollowers {
                non_followers: entities,
            }
            | TargetFile::Harvest { entities } => entities.iter().map(ActionTarget::from).collect(),
            TargetFile::Targets(targets) => targets,
            TargetFile::Handles(handles) => handles.into_iter().map(ActionTarget::handle).collect(),
        }
    } else {
        text.lines()
            .map(|l| l.split('#').next().unwrap_or("").trim())
            .filter(|l| !l.is_empty())
            .map(ActionTarget::handle)
            .collect()
    };
    Ok(dedup_targets(targets))
}

/// Normalize handles and drop repeats, keeping the first occurrence.
pub fn dedup_targets(targets: Vec<ActionTarget>) -> Vec<ActionTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter_map(|mut t| {
            t.handle = t.handle.trim().trim_start_matches('@').to_string();
            if t.handle.is_empty() || !seen.insert(t.handle.to_ascii_lowercase()) {
                return None;
            }
            Some(t)
        })
        .collect()
}

/// An admitted batch, ready to execute.
#[derive(Debug, Clone, Serialize)]
pub struct BatchPlan {
    pub targets: Vec<ActionTarget>,
    pub delay: DelayRange,
    pub consumed_today: u32,
    pub daily_limit: u32,
    pub remaining_after: u32,
}

/// Admit `targets` against the daily quota.
pub fn plan(
    targets: Vec<ActionTarget>,
    delay: DelayRange,
    quota: DailyQuota,
    consumed_today: u32,
) -> Result<BatchPlan> {
    if targets.is_empty() {
        bail!("no targets to unfollow");
    }
    let requested = u32::try_from(targets.len()).unwrap_or(u32::MAX);
    quota.admit(consumed_today, requested)?;

    Ok(BatchPlan {
        targets,
        delay,
        consumed_today,
        daily_limit: quota.limit,
        remaining_after: quota.remaining(consumed_today.saturating_add(requested)),
    })
}

/// Execute an admitted plan through the job pool and record every outcome.
pub async fn execute<S: ResultSink>(
    engine: &Engine,
    sink: &mut S,
    plan: BatchPlan,
    headless: bool,
    cancel: CancellationToken,
) -> Result<BatchReport> {
    let job = ActionJob::new(plan.targets, plan.delay, engine.session.clone())
        .with_quota_consumed(plan.consumed_today)
        .with_headless(headless)
        .with_cancel(cancel);

    let executor = engine.executor();
    let report = engine.pool().run(executor.run_batch(job)).await?;

    sink.record_batch(&report)
        .context("failed to write audit log")?;

    if let Some(interruption) = report.interruption {
        tracing::warn!(
            "batch {} interrupted ({interruption:?}) after {} of {} targets",
            report.job_id,
            report.outcomes.len(),
            report.requested
        );
    }
    Ok(report)
}
