//! Sequential, paced execution of unfollow batches.
//!
//! Targets are processed strictly in input order, one at a time. A direct
//! endpoint call is used when the target's remote id is known and the
//! session can authenticate it; otherwise the profile is driven through the
//! rendered surface, acquired once per batch on first need.

use std::sync::Arc;

use crate::error::StrategyError;
use crate::pacing::{guarded, Pacer};
use crate::source::{EndpointSource, SurfaceProvider, SurfaceSource};
use crate::types::{ActionJob, ActionTarget, BatchReport, ExecutionPath, Interruption, Outcome};

/// What happened to one target.
enum Step {
    Done(Outcome),
    /// The target got an outcome, and the batch must stop after it.
    Halt(Outcome, Interruption),
    /// Stopped before the target produced anything.
    Stop(Interruption),
}

/// Per-batch surface state.
#[derive(Default)]
struct SurfaceSlot {
    surface: Option<Box<dyn SurfaceSource>>,
    /// Acquisition already failed in this batch; do not relaunch.
    unavailable: Option<String>,
}

/// Runs unfollow batches.
pub struct ActionExecutor {
    endpoint: Option<Arc<dyn EndpointSource>>,
    surfaces: Arc<dyn SurfaceProvider>,
    pacer: Pacer,
}

impl ActionExecutor {
    pub fn new(
        endpoint: Option<Arc<dyn EndpointSource>>,
        surfaces: Arc<dyn SurfaceProvider>,
    ) -> Self {
        Self {
            endpoint,
            surfaces,
            pacer: Pacer::default(),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Run every target of `job`, pausing between consecutive targets.
    ///
    /// Never fails as a whole. Item failures are recorded and processing
    /// continues; cancellation and an expired session stop the batch and
    /// are reported through [`BatchReport::interruption`].
    pub async fn run_batch(&self, job: ActionJob) -> BatchReport {
        tracing::info!(
            "batch {}: {} target(s), delay {:?}..{:?}, {} already used today",
            job.id,
            job.targets.len(),
            job.delay.min,
            job.delay.max,
            job.quota_consumed
        );

        let mut slot = SurfaceSlot::default();
        let (outcomes, interruption) = self.drive(&job, &mut slot).await;

        if let Some(surface) = slot.surface.take() {
            if let Err(e) = surface.close().await {
                tracing::warn!("batch {}: failed to release rendered surface: {e}", job.id);
            }
        }

        let report = BatchReport::new(job.id.clone(), job.targets.len(), outcomes, interruption);
        match report.interruption {
            Some(why) => tracing::warn!(
                "batch {}: interrupted ({why:?}) after {}/{} target(s): {} ok, {} failed",
                job.id,
                report.summary.total,
                report.requested,
                report.summary.successful,
                report.summary.failed
            ),
            None => tracing::info!(
                "batch {}: done, {} ok, {} failed",
                job.id,
                report.summary.successful,
                report.summary.failed
            ),
        }
        report
    }

    async fn drive(
        &self,
        job: &ActionJob,
        slot: &mut SurfaceSlot,
    ) -> (Vec<Outcome>, Option<Interruption>) {
        let mut outcomes = Vec::with_capacity(job.targets.len());
        let last = job.targets.len().saturating_sub(1);

        for (i, target) in job.targets.iter().enumerate() {
            if job.cancel.is_cancelled() {
                return (outcomes, Some(Interruption::Cancelled));
            }

            match self.execute(job, target, slot).await {
                Step::Done(outcome) => {
                    log_outcome(&job.id, &outcome);
                    outcomes.push(outcome);
                }
                Step::Halt(outcome, why) => {
                    log_outcome(&job.id, &outcome);
                    outcomes.push(outcome);
                    return (outcomes, Some(why));
                }
                Step::Stop(why) => return (outcomes, Some(why)),
            }

            if i < last {
                match self.pacer.pause(&job.delay, &job.cancel).await {
                    Ok(d) => tracing::debug!("batch {}: waited {:?} before next target", job.id, d),
                    Err(_) => return (outcomes, Some(Interruption::Cancelled)),
                }
            }
        }
        (outcomes, None)
    }

    async fn execute(
        &self,
        job: &ActionJob,
        target: &ActionTarget,
        slot: &mut SurfaceSlot,
    ) -> Step {
        let endpoint = self
            .endpoint
            .as_ref()
            .filter(|_| job.session.csrf_token().is_some());

        if let (Some(endpoint), Some(remote_id)) = (endpoint, target.remote_id.as_deref()) {
            let r = guarded(&job.cancel, endpoint.unfollow(&job.session, remote_id)).await;
            return settle_step(&target.handle, ExecutionPath::Endpoint, r);
        }

        if let Some(reason) = &slot.unavailable {
            return Step::Done(Outcome::failed(
                &target.handle,
                ExecutionPath::Surface,
                reason.clone(),
            ));
        }
        if slot.surface.is_none() {
            match guarded(&job.cancel, self.surfaces.acquire(&job.session, job.headless)).await {
                Ok(s) => slot.surface = Some(s),
                Err(StrategyError::Cancelled) => return Step::Stop(Interruption::Cancelled),
                Err(e) => {
                    let fatal = e == StrategyError::Unauthenticated;
                    let reason = format!("rendering resource unavailable: {e}");
                    let outcome =
                        Outcome::failed(&target.handle, ExecutionPath::Surface, reason.clone());
                    if fatal {
                        return Step::Halt(outcome, Interruption::Unauthenticated);
                    }
                    tracing::warn!("batch {}: {reason}", job.id);
                    slot.unavailable = Some(reason);
                    return Step::Done(outcome);
                }
            }
        }

        let Some(surface) = slot.surface.as_mut() else {
            return Step::Stop(Interruption::Cancelled);
        };
        let r = guarded(&job.cancel, surface.unfollow(&target.handle)).await;
        settle_step(&target.handle, ExecutionPath::Surface, r)
    }
}

fn settle_step(handle: &str, path: ExecutionPath, r: Result<(), StrategyError>) -> Step {
    match r {
        Ok(()) => Step::Done(Outcome::ok(handle, path)),
        Err(StrategyError::Cancelled) => Step::Halt(
            Outcome::failed(handle, path, "cancelled before completion"),
            Interruption::Cancelled,
        ),
        Err(StrategyError::Unauthenticated) => Step::Halt(
            Outcome::failed(handle, path, StrategyError::Unauthenticated.to_string()),
            Interruption::Unauthenticated,
        ),
        Err(e) => Step::Done(Outcome::failed(handle, path, e.to_string())),
    }
}

fn log_outcome(job_id: &str, outcome: &Outcome) {
    match &outcome.error_reason {
        None => tracing::info!(
            "batch {job_id}: unfollowed @{} via {:?}",
            outcome.handle,
            outcome.path
        ),
        Some(reason) => tracing::warn!(
            "batch {job_id}: unfollow @{} via {:?} failed: {reason}",
            outcome.handle,
            outcome.path
        ),
    }
}
