//! Harvest controller: strategy selection, pagination, termination, fallback.
//!
//! The structured endpoint is tried first whenever the session carries a
//! CSRF token. If it never produces a single good page, the rendered
//! surface takes over for the rest of the job. Results accumulate in one
//! [`EntityAccumulator`], so first-seen order and the upper bound hold
//! regardless of which strategy produced them.

use std::sync::Arc;

use crate::config::{HarvestConfig, RateLimitPolicy};
use crate::dedup::EntityAccumulator;
use crate::error::{HarvestError, StrategyError, StrategyResult};
use crate::pacing::{guarded, Pacer};
use crate::source::{EndpointPage, EndpointSource, SurfaceProvider, SurfaceSource};
use crate::types::{HarvestJob, HarvestReport, StrategyKind, TerminalReason};

/// How the endpoint phase ended.
enum EndpointRun {
    /// At least one page arrived (or the job was cancelled); the job is done.
    Finished(TerminalReason),
    /// Not a single page arrived; hand over to the rendered surface.
    NeverSucceeded(StrategyError),
    Unauthenticated,
}

/// Runs harvest jobs. Cheap to share; holds no per-job state.
pub struct Harvester {
    endpoint: Option<Arc<dyn EndpointSource>>,
    surfaces: Arc<dyn SurfaceProvider>,
    config: HarvestConfig,
    pacer: Pacer,
}

impl Harvester {
    pub fn new(
        endpoint: Option<Arc<dyn EndpointSource>>,
        surfaces: Arc<dyn SurfaceProvider>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            endpoint,
            surfaces,
            config,
            pacer: Pacer::default(),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Harvest `job.relation` of `job.subject`.
    ///
    /// Cancellation is not an error: the entities gathered so far come back
    /// with [`TerminalReason::Cancelled`].
    pub async fn harvest(&self, job: HarvestJob) -> Result<HarvestReport, HarvestError> {
        if job.subject.is_empty() {
            return Err(HarvestError::InvalidJob("empty subject handle".into()));
        }
        if job.upper_bound == Some(0) {
            return Err(HarvestError::InvalidJob("upper bound must be positive".into()));
        }

        tracing::info!(
            "harvest {}: {} of @{} started (upper bound {:?})",
            job.id,
            job.relation,
            job.subject,
            job.upper_bound
        );

        let mut acc = EntityAccumulator::new(job.limit());
        let result = self.run(&job, &mut acc).await;

        match result {
            Ok((strategy, terminal)) => {
                let report = build_report(&job, acc, strategy, terminal);
                tracing::info!(
                    "harvest {}: finished via {} with {} entities ({})",
                    job.id,
                    strategy,
                    report.count,
                    terminal
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("harvest {}: failed: {e}", job.id);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &HarvestJob,
        acc: &mut EntityAccumulator,
    ) -> Result<(StrategyKind, TerminalReason), HarvestError> {
        match (&self.endpoint, job.session.csrf_token()) {
            (Some(endpoint), Some(_)) => {
                tracing::info!("harvest {}: using structured endpoint", job.id);
                match self.run_endpoint(endpoint.as_ref(), job, acc).await {
                    EndpointRun::Finished(terminal) => {
                        return Ok((StrategyKind::Endpoint, terminal))
                    }
                    EndpointRun::Unauthenticated => return Err(HarvestError::Unauthenticated),
                    EndpointRun::NeverSucceeded(cause) => {
                        tracing::info!(
                            "harvest {}: endpoint unusable ({cause}), falling back to surface",
                            job.id
                        );
                    }
                }
            }
            (None, _) => {
                tracing::info!(
                    "harvest {}: no endpoint configured, using rendered surface",
                    job.id
                );
            }
            (Some(_), None) => {
                tracing::info!(
                    "harvest {}: session has no CSRF token, using rendered surface",
                    job.id
                );
            }
        }

        if job.cancel.is_cancelled() {
            return Ok((StrategyKind::Surface, TerminalReason::Cancelled));
        }
        self.run_surface(job, acc)
            .await
            .map(|terminal| (StrategyKind::Surface, terminal))
    }

    // ─── structured endpoint ───

    async fn run_endpoint(
        &self,
        endpoint: &dyn EndpointSource,
        job: &HarvestJob,
        acc: &mut EntityAccumulator,
    ) -> EndpointRun {
        let cancel = &job.cancel;

        let resolved = guarded(cancel, endpoint.resolve_subject(&job.session, &job.subject)).await;
        let subject_id = match resolved {
            Ok(id) => id,
            Err(StrategyError::Cancelled) => {
                return EndpointRun::Finished(TerminalReason::Cancelled)
            }
            Err(StrategyError::Unauthenticated) => return EndpointRun::Unauthenticated,
            Err(e) => return EndpointRun::NeverSucceeded(e),
        };
        tracing::debug!("harvest {}: @{} resolved to {subject_id}", job.id, job.subject);

        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            if cancel.is_cancelled() {
                return EndpointRun::Finished(TerminalReason::Cancelled);
            }
            if pages >= self.config.max_pages {
                tracing::warn!(
                    "harvest {}: page ceiling {} reached, result may be incomplete",
                    job.id,
                    self.config.max_pages
                );
                return EndpointRun::Finished(TerminalReason::SafetyLimit);
            }
            if pages > 0 && self.pacer.pause(&self.config.page_jitter, cancel).await.is_err() {
                return EndpointRun::Finished(TerminalReason::Cancelled);
            }

            let page = self
                .fetch_with_policy(endpoint, job, &subject_id, cursor.as_deref())
                .await;
            let page = match page {
                Ok(p) => p,
                Err(StrategyError::Cancelled) => {
                    return EndpointRun::Finished(TerminalReason::Cancelled)
                }
                Err(StrategyError::Unauthenticated) => return EndpointRun::Unauthenticated,
                Err(e) if pages == 0 => return EndpointRun::NeverSucceeded(e),
                Err(e) => {
                    tracing::warn!(
                        "harvest {}: endpoint failed after {pages} page(s): {e}; keeping partial",
                        job.id
                    );
                    return EndpointRun::Finished(TerminalReason::EndpointInterrupted);
                }
            };
            pages += 1;

            let rows = page.entities.len();
            let added = acc.extend(page.entities);
            tracing::info!(
                "harvest {}: page {pages}: {rows} rows, {added} new, {} total",
                job.id,
                acc.len()
            );

            if acc.is_full() {
                return EndpointRun::Finished(TerminalReason::UpperBound);
            }
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => return EndpointRun::Finished(TerminalReason::Exhausted),
            }
        }
    }

    /// One page fetch, honouring the configured rate-limit policy.
    async fn fetch_with_policy(
        &self,
        endpoint: &dyn EndpointSource,
        job: &HarvestJob,
        subject_id: &str,
        cursor: Option<&str>,
    ) -> StrategyResult<EndpointPage> {
        let mut attempts = 0u32;
        loop {
            let r = guarded(
                &job.cancel,
                endpoint.fetch_page(
                    &job.session,
                    subject_id,
                    job.relation,
                    cursor,
                    self.config.page_size,
                ),
            )
            .await;

            let cooldown = match r {
                Err(StrategyError::RateLimited { retry_after }) => match self.config.rate_limit {
                    RateLimitPolicy::Cooldown { wait, max_retries } if attempts < max_retries => {
                        retry_after.map_or(wait, |ra| ra.max(wait))
                    }
                    _ => return Err(StrategyError::RateLimited { retry_after }),
                },
                other => return other,
            };
            attempts += 1;
            tracing::warn!(
                "harvest {}: rate limited, cooling down {:?} (retry {attempts})",
                job.id,
                cooldown
            );
            if self.pacer.wait(cooldown, &job.cancel).await.is_err() {
                return Err(StrategyError::Cancelled);
            }
        }
    }

    // ─── rendered surface ───

    async fn run_surface(
        &self,
        job: &HarvestJob,
        acc: &mut EntityAccumulator,
    ) -> Result<TerminalReason, HarvestError> {
        let acquired =
            guarded(&job.cancel, self.surfaces.acquire(&job.session, job.headless)).await;
        let mut surface = match acquired {
            Ok(s) => s,
            Err(StrategyError::Cancelled) => return Ok(TerminalReason::Cancelled),
            Err(StrategyError::Unauthenticated) => return Err(HarvestError::Unauthenticated),
            Err(e) => return Err(HarvestError::ResourceUnavailable(e.to_string())),
        };

        let outcome = self.drive_surface(surface.as_mut(), job, acc).await;
        if let Err(e) = surface.close().await {
            tracing::warn!("harvest {}: failed to release rendered surface: {e}", job.id);
        }

        match outcome {
            Ok(terminal) => Ok(terminal),
            Err(StrategyError::Cancelled) => Ok(TerminalReason::Cancelled),
            Err(StrategyError::Unauthenticated) => Err(HarvestError::Unauthenticated),
            Err(e) => Err(HarvestError::Surface { cause: e.to_string() }),
        }
    }

    async fn drive_surface(
        &self,
        surface: &mut dyn SurfaceSource,
        job: &HarvestJob,
        acc: &mut EntityAccumulator,
    ) -> StrategyResult<TerminalReason> {
        let cancel = &job.cancel;
        guarded(cancel, surface.open_list(&job.subject, job.relation)).await?;

        let mut idle_rounds = 0u32;
        let mut passes = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(TerminalReason::Cancelled);
            }
            if passes >= self.config.max_extraction_passes {
                tracing::warn!(
                    "harvest {}: extraction ceiling {} reached, result may be incomplete",
                    job.id,
                    self.config.max_extraction_passes
                );
                return Ok(TerminalReason::SafetyLimit);
            }

            let rows = guarded(cancel, surface.extract_visible()).await?;
            passes += 1;

            let mut added = 0usize;
            let mut skipped = 0usize;
            for row in rows {
                match row {
                    Ok(entity) => {
                        if acc.offer(entity) {
                            added += 1;
                        }
                    }
                    Err(reason) => {
                        skipped += 1;
                        tracing::trace!("harvest {}: skipped element: {reason}", job.id);
                    }
                }
            }
            tracing::info!(
                "harvest {}: pass {passes}: {added} new, {skipped} skipped, {} total",
                job.id,
                acc.len()
            );

            if acc.is_full() {
                return Ok(TerminalReason::UpperBound);
            }
            if added == 0 {
                idle_rounds += 1;
                if idle_rounds >= self.config.idle_round_threshold {
                    tracing::info!(
                        "harvest {}: {idle_rounds} idle passes, treating list as exhausted",
                        job.id
                    );
                    return Ok(TerminalReason::IdleRounds);
                }
            } else {
                idle_rounds = 0;
            }

            guarded(cancel, surface.reveal_more()).await?;
            if self.pacer.pause(&self.config.reveal_wait, cancel).await.is_err() {
                return Ok(TerminalReason::Cancelled);
            }
        }
    }
}

fn build_report(
    job: &HarvestJob,
    acc: EntityAccumulator,
    strategy: StrategyKind,
    terminal: TerminalReason,
) -> HarvestReport {
    let entities = acc.into_entities();
    HarvestReport {
        job_id: job.id.clone(),
        subject: job.subject.clone(),
        relation: job.relation,
        count: entities.len(),
        entities,
        strategy,
        terminal,
    }
}
