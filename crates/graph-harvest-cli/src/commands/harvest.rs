//! `graph-harvest harvest`: collect one side of a subject's graph.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use graph_harvest::{HarvestJob, HarvestReport, Relation, ResultSink};

use super::Engine;

#[derive(Debug, Clone)]
pub struct HarvestArgs {
    pub subject: String,
    pub relation: Relation,
    pub limit: Option<usize>,
    pub headless: bool,
}

/// Run one harvest through the job pool and record it in the sink.
pub async fn run<S: ResultSink>(
    engine: &Engine,
    sink: &mut S,
    args: HarvestArgs,
    cancel: CancellationToken,
) -> Result<HarvestReport> {
    let job = HarvestJob::new(&args.subject, args.relation, engine.session.clone())
        .with_upper_bound(args.limit)
        .with_headless(args.headless)
        .with_cancel(cancel);

    let harvester = engine.harvester();
    let report = engine
        .pool()
        .run(harvester.harvest(job))
        .await?
        .with_context(|| format!("failed to harvest {} of {}", args.relation, args.subject))?;

    sink.record_harvest(&report)
        .context("failed to write audit log")?;

    if report.possibly_incomplete() {
        tracing::warn!(
            "{} of {} may be incomplete ({}): {} collected",
            report.relation,
            report.subject,
            report.terminal,
            report.count
        );
    } else {
        tracing::info!(
            "{} of {}: {} collected via {} ({})",
            report.relation,
            report.subject,
            report.count,
            report.strategy,
            report.terminal
        );
    }
    Ok(report)
}
