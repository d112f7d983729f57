//! Command implementations and the wiring they share.

pub mod analyze;
pub mod audit;
pub mod doctor;
pub mod harvest;
pub mod unfollow;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use graph_harvest::{
    ActionExecutor, ChromiumSurfaceProvider, Config, EndpointSource, Harvester, JobPool, Pacer,
    SessionCarrier, SurfaceProvider, WebEndpointSource,
};

/// Which strategies a command may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyChoice {
    pub endpoint: bool,
    pub browser: bool,
}

impl Default for StrategyChoice {
    fn default() -> Self {
        Self {
            endpoint: true,
            browser: true,
        }
    }
}

/// Loaded configuration, session, and the strategies built from them.
pub struct Engine {
    pub config: Config,
    pub session: SessionCarrier,
    endpoint: Option<Arc<dyn EndpointSource>>,
    surfaces: Arc<dyn SurfaceProvider>,
    pool: JobPool,
}

impl Engine {
    pub fn new(config: Config, session: SessionCarrier, choice: StrategyChoice) -> Result<Self> {
        let endpoint: Option<Arc<dyn EndpointSource>> = if choice.endpoint {
            let source = WebEndpointSource::new(config.platform.clone())
                .context("failed to build HTTP client")?;
            Some(Arc::new(source))
        } else {
            None
        };
        let surfaces: Arc<dyn SurfaceProvider> = if choice.browser {
            Arc::new(ChromiumSurfaceProvider::new(config.platform.clone(), Pacer::default()))
        } else {
            Arc::new(ChromiumSurfaceProvider::disabled(config.platform.clone()))
        };
        Ok(Self::with_strategies(config, session, endpoint, surfaces))
    }

    /// Assemble from explicit strategies.
    pub fn with_strategies(
        config: Config,
        session: SessionCarrier,
        endpoint: Option<Arc<dyn EndpointSource>>,
        surfaces: Arc<dyn SurfaceProvider>,
    ) -> Self {
        let pool = JobPool::new(config.max_concurrent_jobs);
        Self {
            config,
            session,
            endpoint,
            surfaces,
            pool,
        }
    }

    pub fn harvester(&self) -> Harvester {
        Harvester::new(
            self.endpoint.clone(),
            Arc::clone(&self.surfaces),
            self.config.harvest.clone(),
        )
    }

    pub fn executor(&self) -> ActionExecutor {
        ActionExecutor::new(self.endpoint.clone(), Arc::clone(&self.surfaces))
    }

    pub fn pool(&self) -> &JobPool {
        &self.pool
    }
}

/// Load the session export, pointing at the expected location on failure.
pub fn load_session(path: &Path) -> Result<SessionCarrier> {
    let session = SessionCarrier::from_json_file(path).with_context(|| {
        format!(
            "no usable session at {}; export your logged-in cookies there or pass --session",
            path.display()
        )
    })?;
    if session.csrf_token().is_none() {
        tracing::warn!(
            "session {} has no csrftoken cookie; structured endpoints disabled",
            path.display()
        );
    }
    Ok(session)
}

/// A token cancelled on the first Ctrl-C.
pub fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });
    token
}

/// Pretty JSON to `out`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(out: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}
