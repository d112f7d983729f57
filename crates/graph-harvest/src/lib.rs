//! Graph Harvest: incremental follower/following harvesting and paced unfollow batches.

pub mod analysis;
pub mod config;
pub mod dedup;
pub mod error;
pub mod executor;
pub mod harvest;
pub mod pacing;
pub mod pool;
pub mod quota;
pub mod renderer;
pub mod session;
pub mod sink;
pub mod source;
pub mod types;

pub use analysis::{non_followers, NonFollowerFilter, NonFollowerReport};
pub use config::{
    ActionConfig, Config, HarvestConfig, PlatformConfig, RateLimitPolicy, SurfaceTimings,
};
pub use dedup::{EntityAccumulator, SeenSet};
pub use error::{HarvestError, StrategyError, StrategyResult};
pub use executor::ActionExecutor;
pub use harvest::Harvester;
pub use pacing::{Interrupted, Pacer, Sleeper, TokioSleeper};
pub use pool::{JobPool, PoolClosed};
pub use quota::{DailyQuota, QuotaExceeded};
pub use session::{Cookie, SessionCarrier};
pub use sink::{AuditRecord, JsonlAuditSink, ResultSink};
pub use source::endpoint::WebEndpointSource;
pub use source::surface::{ChromiumSurfaceProvider, RenderedSurface};
pub use source::{EndpointPage, EndpointSource, SurfaceProvider, SurfaceSource};
pub use types::*;
