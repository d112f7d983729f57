//! Runtime configuration.
//!
//! Every knob has a typed default and can be overridden through a
//! `GRAPH_HARVEST_*` environment variable. Out-of-range values are clamped
//! rather than rejected.

use std::time::Duration;

use crate::types::DelayRange;

const DEFAULT_BASE_URL: &str = "https://www.instagram.com";
const DEFAULT_APP_ID: &str = "936619743392459";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                  AppleWebKit/537.36 (KHTML, like Gecko) \
                                  Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_IDLE_ROUNDS: u32 = 3;
const DEFAULT_MAX_PASSES: u32 = 200;
const DEFAULT_MAX_PAGES: u32 = 500;
const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_ACTION_MIN_DELAY_SECS: u64 = 30;
const DEFAULT_ACTION_MAX_DELAY_SECS: u64 = 60;
const DEFAULT_DAILY_LIMIT: u32 = 50;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

/// What to do when the remote platform answers with a rate-limit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// Treat like any other transient failure (fall back or record failure).
    Fallback,
    /// Sleep `wait`, then retry the same request, at most `max_retries` times.
    Cooldown { wait: Duration, max_retries: u32 },
}

impl RateLimitPolicy {
    /// Parse `fallback` or `cooldown:<secs>:<retries>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw == "fallback" {
            return Some(Self::Fallback);
        }
        let mut parts = raw.strip_prefix("cooldown:")?.split(':');
        let secs = parts.next()?.parse::<u64>().ok()?;
        let max_retries = parts.next().unwrap_or("1").parse::<u32>().ok()?;
        Some(Self::Cooldown {
            wait: Duration::from_secs(secs),
            max_retries,
        })
    }
}

/// Waits inside a single rendered-surface interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceTimings {
    /// After a navigation, before touching the page.
    pub page_settle: DelayRange,
    /// Between opening a menu and confirming it.
    pub menu_settle: DelayRange,
    pub poll_interval: DelayRange,
}

impl Default for SurfaceTimings {
    fn default() -> Self {
        Self {
            page_settle: DelayRange::from_secs(2, 3),
            menu_settle: DelayRange::from_secs(1, 2),
            poll_interval: DelayRange::from_millis(400, 600),
        }
    }
}

impl SurfaceTimings {
    pub fn from_env() -> Self {
        Self {
            page_settle: DelayRange::from_millis(
                read_env_u64("GRAPH_HARVEST_PAGE_SETTLE_MIN_MS", 2_000),
                read_env_u64("GRAPH_HARVEST_PAGE_SETTLE_MAX_MS", 3_000),
            ),
            menu_settle: DelayRange::from_millis(
                read_env_u64("GRAPH_HARVEST_MENU_SETTLE_MIN_MS", 1_000),
                read_env_u64("GRAPH_HARVEST_MENU_SETTLE_MAX_MS", 2_000),
            ),
            poll_interval: DelayRange::from_millis(
                read_env_u64("GRAPH_HARVEST_POLL_INTERVAL_MIN_MS", 400),
                read_env_u64("GRAPH_HARVEST_POLL_INTERVAL_MAX_MS", 600),
            ),
        }
    }
}

/// Where and how we talk to the remote platform.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub base_url: String,
    pub app_id: String,
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub request_timeout: Duration,
    pub navigation_timeout: Duration,
    pub surface_timings: SurfaceTimings,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: (1280, 720),
            request_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(60),
            surface_timings: SurfaceTimings::default(),
        }
    }
}

impl PlatformConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: read_env_string("GRAPH_HARVEST_BASE_URL")
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.base_url),
            app_id: read_env_string("GRAPH_HARVEST_APP_ID")
                .filter(|s| !s.is_empty())
                .unwrap_or(d.app_id),
            user_agent: read_env_string("GRAPH_HARVEST_USER_AGENT")
                .filter(|s| !s.is_empty())
                .unwrap_or(d.user_agent),
            viewport: d.viewport,
            request_timeout: Duration::from_millis(
                read_env_u64("GRAPH_HARVEST_REQUEST_TIMEOUT_MS", 15_000).max(1_000),
            ),
            navigation_timeout: Duration::from_millis(
                read_env_u64("GRAPH_HARVEST_NAVIGATION_TIMEOUT_MS", 60_000).max(1_000),
            ),
            surface_timings: SurfaceTimings::from_env(),
        }
    }

    /// Absolute URL for a path on the platform.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Harvest controller knobs.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Consecutive zero-yield extraction passes treated as end-of-list.
    pub idle_round_threshold: u32,
    /// Hard ceiling on extraction passes.
    pub max_extraction_passes: u32,
    /// Hard ceiling on endpoint page requests.
    pub max_pages: u32,
    pub page_size: u32,
    /// Jitter between endpoint page requests.
    pub page_jitter: DelayRange,
    /// Wait after asking the surface to reveal more rows.
    pub reveal_wait: DelayRange,
    pub rate_limit: RateLimitPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            idle_round_threshold: DEFAULT_IDLE_ROUNDS,
            max_extraction_passes: DEFAULT_MAX_PASSES,
            max_pages: DEFAULT_MAX_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            page_jitter: DelayRange::from_millis(1_500, 2_500),
            reveal_wait: DelayRange::from_millis(1_500, 2_500),
            rate_limit: RateLimitPolicy::Fallback,
        }
    }
}

impl HarvestConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            idle_round_threshold: read_env_u32("GRAPH_HARVEST_IDLE_ROUNDS", d.idle_round_threshold)
                .max(1),
            max_extraction_passes: read_env_u32("GRAPH_HARVEST_MAX_PASSES", d.max_extraction_passes)
                .max(1),
            max_pages: read_env_u32("GRAPH_HARVEST_MAX_PAGES", d.max_pages).max(1),
            page_size: read_env_u32("GRAPH_HARVEST_PAGE_SIZE", d.page_size).clamp(1, 200),
            page_jitter: DelayRange::from_millis(
                read_env_u64("GRAPH_HARVEST_PAGE_JITTER_MIN_MS", 1_500),
                read_env_u64("GRAPH_HARVEST_PAGE_JITTER_MAX_MS", 2_500),
            ),
            reveal_wait: DelayRange::from_millis(
                read_env_u64("GRAPH_HARVEST_REVEAL_WAIT_MIN_MS", 1_500),
                read_env_u64("GRAPH_HARVEST_REVEAL_WAIT_MAX_MS", 2_500),
            ),
            rate_limit: read_env_string("GRAPH_HARVEST_RATE_LIMIT_POLICY")
                .and_then(|raw| RateLimitPolicy::parse(&raw))
                .unwrap_or(d.rate_limit),
        }
    }
}

/// Action executor knobs and caller-side limits.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Delay between consecutive actions.
    pub delay: DelayRange,
    /// Daily unfollow quota enforced by callers before a batch is built.
    pub daily_limit: u32,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            delay: DelayRange::from_secs(
                DEFAULT_ACTION_MIN_DELAY_SECS,
                DEFAULT_ACTION_MAX_DELAY_SECS,
            ),
            daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }
}

impl ActionConfig {
    pub fn from_env() -> Self {
        Self {
            delay: DelayRange::from_secs(
                read_env_u64("GRAPH_HARVEST_MIN_ACTION_DELAY", DEFAULT_ACTION_MIN_DELAY_SECS),
                read_env_u64("GRAPH_HARVEST_MAX_ACTION_DELAY", DEFAULT_ACTION_MAX_DELAY_SECS),
            ),
            daily_limit: read_env_u32("GRAPH_HARVEST_MAX_DAILY_UNFOLLOWS", DEFAULT_DAILY_LIMIT),
        }
    }
}

/// Everything a front end needs to wire the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub platform: PlatformConfig,
    pub harvest: HarvestConfig,
    pub action: ActionConfig,
    /// Upper bound on simultaneously running browser-backed jobs.
    pub max_concurrent_jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            harvest: HarvestConfig::default(),
            action: ActionConfig::default(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            platform: PlatformConfig::from_env(),
            harvest: HarvestConfig::from_env(),
            action: ActionConfig::from_env(),
            max_concurrent_jobs: read_env_usize(
                "GRAPH_HARVEST_MAX_CONCURRENT_JOBS",
                DEFAULT_MAX_CONCURRENT_JOBS,
            )
            .max(1),
        }
    }
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_u32(name: &str, default_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default_value)
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}
