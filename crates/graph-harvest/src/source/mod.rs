//! Acquisition strategies.
//!
//! Two interchangeable ways to list followers/following and to unfollow:
//!
//! - [`EndpointSource`]: paginated calls against the platform's internal
//!   JSON endpoints. Fast and cheap, needs a CSRF token.
//! - [`SurfaceSource`]: drives the rendered, virtualized list in a browser.
//!   Slow, but works whenever the web UI works.
//!
//! The harvest controller and the action executor only see these traits.

pub mod endpoint;
pub mod surface;

use async_trait::async_trait;

use crate::error::StrategyResult;
use crate::session::SessionCarrier;
use crate::types::{Entity, Relation};

/// One page returned by the structured endpoint.
#[derive(Debug, Clone, Default)]
pub struct EndpointPage {
    pub entities: Vec<Entity>,
    /// Continuation token; `None` means no further pages.
    pub next_cursor: Option<String>,
    /// Explicit server-side "more pages" flag when the response carries one.
    pub has_more: bool,
}

/// Paginated structured-endpoint access.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Map a handle to the platform's opaque account id.
    async fn resolve_subject(
        &self,
        session: &SessionCarrier,
        handle: &str,
    ) -> StrategyResult<String>;

    /// Fetch one page of `relation` for `subject_id`, starting at `cursor`.
    async fn fetch_page(
        &self,
        session: &SessionCarrier,
        subject_id: &str,
        relation: Relation,
        cursor: Option<&str>,
        page_size: u32,
    ) -> StrategyResult<EndpointPage>;

    /// Drop the relationship with the account `remote_id`.
    async fn unfollow(&self, session: &SessionCarrier, remote_id: &str) -> StrategyResult<()>;
}

/// A single scraped row, or the reason that one element could not be read.
pub type ExtractedRow = Result<Entity, String>;

/// A live, rendered list surface owned by exactly one job.
#[async_trait]
pub trait SurfaceSource: Send {
    /// Navigate to `subject`'s profile and open its `relation` list.
    async fn open_list(&mut self, subject: &str, relation: Relation) -> StrategyResult<()>;

    /// Read every currently rendered row of the open list.
    async fn extract_visible(&mut self) -> StrategyResult<Vec<ExtractedRow>>;

    /// Ask the list to render more rows (scroll its container).
    async fn reveal_more(&mut self) -> StrategyResult<()>;

    /// Open `handle`'s profile, toggle the relationship off and confirm.
    async fn unfollow(&mut self, handle: &str) -> StrategyResult<()>;

    /// Release the browser resource. Called on every exit path.
    async fn close(self: Box<Self>) -> StrategyResult<()>;
}

/// Hands out rendering resources to jobs.
#[async_trait]
pub trait SurfaceProvider: Send + Sync {
    /// Acquire a fresh surface carrying `session`'s cookies.
    async fn acquire(
        &self,
        session: &SessionCarrier,
        headless: bool,
    ) -> StrategyResult<Box<dyn SurfaceSource>>;
}
