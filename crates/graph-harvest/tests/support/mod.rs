//! Scripted strategy doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use graph_harvest::source::ExtractedRow;
use graph_harvest::*;

// ─────────────────────── journal ───────────────────────

/// Ordered record of everything the doubles observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Resolve,
    Page(usize),
    EndpointUnfollow(String),
    Acquire,
    Open,
    Extract,
    Reveal,
    SurfaceUnfollow(String),
    Close,
    Sleep(Duration),
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn push(&self, e: Event) {
        self.0.lock().unwrap().push(e);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Sleep(d) => Some(d),
                _ => None,
            })
            .collect()
    }
}

// ─────────────────────── sleeper ───────────────────────

/// Records requested delays and returns immediately.
pub struct RecordingSleeper(pub Journal);

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.0.push(Event::Sleep(duration));
        tokio::task::yield_now().await;
    }
}

pub fn recording_pacer(journal: &Journal) -> Pacer {
    Pacer::new(Arc::new(RecordingSleeper(journal.clone())))
}

// ─────────────────────── helpers ───────────────────────

pub fn entities(prefix: &str, range: std::ops::Range<usize>) -> Vec<Entity> {
    range
        .map(|i| Entity {
            remote_id: Some(format!("{i}")),
            ..Entity::bare(format!("{prefix}{i}"))
        })
        .collect()
}

pub fn session_with_csrf() -> SessionCarrier {
    SessionCarrier::new(vec![
        Cookie::new("csrftoken", "tok"),
        Cookie::new("sessionid", "sid"),
    ])
}

pub fn session_without_csrf() -> SessionCarrier {
    SessionCarrier::new(vec![Cookie::new("sessionid", "sid")])
}

/// Fast, deterministic knobs for controller tests.
pub fn test_config() -> HarvestConfig {
    HarvestConfig {
        idle_round_threshold: 3,
        max_extraction_passes: 200,
        max_pages: 500,
        page_size: 5,
        page_jitter: DelayRange::from_millis(1500, 2500),
        reveal_wait: DelayRange::from_millis(1500, 2500),
        rate_limit: RateLimitPolicy::Fallback,
    }
}

// ─────────────────────── endpoint ───────────────────────

/// Serves scripted pages in order; anything past the script is a 5xx.
pub struct ScriptedEndpoint {
    journal: Journal,
    resolve: StrategyResult<String>,
    pages: Mutex<VecDeque<StrategyResult<EndpointPage>>>,
    served: AtomicUsize,
    /// Cancel this token once `n` pages have been served.
    cancel_after: Option<(usize, CancellationToken)>,
    failing_unfollows: HashSet<String>,
}

impl ScriptedEndpoint {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            resolve: Ok("42".into()),
            pages: Mutex::new(VecDeque::new()),
            served: AtomicUsize::new(0),
            cancel_after: None,
            failing_unfollows: HashSet::new(),
        }
    }

    /// Split `all` into pages of `size`, each carrying a cursor except the last.
    pub fn paged(journal: &Journal, all: &[Entity], size: usize) -> Self {
        let chunks: Vec<_> = all.chunks(size).collect();
        let n = chunks.len();
        let pages = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let more = i + 1 < n;
                Ok(EndpointPage {
                    entities: chunk.to_vec(),
                    next_cursor: more.then(|| format!("c{}", i + 1)),
                    has_more: more,
                })
            })
            .collect();
        Self::new(journal).with_pages(pages)
    }

    pub fn with_pages(self, pages: Vec<StrategyResult<EndpointPage>>) -> Self {
        *self.pages.lock().unwrap() = pages.into();
        self
    }

    pub fn push_page(self, page: StrategyResult<EndpointPage>) -> Self {
        self.pages.lock().unwrap().push_back(page);
        self
    }

    pub fn with_resolve(mut self, r: StrategyResult<String>) -> Self {
        self.resolve = r;
        self
    }

    pub fn cancel_after(mut self, pages: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((pages, token));
        self
    }

    pub fn failing_unfollow(mut self, remote_id: &str) -> Self {
        self.failing_unfollows.insert(remote_id.to_string());
        self
    }

    pub fn pages_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointSource for ScriptedEndpoint {
    async fn resolve_subject(
        &self,
        _session: &SessionCarrier,
        _handle: &str,
    ) -> StrategyResult<String> {
        self.journal.push(Event::Resolve);
        self.resolve.clone()
    }

    async fn fetch_page(
        &self,
        _session: &SessionCarrier,
        _subject_id: &str,
        _relation: Relation,
        _cursor: Option<&str>,
        _page_size: u32,
    ) -> StrategyResult<EndpointPage> {
        let n = self.served.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.push(Event::Page(n));
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StrategyError::transient("HTTP 500")));
        if let Some((after, token)) = &self.cancel_after {
            if n >= *after {
                token.cancel();
            }
        }
        page
    }

    async fn unfollow(&self, _session: &SessionCarrier, remote_id: &str) -> StrategyResult<()> {
        self.journal.push(Event::EndpointUnfollow(remote_id.to_string()));
        if self.failing_unfollows.contains(remote_id) {
            return Err(StrategyError::transient("HTTP 400"));
        }
        Ok(())
    }
}

// ─────────────────────── surface ───────────────────────

/// How the simulated list behaves across extraction passes.
#[derive(Clone)]
pub enum ListBehavior {
    /// A finite list revealed `per_pass` rows at a time. Every extraction
    /// returns a sliding window of recent rows, so passes overlap.
    Finite { all: Vec<Entity>, per_pass: usize },
    /// Every pass shows a row never seen before.
    Endless,
}

#[derive(Clone)]
pub struct SurfaceScript {
    pub behavior: ListBehavior,
    pub open_error: Option<StrategyError>,
    pub acquire_error: Option<StrategyError>,
    /// Rows that fail to parse, injected into every pass.
    pub broken_rows: usize,
    pub failing_unfollows: HashSet<String>,
    pub unauthenticated_on: Option<String>,
    pub cancel_after_passes: Option<(usize, CancellationToken)>,
}

impl SurfaceScript {
    pub fn finite(all: Vec<Entity>, per_pass: usize) -> Self {
        Self {
            behavior: ListBehavior::Finite { all, per_pass },
            open_error: None,
            acquire_error: None,
            broken_rows: 0,
            failing_unfollows: HashSet::new(),
            unauthenticated_on: None,
            cancel_after_passes: None,
        }
    }

    pub fn endless() -> Self {
        Self {
            behavior: ListBehavior::Endless,
            ..Self::finite(Vec::new(), 1)
        }
    }
}

/// Hands out [`ScriptedSurface`]s and tracks how many are alive.
pub struct ScriptedProvider {
    journal: Journal,
    script: SurfaceScript,
    pub acquired: Arc<AtomicUsize>,
    pub active: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(journal: &Journal, script: SurfaceScript) -> Self {
        Self {
            journal: journal.clone(),
            script,
            acquired: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurfaceProvider for ScriptedProvider {
    async fn acquire(
        &self,
        _session: &SessionCarrier,
        _headless: bool,
    ) -> StrategyResult<Box<dyn SurfaceSource>> {
        self.journal.push(Event::Acquire);
        if let Some(e) = &self.script.acquire_error {
            return Err(e.clone());
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSurface {
            journal: self.journal.clone(),
            script: self.script.clone(),
            revealed: 0,
            passes: 0,
            active: Arc::clone(&self.active),
        }))
    }
}

pub struct ScriptedSurface {
    journal: Journal,
    script: SurfaceScript,
    revealed: usize,
    passes: usize,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl SurfaceSource for ScriptedSurface {
    async fn open_list(&mut self, _subject: &str, _relation: Relation) -> StrategyResult<()> {
        self.journal.push(Event::Open);
        if let Some(e) = &self.script.open_error {
            return Err(e.clone());
        }
        if let ListBehavior::Finite { per_pass, all } = &self.script.behavior {
            self.revealed = (*per_pass).min(all.len());
        }
        Ok(())
    }

    async fn extract_visible(&mut self) -> StrategyResult<Vec<ExtractedRow>> {
        self.journal.push(Event::Extract);
        self.passes += 1;

        let mut rows: Vec<ExtractedRow> = match &self.script.behavior {
            ListBehavior::Finite { all, per_pass } => {
                // virtualized window: the last two screens' worth of rows
                let start = self.revealed.saturating_sub(per_pass * 2);
                all[start..self.revealed].iter().cloned().map(Ok).collect()
            }
            ListBehavior::Endless => vec![Ok(Entity::bare(format!("endless{}", self.passes)))],
        };
        for i in 0..self.script.broken_rows {
            rows.insert(0, Err(format!("detached element {i}")));
        }

        if let Some((after, token)) = &self.script.cancel_after_passes {
            if self.passes >= *after {
                token.cancel();
            }
        }
        Ok(rows)
    }

    async fn reveal_more(&mut self) -> StrategyResult<()> {
        self.journal.push(Event::Reveal);
        if let ListBehavior::Finite { all, per_pass } = &self.script.behavior {
            self.revealed = (self.revealed + per_pass).min(all.len());
        }
        Ok(())
    }

    async fn unfollow(&mut self, handle: &str) -> StrategyResult<()> {
        self.journal.push(Event::SurfaceUnfollow(handle.to_string()));
        if self.script.unauthenticated_on.as_deref() == Some(handle) {
            return Err(StrategyError::Unauthenticated);
        }
        if self.script.failing_unfollows.contains(handle) {
            return Err(StrategyError::transient("confirmation dialog not found"));
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> StrategyResult<()> {
        self.journal.push(Event::Close);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
