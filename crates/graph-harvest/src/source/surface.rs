//! Rendered-surface strategy: drive the platform's web UI in Chromium.
//!
//! The follower/following list is a virtualized dialog. Rows are read with
//! an ordered set of DOM heuristics; the first one that finds rows wins.
//! Scrolling the dialog's inner scroller reveals more rows.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::endpoint::is_login_url;
use super::{ExtractedRow, SurfaceProvider, SurfaceSource};
use crate::config::{PlatformConfig, SurfaceTimings};
use crate::error::{StrategyError, StrategyResult};
use crate::pacing::Pacer;
use crate::renderer::chromium::{ChromiumRenderer, LaunchOptions};
use crate::renderer::{NoopRenderer, RenderContext, Renderer};
use crate::session::{SessionCarrier, DEFAULT_COOKIE_DOMAIN};
use crate::types::{Entity, Relation};

/// First path segments that are never account handles.
const RESERVED_PATHS: &[&str] = &[
    "explore", "accounts", "p", "reels", "reel", "stories", "direct", "about", "legal",
];

/// Text fragments in a list row that are UI chrome, not a display name.
const ROW_CHROME: &[&str] = &["Follow", "Following", "Remove", "Verified", "Requested", "·"];

const RELATION_ON: &[&str] = &["Following", "Requested"];
const RELATION_CONFIRM: &[&str] = &["Unfollow"];

const DIALOG_POLLS: u32 = 10;
const CONFIRM_POLLS: u32 = 6;

/// One way to find list rows in the rendered DOM.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionHeuristic {
    pub name: &'static str,
    /// Container that must exist for the heuristic to apply.
    pub root: &'static str,
    /// Row links inside the container.
    pub links: &'static str,
}

/// Tried in order; the first that yields at least one row is used. A present
/// but empty container falls through to the next heuristic.
pub const HEURISTICS: &[ExtractionHeuristic] = &[
    ExtractionHeuristic {
        name: "dialog-role-links",
        root: r#"div[role="dialog"]"#,
        links: r#"a[href^="/"][role="link"]"#,
    },
    ExtractionHeuristic {
        name: "dialog-anchors",
        root: r#"div[role="dialog"]"#,
        links: r#"a[href^="/"]"#,
    },
    ExtractionHeuristic {
        name: "page-list",
        root: "main ul",
        links: r#"li a[href^="/"]"#,
    },
];

#[derive(Debug, Deserialize)]
struct RawRow {
    href: Option<String>,
    #[serde(default)]
    lines: Vec<String>,
    avatar: Option<String>,
    #[serde(default)]
    verified: bool,
    /// Set by the script when reading this element threw.
    error: Option<String>,
}

/// Escape a string for embedding in a JS string literal.
fn sanitize_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => {}
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            _ => out.push(ch),
        }
    }
    out
}

/// Account handle from a row link, or `None` for non-profile links.
pub fn handle_from_href(href: &str) -> Option<String> {
    let path = match href.find("://") {
        Some(i) => {
            let rest = &href[i + 3..];
            &rest[rest.find('/')?..]
        }
        None => href,
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;
    if segments.next().is_some() || RESERVED_PATHS.contains(&first) {
        return None;
    }
    let valid = first
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    valid.then(|| first.to_string())
}

fn parse_row(v: Value) -> ExtractedRow {
    let raw: RawRow = serde_json::from_value(v).map_err(|e| format!("unreadable row: {e}"))?;
    if let Some(e) = raw.error {
        return Err(format!("element read failed: {e}"));
    }
    let href = raw.href.ok_or_else(|| "row without link".to_string())?;
    let handle = handle_from_href(&href).ok_or_else(|| format!("not a profile link: {href}"))?;

    let display_name = raw
        .lines
        .iter()
        .map(|l| l.trim())
        .find(|l| {
            !l.is_empty() && !l.eq_ignore_ascii_case(&handle) && !ROW_CHROME.contains(l)
        })
        .map(str::to_string);

    Ok(Entity {
        display_name,
        is_verified: raw.verified,
        avatar_url: raw.avatar.filter(|s| !s.is_empty()),
        ..Entity::bare(handle)
    })
}

fn extraction_script(h: &ExtractionHeuristic) -> String {
    format!(
        r#"(() => {{
    const root = document.querySelector('{root}');
    if (!root) return null;
    const seen = new Set();
    const rows = [];
    for (const a of root.querySelectorAll('{links}')) {{
        try {{
            const href = a.getAttribute('href') || '';
            if (seen.has(href)) continue;
            seen.add(href);
            let row = a;
            for (let i = 0; i < 4; i++) {{
                if (!row.parentElement || row.parentElement === root) break;
                row = row.parentElement;
            }}
            const img = row.querySelector('img');
            rows.push({{
                href,
                lines: (row.innerText || '').split('\n'),
                avatar: img ? img.getAttribute('src') : null,
                verified: !!row.querySelector('svg[aria-label="Verified"]'),
            }});
        }} catch (e) {{
            rows.push({{ error: String(e) }});
        }}
    }}
    return rows;
}})()"#,
        root = sanitize_js_string(h.root),
        links = sanitize_js_string(h.links),
    )
}

fn click_by_text_script(labels: &[&str]) -> String {
    let list = labels
        .iter()
        .map(|l| format!("'{}'", sanitize_js_string(l)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"(() => {{
    const labels = [{list}];
    const els = Array.from(document.querySelectorAll('button, div[role="button"]'));
    const el = els.find(e => labels.includes((e.innerText || '').trim()));
    if (!el) return {{ success: false }};
    el.click();
    return {{ success: true }};
}})()"#
    )
}

fn open_list_script(subject: &str, relation: Relation) -> String {
    let subject = sanitize_js_string(subject);
    let relation = relation.as_str();
    format!(
        r#"(() => {{
    const el = document.querySelector('a[href="/{subject}/{relation}/"]')
        || document.querySelector('a[href*="/{relation}"]');
    if (!el) return {{ success: false }};
    el.click();
    return {{ success: true }};
}})()"#
    )
}

const DIALOG_PRESENT_SCRIPT: &str = r#"!!document.querySelector('div[role="dialog"]')"#;

const SCROLL_DIALOG_SCRIPT: &str = r#"(() => {
    const dialog = document.querySelector('div[role="dialog"]');
    if (!dialog) return { success: false };
    const nodes = [dialog, ...dialog.querySelectorAll('div')];
    const box = nodes.find(n => n.scrollHeight > n.clientHeight + 4
        && /(auto|scroll)/.test(getComputedStyle(n).overflowY));
    const target = box || dialog;
    target.scrollTop = target.scrollHeight;
    return { success: true };
})()"#;

fn js_success(v: &Value) -> bool {
    v.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// A browser tab bound to one job's session.
pub struct RenderedSurface {
    ctx: Box<dyn RenderContext>,
    renderer: Arc<dyn Renderer>,
    platform: PlatformConfig,
    pacer: Pacer,
    timings: SurfaceTimings,
}

impl RenderedSurface {
    /// Open a tab on `renderer` and install the session cookies.
    ///
    /// On failure the renderer is shut down before returning.
    pub async fn open(
        renderer: Arc<dyn Renderer>,
        session: &SessionCarrier,
        platform: PlatformConfig,
        pacer: Pacer,
    ) -> StrategyResult<Self> {
        let mut ctx = match renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                let _ = renderer.shutdown().await;
                return Err(StrategyError::Unavailable(format!("{e:#}")));
            }
        };
        if let Err(e) = ctx.set_cookies(&session.cookies, DEFAULT_COOKIE_DOMAIN).await {
            let _ = ctx.close().await;
            let _ = renderer.shutdown().await;
            return Err(StrategyError::Unavailable(format!("{e:#}")));
        }
        Ok(Self {
            ctx,
            renderer,
            timings: platform.surface_timings.clone(),
            platform,
            pacer,
        })
    }

    async fn goto(&mut self, path: &str) -> StrategyResult<()> {
        let url = self.platform.url(path);
        let timeout_ms = self.platform.navigation_timeout.as_millis() as u64;
        let nav = self.ctx.navigate(&url, timeout_ms).await?;
        if is_login_url(&nav.final_url) {
            return Err(StrategyError::Unauthenticated);
        }
        tracing::debug!("navigated to {} in {}ms", nav.final_url, nav.load_time_ms);
        Ok(())
    }

    async fn ensure_authenticated(&self) -> StrategyResult<()> {
        let url = self.ctx.get_url().await?;
        if is_login_url(&url) {
            return Err(StrategyError::Unauthenticated);
        }
        Ok(())
    }

    async fn click(&self, script: &str) -> StrategyResult<bool> {
        Ok(js_success(&self.ctx.execute_js(script).await?))
    }

    /// Poll `script` until it yields true, up to `polls` attempts.
    async fn poll(&self, script: &str, polls: u32) -> StrategyResult<bool> {
        for _ in 0..polls {
            let v = self.ctx.execute_js(script).await?;
            if v.as_bool() == Some(true) || js_success(&v) {
                return Ok(true);
            }
            self.pacer.settle(&self.timings.poll_interval).await;
        }
        Ok(false)
    }
}

#[async_trait]
impl SurfaceSource for RenderedSurface {
    async fn open_list(&mut self, subject: &str, relation: Relation) -> StrategyResult<()> {
        self.goto(&format!("/{subject}/")).await?;
        self.pacer.settle(&self.timings.page_settle).await;

        if !self.click(&open_list_script(subject, relation)).await? {
            return Err(StrategyError::transient(format!(
                "no {relation} control on {subject}'s profile"
            )));
        }
        if !self.poll(DIALOG_PRESENT_SCRIPT, DIALOG_POLLS).await? {
            return Err(StrategyError::transient("list container never appeared"));
        }
        Ok(())
    }

    async fn extract_visible(&mut self) -> StrategyResult<Vec<ExtractedRow>> {
        self.ensure_authenticated().await?;

        let mut container_seen = false;
        for h in HEURISTICS {
            let v = match self.ctx.execute_js(&extraction_script(h)).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("heuristic {} failed: {e:#}", h.name);
                    continue;
                }
            };
            match v {
                Value::Array(rows) if rows.is_empty() => {
                    tracing::trace!("heuristic {} found its container but no rows", h.name);
                    container_seen = true;
                }
                Value::Array(rows) => {
                    tracing::trace!("heuristic {} matched {} rows", h.name, rows.len());
                    return Ok(rows.into_iter().map(parse_row).collect());
                }
                _ => {}
            }
        }
        if container_seen {
            // The list is there but shows nothing yet; let idle rounds decide.
            return Ok(Vec::new());
        }
        Err(StrategyError::transient("no extraction heuristic matched the page"))
    }

    async fn reveal_more(&mut self) -> StrategyResult<()> {
        if !self.click(SCROLL_DIALOG_SCRIPT).await? {
            return Err(StrategyError::transient("list container disappeared"));
        }
        Ok(())
    }

    async fn unfollow(&mut self, handle: &str) -> StrategyResult<()> {
        self.goto(&format!("/{handle}/")).await?;
        self.pacer.settle(&self.timings.page_settle).await;

        if !self.click(&click_by_text_script(RELATION_ON)).await? {
            return Err(StrategyError::transient("not followed or control not found"));
        }
        self.pacer.settle(&self.timings.menu_settle).await;

        if !self.poll(&click_by_text_script(RELATION_CONFIRM), CONFIRM_POLLS).await? {
            return Err(StrategyError::transient("confirmation dialog not found"));
        }
        self.pacer.settle(&self.timings.page_settle).await;
        Ok(())
    }

    async fn close(self: Box<Self>) -> StrategyResult<()> {
        let Self { ctx, renderer, .. } = *self;
        let closed = ctx.close().await;
        renderer.shutdown().await?;
        closed?;
        Ok(())
    }
}

/// Launches one Chromium per acquisition. Disabled providers fail fast.
#[derive(Clone)]
pub struct ChromiumSurfaceProvider {
    platform: PlatformConfig,
    pacer: Pacer,
    enabled: bool,
}

impl ChromiumSurfaceProvider {
    pub fn new(platform: PlatformConfig, pacer: Pacer) -> Self {
        Self {
            platform,
            pacer,
            enabled: true,
        }
    }

    /// Endpoint-only mode: every acquisition is refused.
    pub fn disabled(platform: PlatformConfig) -> Self {
        Self {
            platform,
            pacer: Pacer::default(),
            enabled: false,
        }
    }
}

#[async_trait]
impl SurfaceProvider for ChromiumSurfaceProvider {
    async fn acquire(
        &self,
        session: &SessionCarrier,
        headless: bool,
    ) -> StrategyResult<Box<dyn SurfaceSource>> {
        let renderer: Arc<dyn Renderer> = if self.enabled {
            let options = LaunchOptions {
                headless,
                user_agent: self.platform.user_agent.clone(),
                viewport: self.platform.viewport,
            };
            let chromium = ChromiumRenderer::launch(&options)
                .await
                .map_err(|e| StrategyError::Unavailable(format!("{e:#}")))?;
            Arc::new(chromium)
        } else {
            Arc::new(NoopRenderer)
        };

        let surface =
            RenderedSurface::open(renderer, session, self.platform.clone(), self.pacer.clone())
                .await?;
        Ok(Box::new(surface))
    }
}
