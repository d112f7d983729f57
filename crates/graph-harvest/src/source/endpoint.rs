//! Structured-endpoint strategy over the platform's internal JSON API.
//!
//! Plain HTTP requests carrying the session cookies and the CSRF header.
//! Every request is sent exactly once: a failed list page hands the job to
//! the rendered surface, and a repeated POST could apply an unfollow twice.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{EndpointPage, EndpointSource};
use crate::config::PlatformConfig;
use crate::error::{StrategyError, StrategyResult};
use crate::session::SessionCarrier;
use crate::types::{Entity, Relation};

/// Raw response before classification.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// `Retry-After` header, when present.
    pub retry_after: Option<Duration>,
    /// Response body as text.
    pub body: String,
}

/// reqwest-backed implementation of [`EndpointSource`].
#[derive(Clone)]
pub struct WebEndpointSource {
    client: reqwest::Client,
    platform: PlatformConfig,
}

impl WebEndpointSource {
    pub fn new(platform: PlatformConfig) -> StrategyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(platform.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(platform.user_agent.as_str())
            .build()
            .map_err(|e| StrategyError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { client, platform })
    }

    fn csrf<'a>(session: &'a SessionCarrier) -> StrategyResult<&'a str> {
        session
            .csrf_token()
            .ok_or_else(|| StrategyError::Unavailable("session carries no CSRF token".into()))
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        session: &SessionCarrier,
        csrf: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("X-CSRFToken", csrf)
            .header("X-IG-App-ID", self.platform.app_id.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", self.platform.url("/"))
            .header(reqwest::header::COOKIE, session.cookie_header())
    }

    /// One GET, no retries. Any failure ends the attempt; recovery is the
    /// controller's call.
    async fn get(&self, url: &str, session: &SessionCarrier) -> StrategyResult<EndpointResponse> {
        let csrf = Self::csrf(session)?;
        let r = self
            .request(reqwest::Method::GET, url, session, csrf)
            .send()
            .await?;
        Ok(read_response(r).await)
    }

    async fn post_form(
        &self,
        url: &str,
        session: &SessionCarrier,
        form: &[(&str, &str)],
    ) -> StrategyResult<EndpointResponse> {
        let csrf = Self::csrf(session)?;
        let r = self
            .request(reqwest::Method::POST, url, session, csrf)
            .form(form)
            .send()
            .await?;
        Ok(read_response(r).await)
    }
}

async fn read_response(r: reqwest::Response) -> EndpointResponse {
    let status = r.status().as_u16();
    let final_url = r.url().to_string();
    let retry_after = r
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = r.text().await.unwrap_or_default();
    EndpointResponse {
        final_url,
        status,
        retry_after,
        body,
    }
}

/// Whether a URL points at the platform's login surface.
pub fn is_login_url(url: &str) -> bool {
    url.contains("/accounts/login")
}

/// Turn a raw response into JSON or a classified strategy error.
pub fn classify(resp: &EndpointResponse) -> StrategyResult<Value> {
    if is_login_url(&resp.final_url) {
        return Err(StrategyError::Unauthenticated);
    }
    if resp.status == 429 {
        return Err(StrategyError::RateLimited {
            retry_after: resp.retry_after,
        });
    }

    let json = serde_json::from_str::<Value>(&resp.body).ok();
    if let Some(v) = &json {
        let message = v.get("message").and_then(Value::as_str).unwrap_or("");
        let require_login = v.get("require_login").and_then(Value::as_bool) == Some(true);
        if message == "login_required" || require_login {
            return Err(StrategyError::Unauthenticated);
        }
        if v.get("spam").and_then(Value::as_bool) == Some(true)
            || message.contains("wait a few minutes")
        {
            return Err(StrategyError::RateLimited {
                retry_after: resp.retry_after,
            });
        }
    }

    if !(200..300).contains(&resp.status) {
        return Err(StrategyError::transient(format!("HTTP {}", resp.status)));
    }
    json.ok_or_else(|| StrategyError::transient("malformed JSON response"))
}

/// Opaque ids arrive as numbers or strings depending on the endpoint.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert one remote user object. `Err` explains why the row was skipped.
pub fn parse_user(v: &Value) -> Result<Entity, String> {
    let handle = v
        .get("username")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "user object without username".to_string())?;

    let remote_id = v
        .get("pk")
        .and_then(id_string)
        .or_else(|| v.get("pk_id").and_then(id_string))
        .or_else(|| v.get("id").and_then(id_string));

    Ok(Entity {
        handle: handle.to_string(),
        display_name: v
            .get("full_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty()),
        is_verified: v.get("is_verified").and_then(Value::as_bool).unwrap_or(false),
        avatar_url: v
            .get("profile_pic_url")
            .and_then(Value::as_str)
            .map(str::to_string),
        remote_id,
        is_private_account: v.get("is_private").and_then(Value::as_bool),
        has_default_avatar: v
            .get("has_anonymous_profile_picture")
            .and_then(Value::as_bool),
    })
}

/// Parse a friendships page. Malformed rows are skipped, never fatal.
pub fn parse_page(v: &Value) -> StrategyResult<EndpointPage> {
    let users = v
        .get("users")
        .and_then(Value::as_array)
        .ok_or_else(|| StrategyError::transient("page without a users array"))?;

    let mut entities = Vec::with_capacity(users.len());
    for u in users {
        match parse_user(u) {
            Ok(e) => entities.push(e),
            Err(reason) => tracing::debug!("skipping endpoint row: {reason}"),
        }
    }

    let next_cursor = v.get("next_max_id").and_then(id_string);
    let has_more = match v.get("has_more").and_then(Value::as_bool) {
        Some(flag) => flag && next_cursor.is_some(),
        None => next_cursor.is_some(),
    };

    Ok(EndpointPage {
        entities,
        next_cursor,
        has_more,
    })
}

#[async_trait]
impl EndpointSource for WebEndpointSource {
    async fn resolve_subject(
        &self,
        session: &SessionCarrier,
        handle: &str,
    ) -> StrategyResult<String> {
        let url = self.platform.url(&format!(
            "/api/v1/users/web_profile_info/?username={}",
            url::form_urlencoded::byte_serialize(handle.as_bytes()).collect::<String>()
        ));
        let resp = self.get(&url, session).await?;
        let json = classify(&resp)?;
        json.pointer("/data/user/id")
            .and_then(id_string)
            .ok_or_else(|| StrategyError::transient(format!("profile '{handle}' has no id")))
    }

    async fn fetch_page(
        &self,
        session: &SessionCarrier,
        subject_id: &str,
        relation: Relation,
        cursor: Option<&str>,
        page_size: u32,
    ) -> StrategyResult<EndpointPage> {
        let mut url = url::Url::parse(&self.platform.url(&format!(
            "/api/v1/friendships/{subject_id}/{}/",
            relation.as_str()
        )))
        .map_err(|e| StrategyError::Unavailable(format!("bad endpoint url: {e}")))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("count", &page_size.to_string());
            if let Some(c) = cursor {
                q.append_pair("max_id", c);
            }
        }

        let resp = self.get(url.as_str(), session).await?;
        let json = classify(&resp)?;
        parse_page(&json)
    }

    async fn unfollow(&self, session: &SessionCarrier, remote_id: &str) -> StrategyResult<()> {
        let url = self
            .platform
            .url(&format!("/api/v1/friendships/destroy/{remote_id}/"));
        let resp = self.post_form(&url, session, &[("user_id", remote_id)]).await?;
        let json = classify(&resp)?;

        if json.get("status").and_then(Value::as_str) != Some("ok") {
            return Err(StrategyError::transient("unfollow not acknowledged"));
        }
        if json.pointer("/friendship_status/following").and_then(Value::as_bool) == Some(true) {
            return Err(StrategyError::transient("relationship still active after unfollow"));
        }
        Ok(())
    }
}
