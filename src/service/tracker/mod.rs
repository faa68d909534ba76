//! Issue-tracker backends.
//!
//! Each backend implements [`GenericTrackerClient`]: it recognizes its own
//! ticket links through a [`ReferencePattern`] and maps its REST payloads onto
//! the shared [`Ticket`] and [`Milestone`] shapes. Requests go through a
//! [`CachedFetcher`] so that repeated lookups within the TTL hit the
//! [`ResponseCache`] instead of the network.

pub mod assembla;
pub mod jira;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::base::{
    cache::ResponseCache,
    types::{BackendReference, Milestone, Res, Ticket},
};

// Errors.

/// Failures talking to a backend.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Transport failure, timeout, or non-2xx status.
    #[error("backend unavailable at {url}: {reason}")]
    BackendUnavailable { url: String, reason: String },
    /// A 2xx response that could not be decoded or lacked required fields.
    #[error("malformed payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },
    /// A reference named a backend that is not registered.
    #[error("no backend named `{0}` is registered")]
    UnknownBackend(String),
}

impl TrackerError {
    pub fn unavailable(url: &str, reason: impl ToString) -> Self {
        Self::BackendUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(url: &str, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type TrackerRes<T> = Result<T, TrackerError>;

// Traits.

/// Generic issue-tracker trait that backends must implement.
///
/// Implementing this trait allows a new tracker to be recognized in chat
/// messages and resolved into tickets without touching the dispatcher.
#[async_trait]
pub trait GenericTrackerClient: Send + Sync + 'static {
    /// Backend name, used to tag references.
    fn name(&self) -> &str;

    /// The pattern recognizing this backend's ticket links.
    fn pattern(&self) -> &ReferencePattern;

    /// Matches `url` against this backend's pattern.
    ///
    /// A URL that does not belong to this backend yields `None`; this never fails.
    fn match_reference(&self, url: &str) -> Option<BackendReference> {
        self.pattern().capture(url).map(|raw_id| BackendReference {
            backend_name: self.name().to_string(),
            raw_id: raw_id.to_string(),
        })
    }

    /// Fetches the ticket behind `reference`, using the response cache.
    async fn fetch_ticket(&self, reference: &BackendReference) -> TrackerRes<Ticket>;

    /// Resolves the display name of the ticket's assignee.
    ///
    /// Backends whose ticket payload already carries the name can rely on this default.
    async fn resolve_assigned_user(&self, ticket: &Ticket) -> TrackerRes<String> {
        Ok(ticket.assigned_user.clone())
    }

    /// Fetches the milestone this backend considers current, if any.
    async fn fetch_active_milestone(&self) -> TrackerRes<Option<Milestone>>;
}

// Structs.

/// Tracker client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct TrackerClient {
    inner: Arc<dyn GenericTrackerClient>,
}

impl Deref for TrackerClient {
    type Target = dyn GenericTrackerClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl TrackerClient {
    pub fn new(inner: Arc<dyn GenericTrackerClient>) -> Self {
        Self { inner }
    }
}

/// Declarative description of which URLs belong to a backend.
#[derive(Debug, Clone)]
pub struct ReferencePattern {
    regex: Regex,
    host: Option<String>,
}

impl ReferencePattern {
    /// Builds a pattern; the first non-empty capture group is the ticket id.
    pub fn new(regex: &str, host: Option<&str>) -> Res<Self> {
        Ok(Self {
            regex: Regex::new(regex)?,
            host: host.map(|h| h.trim().to_ascii_lowercase()).filter(|h| !h.is_empty()),
        })
    }

    /// Extracts the raw ticket id from `url`, if it belongs to this pattern.
    pub fn capture<'a>(&self, url: &'a str) -> Option<&'a str> {
        if let Some(host) = &self.host
            && !url_has_host(url, host)
        {
            return None;
        }

        let captures = self.regex.captures(url)?;

        if captures.len() == 1 {
            return captures.get(0).map(|m| m.as_str());
        }

        captures.iter().skip(1).flatten().map(|m| m.as_str()).find(|s| !s.is_empty())
    }
}

/// Whether `url` is on `host` or one of its subdomains.
fn url_has_host(url: &str, host: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };

    match parsed.host_str() {
        Some(actual) => {
            let actual = actual.to_ascii_lowercase();
            actual == host || actual.ends_with(&format!(".{host}"))
        }
        None => false,
    }
}

/// Authenticated GET client that caches decoded JSON by URL.
#[derive(Clone)]
pub struct CachedFetcher {
    http: reqwest::Client,
    cache: ResponseCache,
    headers: HeaderMap,
}

impl CachedFetcher {
    pub fn new(http: reqwest::Client, cache: ResponseCache, headers: HeaderMap) -> Self {
        Self { http, cache, headers }
    }

    /// GETs `url`, serving from the cache when possible and caching for `ttl_secs` otherwise.
    #[instrument(skip(self))]
    pub async fn get_json(&self, url: &str, ttl_secs: u64) -> TrackerRes<Value> {
        if let Some(cached) = self.cache.get(url) {
            debug!("Cache hit: {url}");
            return Ok(cached);
        }

        info!("Cache miss: {url}");

        let response = self.http.get(url).headers(self.headers.clone()).send().await.map_err(|e| TrackerError::unavailable(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::unavailable(url, format!("HTTP {status}")));
        }

        let data = response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                TrackerError::malformed(url, e)
            } else {
                TrackerError::unavailable(url, e)
            }
        })?;

        self.cache.set(url, data.clone(), ttl_secs);

        Ok(data)
    }
}

// Payload helpers.

/// Reads a string (or number) at a JSON pointer; `null` and absence are `None`.
pub(crate) fn optional_string(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads a required string (or number) at a JSON pointer.
pub(crate) fn required_string(value: &Value, pointer: &str, url: &str) -> TrackerRes<String> {
    optional_string(value, pointer).ok_or_else(|| TrackerError::malformed(url, format!("missing field `{pointer}`")))
}

/// Parses the date prefix of `2024-01-31` or `2024-01-31T10:00:00.000+0000`.
pub(crate) fn parse_date_prefix(raw: &str) -> Option<chrono::NaiveDate> {
    raw.get(..10).and_then(|date| chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
}

// Tests.
