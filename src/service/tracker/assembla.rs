//! Assembla backend.
//!
//! Ticket payloads only carry the assignee's id, so names are resolved through
//! the space's user roster, which is cached for longer than tickets.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::base::{
    cache::ResponseCache,
    config::Config,
    types::{BackendReference, Milestone, Res, Ticket},
};

use super::{CachedFetcher, GenericTrackerClient, ReferencePattern, TrackerClient, TrackerError, TrackerRes, optional_string, parse_date_prefix, required_string};

/// Links such as `.../tickets/42` or `...?ticket=42`.
pub const ASSEMBLA_TICKET_PATTERN: &str = r"ticket=(\d+)|tickets/(\d+)";

// Extra methods on `TrackerClient` applied by the assembla implementation.

impl TrackerClient {
    pub fn assembla(settings: AssemblaSettings, http: reqwest::Client, cache: ResponseCache) -> Res<Self> {
        let client = AssemblaClient::new(settings, http, cache)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// Connection settings for one Assembla space.
#[derive(Debug, Clone)]
pub struct AssemblaSettings {
    pub api_base: String,
    pub workspace_id: String,
    pub key: String,
    pub secret: String,
    pub web_host: Option<String>,
    pub ticket_ttl_secs: u64,
    pub user_ttl_secs: u64,
}

impl AssemblaSettings {
    /// Reads the Assembla settings, or `None` if Assembla is not configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.assembla_enabled() {
            return None;
        }

        Some(Self {
            api_base: config.assembla_api_base.clone(),
            workspace_id: config.assembla_workspace_id.clone().unwrap_or_default().trim().to_string(),
            key: config.assembla_key.clone(),
            secret: config.assembla_secret.clone(),
            web_host: config.assembla_web_host.clone(),
            ticket_ttl_secs: config.cache_ttl_secs,
            user_ttl_secs: config.user_cache_ttl_secs,
        })
    }
}

/// Assembla client implementation.
pub struct AssemblaClient {
    settings: AssemblaSettings,
    pattern: ReferencePattern,
    fetcher: CachedFetcher,
}

impl AssemblaClient {
    /// Create a new Assembla client.
    #[instrument(name = "AssemblaClient::new", skip_all)]
    pub fn new(settings: AssemblaSettings, http: reqwest::Client, cache: ResponseCache) -> Res<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Key", HeaderValue::from_str(&settings.key)?);
        headers.insert("X-Api-Secret", HeaderValue::from_str(&settings.secret)?);
        headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let pattern = ReferencePattern::new(ASSEMBLA_TICKET_PATTERN, settings.web_host.as_deref())?;
        let fetcher = CachedFetcher::new(http, cache, headers);

        Ok(Self { settings, pattern, fetcher })
    }

    /// URL of a resource within the configured space.
    fn space_url(&self, path: &str) -> String {
        format!("{}/v1/spaces/{}/{}", self.settings.api_base.trim_end_matches('/'), self.settings.workspace_id, path)
    }

    /// Fetches the space's users as an id → name map.
    #[instrument(skip(self))]
    pub async fn fetch_users(&self) -> TrackerRes<HashMap<String, String>> {
        let url = self.space_url("users");
        let users = self.fetcher.get_json(&url, self.settings.user_ttl_secs).await?;

        let users = users.as_array().ok_or_else(|| TrackerError::malformed(&url, "expected a list of users"))?;

        Ok(users
            .iter()
            .filter_map(|user| Some((optional_string(user, "/id")?, optional_string(user, "/name")?)))
            .collect())
    }
}

#[async_trait]
impl GenericTrackerClient for AssemblaClient {
    fn name(&self) -> &str {
        "Assembla"
    }

    fn pattern(&self) -> &ReferencePattern {
        &self.pattern
    }

    #[instrument(name = "AssemblaClient::fetch_ticket", skip(self))]
    async fn fetch_ticket(&self, reference: &BackendReference) -> TrackerRes<Ticket> {
        let url = self.space_url(&format!("tickets/{}", reference.raw_id));
        let ticket = self.fetcher.get_json(&url, self.settings.ticket_ttl_secs).await?;

        Ok(Ticket {
            id: reference.raw_id.clone(),
            number: reference.raw_id.clone(),
            summary: required_string(&ticket, "/summary", &url)?,
            description: optional_string(&ticket, "/description").unwrap_or_default(),
            status: required_string(&ticket, "/status", &url)?,
            assigned_user: String::new(),
            assigned_user_id: optional_string(&ticket, "/assigned_to_id"),
        })
    }

    #[instrument(name = "AssemblaClient::resolve_assigned_user", skip_all)]
    async fn resolve_assigned_user(&self, ticket: &Ticket) -> TrackerRes<String> {
        let Some(user_id) = &ticket.assigned_user_id else {
            return Ok(String::new());
        };

        let users = self.fetch_users().await?;

        match users.get(user_id) {
            Some(name) => Ok(name.clone()),
            None => {
                warn!("Assembla user {user_id} is not in the roster.");
                Ok(String::new())
            }
        }
    }

    #[instrument(name = "AssemblaClient::fetch_active_milestone", skip(self))]
    async fn fetch_active_milestone(&self) -> TrackerRes<Option<Milestone>> {
        let url = self.space_url("milestones");
        let milestones = self.fetcher.get_json(&url, self.settings.ticket_ttl_secs).await?;

        let milestones = milestones.as_array().ok_or_else(|| TrackerError::malformed(&url, "expected a list of milestones"))?;

        milestones.first().map(|first| parse_milestone(first, &url)).transpose()
    }
}

/// Maps an Assembla milestone payload.
fn parse_milestone(value: &Value, url: &str) -> TrackerRes<Milestone> {
    Ok(Milestone {
        title: required_string(value, "/title", url)?,
        start_date: optional_string(value, "/start_date").as_deref().and_then(parse_date_prefix),
        is_active: !value.get("is_completed").and_then(Value::as_bool).unwrap_or(false),
    })
}

// Tests.

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn test_settings(api_base: &str) -> AssemblaSettings {
        AssemblaSettings {
            api_base: api_base.to_string(),
            workspace_id: "space".to_string(),
            key: "key".to_string(),
            secret: "secret".to_string(),
            web_host: Some("assembla.com".to_string()),
            ticket_ttl_secs: 60,
            user_ttl_secs: 600,
        }
    }

    fn test_client(server: &MockServer) -> AssemblaClient {
        AssemblaClient::new(test_settings(&server.base_url()), reqwest::Client::new(), ResponseCache::new()).unwrap()
    }

    fn reference(raw_id: &str) -> BackendReference {
        BackendReference {
            backend_name: "Assembla".to_string(),
            raw_id: raw_id.to_string(),
        }
    }

    #[test]
    fn test_match_reference() {
        let client = AssemblaClient::new(test_settings("https://api.assembla.com/"), reqwest::Client::new(), ResponseCache::new()).unwrap();

        assert_eq!(client.match_reference("https://app.assembla.com/spaces/space/tickets/42"), Some(reference("42")));
        assert_eq!(client.match_reference("https://app.assembla.com/spaces/space/tickets/realtime_list?ticket=7"), Some(reference("7")));
        assert_eq!(client.match_reference("https://example.atlassian.net/browse/APP-1"), None);
        assert_eq!(client.match_reference("%%%"), None);
    }

    #[tokio::test]
    async fn test_fetch_ticket_maps_fields_and_caches() {
        let server = MockServer::start();
        let ticket_mock = server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/tickets/42").header("x-api-key", "key").header("x-api-secret", "secret");
            then.status(200).json_body(json!({
                "id": 9001,
                "number": 42,
                "summary": "Fix login",
                "description": null,
                "status": "Test",
                "assigned_to_id": "u-1"
            }));
        });

        let client = test_client(&server);

        let ticket = client.fetch_ticket(&reference("42")).await.unwrap();
        let again = client.fetch_ticket(&reference("42")).await.unwrap();

        ticket_mock.assert_hits(1);
        assert_eq!(ticket, again);
        assert_eq!(ticket.id, "42");
        assert_eq!(ticket.number, "42");
        assert_eq!(ticket.summary, "Fix login");
        assert_eq!(ticket.description, "");
        assert_eq!(ticket.status, "Test");
        assert_eq!(ticket.assigned_user_id.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_fetch_ticket_not_found_is_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/tickets/404");
            then.status(404);
        });

        let client = test_client(&server);
        let result = client.fetch_ticket(&reference("404")).await;

        assert!(matches!(result, Err(TrackerError::BackendUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_fetch_ticket_timeout_is_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/tickets/5");
            then.status(200).delay(std::time::Duration::from_millis(1500)).json_body(json!({
                "number": 5,
                "summary": "Slow",
                "status": "New"
            }));
        });

        let http = reqwest::Client::builder().timeout(std::time::Duration::from_millis(200)).build().unwrap();
        let client = AssemblaClient::new(test_settings(&server.base_url()), http, ResponseCache::new()).unwrap();

        let result = client.fetch_ticket(&reference("5")).await;

        assert!(matches!(result, Err(TrackerError::BackendUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/tickets/5");
            then.status(500);
        });

        let client = test_client(&server);

        assert!(client.fetch_ticket(&reference("5")).await.is_err());
        assert!(client.fetch_ticket(&reference("5")).await.is_err());
        failing.assert_hits(2);
    }

    #[tokio::test]
    async fn test_fetch_ticket_missing_summary_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/tickets/3");
            then.status(200).json_body(json!({ "status": "New" }));
        });

        let client = test_client(&server);
        let result = client.fetch_ticket(&reference("3")).await;

        assert!(matches!(result, Err(TrackerError::MalformedPayload { .. })));
    }

    #[tokio::test]
    async fn test_resolve_assigned_user() {
        let server = MockServer::start();
        let users_mock = server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/users");
            then.status(200).json_body(json!([
                { "id": "u-1", "name": "Ada Lovelace" },
                { "id": "u-2", "name": "Alan Turing" }
            ]));
        });

        let client = test_client(&server);

        let assigned = Ticket {
            assigned_user_id: Some("u-2".to_string()),
            ..Default::default()
        };
        let stranger = Ticket {
            assigned_user_id: Some("u-9".to_string()),
            ..Default::default()
        };

        assert_eq!(client.resolve_assigned_user(&assigned).await.unwrap(), "Alan Turing");
        assert_eq!(client.resolve_assigned_user(&stranger).await.unwrap(), "");
        assert_eq!(client.resolve_assigned_user(&Ticket::default()).await.unwrap(), "");
        users_mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_fetch_active_milestone_returns_first() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/milestones");
            then.status(200).json_body(json!([
                { "title": "Sprint 12", "start_date": "2024-03-04", "is_completed": false },
                { "title": "Sprint 11", "start_date": "2024-02-19", "is_completed": true }
            ]));
        });

        let client = test_client(&server);
        let milestone = client.fetch_active_milestone().await.unwrap().unwrap();

        assert_eq!(milestone.title, "Sprint 12");
        assert_eq!(milestone.start_date, chrono::NaiveDate::from_ymd_opt(2024, 3, 4));
        assert!(milestone.is_active);
    }

    #[tokio::test]
    async fn test_fetch_active_milestone_empty_list_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/spaces/space/milestones");
            then.status(200).json_body(json!([]));
        });

        let client = test_client(&server);

        assert_eq!(client.fetch_active_milestone().await.unwrap(), None);
    }
}
