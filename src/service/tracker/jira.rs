//! Jira backend.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::base::{
    cache::ResponseCache,
    config::Config,
    types::{BackendReference, Milestone, Res, Ticket},
};

use super::{CachedFetcher, GenericTrackerClient, ReferencePattern, TrackerClient, TrackerError, TrackerRes, optional_string, parse_date_prefix, required_string};

// Extra methods on `TrackerClient` applied by the jira implementation.

impl TrackerClient {
    pub fn jira(settings: JiraSettings, http: reqwest::Client, cache: ResponseCache) -> Res<Self> {
        let client = JiraClient::new(settings, http, cache)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// Connection settings for one Jira site and project.
#[derive(Debug, Clone)]
pub struct JiraSettings {
    pub base_url: String,
    pub token: String,
    pub project_key: String,
    pub board_id: Option<u64>,
    pub web_host: Option<String>,
    pub ttl_secs: u64,
}

impl JiraSettings {
    /// Reads the Jira settings, or `None` if Jira is not configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.jira_enabled() {
            return None;
        }

        Some(Self {
            base_url: config.jira_base_url.clone().unwrap_or_default().trim().to_string(),
            token: config.jira_token.clone(),
            project_key: config.jira_project_key.trim().to_string(),
            board_id: config.jira_board_id,
            web_host: config.jira_web_host.clone(),
            ttl_secs: config.cache_ttl_secs,
        })
    }
}

/// Jira client implementation.
pub struct JiraClient {
    settings: JiraSettings,
    pattern: ReferencePattern,
    fetcher: CachedFetcher,
}

impl JiraClient {
    /// Create a new Jira client.
    #[instrument(name = "JiraClient::new", skip_all)]
    pub fn new(settings: JiraSettings, http: reqwest::Client, cache: ResponseCache) -> Res<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Basic {}", settings.token))?);

        let regex = format!(r"\b({}-\d+)\b", regex::escape(&settings.project_key));
        let pattern = ReferencePattern::new(&regex, settings.web_host.as_deref())?;
        let fetcher = CachedFetcher::new(http, cache, headers);

        Ok(Self { settings, pattern, fetcher })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl GenericTrackerClient for JiraClient {
    fn name(&self) -> &str {
        "Jira"
    }

    fn pattern(&self) -> &ReferencePattern {
        &self.pattern
    }

    #[instrument(name = "JiraClient::fetch_ticket", skip(self))]
    async fn fetch_ticket(&self, reference: &BackendReference) -> TrackerRes<Ticket> {
        let url = self.api_url(&format!("rest/api/2/issue/{}", reference.raw_id));
        let issue = self.fetcher.get_json(&url, self.settings.ttl_secs).await?;

        let fields = issue.get("fields").ok_or_else(|| TrackerError::malformed(&url, "missing field `fields`"))?;

        // An unassigned issue has `"assignee": null`; a missing key means the payload is not an issue.
        let assigned_user = match fields.get("assignee") {
            None => return Err(TrackerError::malformed(&url, "missing field `/fields/assignee`")),
            Some(Value::Null) => String::new(),
            Some(assignee) => required_string(assignee, "/displayName", &url)?,
        };

        Ok(Ticket {
            id: reference.raw_id.clone(),
            number: reference.raw_id.clone(),
            summary: required_string(fields, "/summary", &url)?,
            description: optional_string(fields, "/description").unwrap_or_default(),
            status: required_string(fields, "/status/name", &url)?,
            assigned_user,
            assigned_user_id: optional_string(fields, "/assignee/accountId"),
        })
    }

    #[instrument(name = "JiraClient::fetch_active_milestone", skip(self))]
    async fn fetch_active_milestone(&self) -> TrackerRes<Option<Milestone>> {
        let Some(board_id) = self.settings.board_id else {
            debug!("No Jira board configured; skipping sprint lookup.");
            return Ok(None);
        };

        let url = self.api_url(&format!("rest/agile/1.0/board/{board_id}/sprint?state=active"));
        let sprints = self.fetcher.get_json(&url, self.settings.ttl_secs).await?;

        let sprints = sprints.get("values").and_then(Value::as_array).ok_or_else(|| TrackerError::malformed(&url, "missing field `values`"))?;

        let Some(first) = sprints.first() else {
            return Ok(None);
        };

        Ok(Some(Milestone {
            title: required_string(first, "/name", &url)?,
            start_date: optional_string(first, "/startDate").as_deref().and_then(parse_date_prefix),
            is_active: optional_string(first, "/state").is_some_and(|state| state == "active"),
        }))
    }
}

// Tests.
