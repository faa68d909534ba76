//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default Assembla API base URL.
fn default_assembla_api_base() -> String {
    "https://api.assembla.com/".to_string()
}

/// Default host that Assembla ticket links must live on.
fn default_assembla_web_host() -> Option<String> {
    Some("assembla.com".to_string())
}

/// Default Jira project key used to recognize issue links.
fn default_jira_project_key() -> String {
    "APP".to_string()
}

/// Default TTL for cached ticket and milestone responses.
fn default_cache_ttl_secs() -> u64 {
    60
}

/// Default TTL for the cached user roster.
fn default_user_cache_ttl_secs() -> u64 {
    600
}

/// Default timeout for backend HTTP requests.
fn default_request_timeout_secs() -> u64 {
    10
}

/// Configuration for the ticket-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    #[serde(default)]
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    #[serde(default)]
    pub slack_bot_token: String,
    /// Comma-separated ids or usernames allowed to talk to the bot (`ALLOWED_USERS`).
    #[serde(default)]
    pub allowed_users: String,
    /// Assembla workspace (space) id; Assembla is disabled when unset (`ASSEMBLA_WORKSPACE_ID`).
    #[serde(default)]
    pub assembla_workspace_id: Option<String>,
    /// Assembla API key (`ASSEMBLA_KEY`).
    #[serde(default)]
    pub assembla_key: String,
    /// Assembla API secret (`ASSEMBLA_SECRET`).
    #[serde(default)]
    pub assembla_secret: String,
    /// Assembla API base URL (`ASSEMBLA_API_BASE`).
    #[serde(default = "default_assembla_api_base")]
    pub assembla_api_base: String,
    /// Host that Assembla ticket links must be on (`ASSEMBLA_WEB_HOST`).
    #[serde(default = "default_assembla_web_host")]
    pub assembla_web_host: Option<String>,
    /// Jira site URL, e.g. `https://example.atlassian.net`; Jira is disabled when unset (`JIRA_BASE_URL`).
    #[serde(default)]
    pub jira_base_url: Option<String>,
    /// Pre-encoded basic auth token for Jira (`JIRA_TOKEN`).
    #[serde(default)]
    pub jira_token: String,
    /// Jira project key, e.g. `APP` (`JIRA_PROJECT_KEY`).
    #[serde(default = "default_jira_project_key")]
    pub jira_project_key: String,
    /// Jira agile board used for `/sprint` (`JIRA_BOARD_ID`).
    #[serde(default)]
    pub jira_board_id: Option<u64>,
    /// Host that Jira issue links must be on (`JIRA_WEB_HOST`).
    #[serde(default)]
    pub jira_web_host: Option<String>,
    /// TTL in seconds for cached ticket and milestone responses (`CACHE_TTL_SECS`).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// TTL in seconds for the cached user roster (`USER_CACHE_TTL_SECS`).
    #[serde(default = "default_user_cache_ttl_secs")]
    pub user_cache_ttl_secs: u64,
    /// Timeout in seconds for each backend request (`REQUEST_TIMEOUT_SECS`).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("TICKET_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks the values that deserialization alone cannot.
    pub fn validate(&self) -> Res<()> {
        if !self.assembla_enabled() && !self.jira_enabled() {
            return Err(anyhow::anyhow!("At least one backend must be configured (assembla_workspace_id or jira_base_url)."));
        }

        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be at least one second."));
        }

        if self.jira_enabled() && self.jira_project_key.trim().is_empty() {
            return Err(anyhow::anyhow!("Jira project key must not be empty."));
        }

        Ok(())
    }

    /// Whether the Assembla backend is configured.
    pub fn assembla_enabled(&self) -> bool {
        self.assembla_workspace_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    /// Whether the Jira backend is configured.
    pub fn jira_enabled(&self) -> bool {
        self.jira_base_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

// Tests.
