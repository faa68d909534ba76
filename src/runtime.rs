//! Runtime services and shared state for the ticket-bot.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::{
    base::{
        access::AllowList,
        cache::ResponseCache,
        config::Config,
        types::{Res, Void},
    },
    interaction::dispatch::Dispatcher,
    service::{
        chat::ChatClient,
        tracker::{TrackerClient, assembla::AssemblaSettings, jira::JiraSettings},
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the backend dispatcher, the allow-list, the chat client,
/// and configuration. It is designed to be trivially cloneable,
/// allowing it to be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The backends, behind the dispatcher.
    pub dispatcher: Dispatcher,
    /// Who may use the bot.
    pub access: AllowList,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the shared HTTP client and cache.
        let http = reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout_secs)).build()?;
        let cache = ResponseCache::new();

        // Initialize the backends.
        let dispatcher = Dispatcher::new(build_trackers(&config, &http, &cache)?);
        info!("Configured backends: {}", dispatcher.tracker_names().join(", "));

        // Initialize the allow-list.
        let access = AllowList::parse(&config.allowed_users);
        if access.is_empty() {
            warn!("The allow-list is empty: every sender will be ignored.");
        }

        // Initialize the chat client.
        let chat = ChatClient::slack(&config, dispatcher.clone(), access.clone(), cache)?;

        Ok(Self {
            config,
            dispatcher,
            access,
            chat,
        })
    }

    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}

/// Builds a client for every configured backend, in a fixed order.
pub fn build_trackers(config: &Config, http: &reqwest::Client, cache: &ResponseCache) -> Res<Vec<TrackerClient>> {
    let mut trackers = Vec::new();

    if let Some(settings) = AssemblaSettings::from_config(config) {
        trackers.push(TrackerClient::assembla(settings, http.clone(), cache.clone())?);
    }

    if let Some(settings) = JiraSettings::from_config(config) {
        trackers.push(TrackerClient::jira(settings, http.clone(), cache.clone())?);
    }

    Ok(trackers)
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::base::config::ConfigInner;

    #[test]
    fn test_build_trackers_follows_config() {
        let config = Config {
            inner: Arc::new(ConfigInner {
                assembla_workspace_id: Some("space".to_string()),
                assembla_api_base: "https://api.assembla.com/".to_string(),
                jira_base_url: Some("https://example.atlassian.net".to_string()),
                jira_project_key: "APP".to_string(),
                ..Default::default()
            }),
        };

        let trackers = build_trackers(&config, &reqwest::Client::new(), &ResponseCache::new()).unwrap();
        let names = trackers.iter().map(|t| t.name()).collect::<Vec<_>>();

        assert_eq!(names, vec!["Assembla", "Jira"]);
    }

    #[test]
    fn test_build_trackers_skips_unconfigured() {
        let config = Config {
            inner: Arc::new(ConfigInner {
                jira_base_url: Some("https://example.atlassian.net".to_string()),
                jira_project_key: "OPS".to_string(),
                ..Default::default()
            }),
        };

        let trackers = build_trackers(&config, &reqwest::Client::new(), &ResponseCache::new()).unwrap();

        assert_eq!(trackers.len(), 1);
        assert!(trackers[0].match_reference("https://example.atlassian.net/browse/OPS-3").is_some());
    }
}
