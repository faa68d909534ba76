//! Slack integration for ticket-bot.
//!
//! This module provides the Slack implementation of `GenericChatClient`:
//! - Receiving channel messages and slash commands over socket mode
//! - Turning Slack link markup into URL spans
//! - Resolving sender ids to usernames, for the allow-list
//! - Posting replies, either as mrkdwn or as plain text

use crate::{
    base::{
        access::AllowList,
        cache::ResponseCache,
        config::Config,
        types::{BotCommand, InboundMessage, Res, SenderIdentity, UrlSpan, Void},
    },
    interaction::{self, dispatch::Dispatcher},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use serde_json::Value;
use slack_morphism::prelude::*;
use tracing::{debug, info, instrument, warn};

use std::{ops::Deref, sync::Arc};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub fn slack(config: &Config, dispatcher: Dispatcher, access: AllowList, cache: ResponseCache) -> Res<Self> {
        let client = SlackChatClient::new(config, dispatcher, access, cache)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    dispatcher: Dispatcher,
    access: AllowList,
    chat: ChatClient,
    senders: SenderDirectory,
}

/// Looks up Slack usernames by user id.
///
/// Neither slash commands nor user messages carry the sender's username, so it
/// is fetched with `users.info` and kept in the shared response cache.
#[derive(Clone)]
struct SenderDirectory {
    client: Arc<FullClient>,
    bot_token: SlackApiToken,
    cache: ResponseCache,
    ttl_secs: u64,
}

impl SenderDirectory {
    /// The sender's identity, with a username when Slack knows one.
    ///
    /// A failed lookup leaves the identity id-only, so id entries in the
    /// allow-list keep working while Slack is unreachable.
    #[instrument(skip(self))]
    async fn identify(&self, user_id: &str) -> SenderIdentity {
        let sender = SenderIdentity::new(user_id);

        match self.username(user_id).await {
            Ok(Some(username)) => sender.with_username(username),
            Ok(None) => sender,
            Err(err) => {
                warn!("Unable to look up Slack user {}: {}", user_id, err);
                sender
            }
        }
    }

    async fn username(&self, user_id: &str) -> Res<Option<String>> {
        let key = format!("slack:users.info:{user_id}");

        if let Some(cached) = self.cache.get(&key) {
            debug!("Username cache hit for {}.", user_id);
            return Ok(cached.as_str().map(str::to_string));
        }

        let session = self.client.open_session(&self.bot_token);
        let request = SlackApiUsersInfoRequest::new(SlackUserId(user_id.to_string()));
        let response = session.users_info(&request).await.map_err(|e| anyhow::anyhow!("Failed to fetch user info: {}", e))?;

        let username = response.user.name;
        self.cache.set(&key, username.clone().map(Value::String).unwrap_or(Value::Null), self.ttl_secs);

        Ok(username)
    }
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub client: Arc<FullClient>,
    pub dispatcher: Dispatcher,
    pub access: AllowList,
    pub senders: SenderDirectory,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub fn new(config: &Config, dispatcher: Dispatcher, access: AllowList, cache: ResponseCache) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Initialize the username lookup.

        let senders = SenderDirectory {
            client: client.clone(),
            bot_token: bot_token.clone(),
            cache,
            ttl_secs: config.user_cache_ttl_secs,
        };

        Ok(Self {
            app_token,
            bot_token,
            client,
            dispatcher,
            access,
            senders,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            dispatcher: self.dispatcher.clone(),
            access: self.access.clone(),
            chat: ChatClient::from(self.clone()),
            senders: self.senders.clone(),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events.
        socket_mode_listener.listen_for(&self.app_token).await?;

        info!("Listening for Slack events ...");

        // Serve until Ctrl-C.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, chat_id: &str, text: &str, formatted: bool) -> Void {
        let message = if formatted {
            SlackMessageContent::new().with_text(text.to_string())
        } else {
            let section = SlackSectionBlock::new().with_text(SlackBlockText::Plain(SlackBlockPlainText::new(text.to_string())));
            SlackMessageContent::new().with_text(text.to_string()).with_blocks(vec![SlackBlock::Section(section)])
        };

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(chat_id.to_string()), message).with_unfurl_links(false);

        let session = self.client.open_session(&self.bot_token);

        session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

// Socket mode listener callbacks for Slack.

/// Handles slash command events from Slack.
///
/// Commands are acknowledged with an empty response; the answer is posted to the channel.
#[instrument(skip_all)]
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    let Some(command) = BotCommand::parse(&event.command.0) else {
        warn!("Received unknown command: {}", event.command.0);
        return Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text("Unknown command.".into())));
    };

    info!("Received {command} command ...");

    let sender = user_state.senders.identify(&event.user_id.0).await;

    interaction::commands::handle_command(
        command,
        event.channel_id.0.clone(),
        sender,
        user_state.dispatcher.clone(),
        user_state.access.clone(),
        user_state.chat.clone(),
    );

    Ok(SlackCommandEventResponse::new(SlackMessageContent::new()))
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            // Edits, joins, bot posts (including our own replies) and the like are not ticket links from a user.
            if slack_message_event.subtype.is_some() || slack_message_event.sender.bot_id.is_some() {
                debug!("Skipping message event with subtype or bot sender.");
                return Ok(());
            }

            let Some(mut message) = inbound_message(&slack_message_event) else {
                debug!("Skipping message event without channel, user, or text.");
                return Ok(());
            };

            message.sender = user_state.senders.identify(&message.sender.id).await;

            info!("Received message event ...");

            interaction::links::handle_links(message, user_state.dispatcher.clone(), user_state.access.clone(), user_state.chat.clone());
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}

// Helpers.

/// Converts a Slack message event into the transport-neutral message shape.
fn inbound_message(event: &SlackMessageEvent) -> Option<InboundMessage> {
    let chat_id = event.origin.channel.as_ref()?.0.clone();
    let user_id = event.sender.user.as_ref()?.0.clone();
    let text = event.content.as_ref()?.text.clone()?;

    Some(InboundMessage {
        chat_id,
        sender: SenderIdentity::new(user_id),
        url_spans: url_spans(&text),
        text,
    })
}

/// Finds the URLs in Slack's link markup (`<https://…>` or `<https://…|label>`).
///
/// Spans are byte offsets of the URL itself, without brackets or label.
pub fn url_spans(text: &str) -> Vec<UrlSpan> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(open) = text[cursor..].find('<') {
        let start = cursor + open + 1;
        let Some(close) = text[start..].find('>') else {
            break;
        };

        let inner = &text[start..start + close];
        let length = inner.find('|').unwrap_or(inner.len());
        let url = &inner[..length];

        if url.starts_with("http://") || url.starts_with("https://") {
            spans.push(UrlSpan::new(start, length));
        }

        cursor = start + close + 1;
    }

    spans
}

// Tests.

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn test_directory(server: &MockServer) -> SenderDirectory {
        let tls = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        let https_connector = HttpsConnector::<HttpConnector>::builder().with_tls_config(tls).https_or_http().enable_http1().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector).with_slack_api_url(&server.url("/api"));

        SenderDirectory {
            client: Arc::new(slack_morphism::SlackClient::new(connector)),
            bot_token: SlackApiToken::new(SlackApiTokenValue("xoxb-test".to_string())),
            cache: ResponseCache::new(),
            ttl_secs: 600,
        }
    }

    #[tokio::test]
    async fn test_identify_resolves_username_for_allow_list() {
        let server = MockServer::start();
        let users_mock = server.mock(|when, then| {
            when.method(GET).path("/api/users.info").query_param("user", "U1");
            then.status(200).json_body(json!({
                "ok": true,
                "user": { "id": "U1", "name": "alice" }
            }));
        });

        let senders = test_directory(&server);

        let sender = senders.identify("U1").await;
        let again = senders.identify("U1").await;

        users_mock.assert_hits(1);
        assert_eq!(sender, SenderIdentity::new("U1").with_username("alice"));
        assert_eq!(sender, again);
        assert!(AllowList::parse("alice").is_allowed(&sender));
    }

    #[tokio::test]
    async fn test_identify_falls_back_to_id_when_lookup_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/users.info");
            then.status(200).json_body(json!({ "ok": false, "error": "user_not_found" }));
        });

        let senders = test_directory(&server);
        let sender = senders.identify("U2").await;

        assert_eq!(sender, SenderIdentity::new("U2"));
        assert!(AllowList::parse("U2").is_allowed(&sender));
        assert!(!AllowList::parse("alice").is_allowed(&sender));
        assert!(senders.cache.is_empty());
    }

    #[test]
    fn test_url_spans_bare_and_labelled_links() {
        let text = "see <https://app.assembla.com/spaces/s/tickets/42> and <https://x.atlassian.net/browse/APP-1|APP-1>";
        let spans = url_spans(text);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].slice(text), Some("https://app.assembla.com/spaces/s/tickets/42"));
        assert_eq!(spans[1].slice(text), Some("https://x.atlassian.net/browse/APP-1"));
    }

    #[test]
    fn test_url_spans_skip_mentions_and_channels() {
        let text = "<@U123> in <#C456|general>: <mailto:a@b.c|a@b.c> <!here>";

        assert!(url_spans(text).is_empty());
    }

    #[test]
    fn test_url_spans_unterminated_link() {
        let text = "ünïcode <https://x/tickets/1> then <https://broken";
        let spans = url_spans(text);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].slice(text), Some("https://x/tickets/1"));
    }

    #[test]
    fn test_url_spans_plain_text() {
        assert!(url_spans("no links here").is_empty());
        assert!(url_spans("").is_empty());
    }
}
