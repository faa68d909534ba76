//! Replies to ticket links posted in chat.

use async_trait::async_trait;
use tracing::{Instrument, error, info, instrument};

use crate::{
    base::{
        access::AllowList,
        types::{InboundMessage, Res, Ticket, Void},
    },
    service::chat::ChatClient,
};

use super::{
    dispatch::{DispatchSummary, Dispatcher, TicketSink},
    render,
};

/// Handles an inbound message.
///
/// The work is spawned so that slow backends never hold up the transport.
#[instrument(skip_all)]
pub fn handle_links(message: InboundMessage, dispatcher: Dispatcher, access: AllowList, chat: ChatClient) {
    tokio::spawn(
        async move {
            // Process the message.
            let result = process_links(&message, &dispatcher, &access, &chat).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling: {}", err);
            }
        }
        .in_current_span(),
    );
}

/// Checks the sender, then resolves and replies to every ticket link in the message.
#[instrument(skip_all, fields(chat_id = %message.chat_id))]
pub async fn process_links(message: &InboundMessage, dispatcher: &Dispatcher, access: &AllowList, chat: &ChatClient) -> Res<DispatchSummary> {
    if !access.is_allowed(&message.sender) {
        info!("Ignoring message from unauthorized sender {}.", message.sender.label());
        return Ok(DispatchSummary::default());
    }

    let references = dispatcher.extract(&message.text, &message.url_spans);
    if references.is_empty() {
        return Ok(DispatchSummary::default());
    }

    info!("Found {} ticket links from {}.", references.len(), message.sender.label());

    let sink = ChatTicketSink { chat, chat_id: &message.chat_id };

    Ok(dispatcher.dispatch(&references, &sink).await)
}

/// Posts each ticket to the chat it was linked in.
struct ChatTicketSink<'a> {
    chat: &'a ChatClient,
    chat_id: &'a str,
}

#[async_trait]
impl TicketSink for ChatTicketSink<'_> {
    async fn deliver(&self, ticket: Ticket) -> Void {
        self.chat.send_message(self.chat_id, &render::ticket(&ticket), true).await
    }
}
