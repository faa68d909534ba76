//! Handles the `/start` and `/sprint` commands.

use tracing::{Instrument, error, info, instrument};

use crate::{
    base::{
        access::AllowList,
        types::{BotCommand, SenderIdentity, Void},
    },
    service::chat::ChatClient,
};

use super::{dispatch::Dispatcher, render};

/// Handles a command.
///
/// The work is spawned so that the transport can acknowledge the command right away.
#[instrument(skip_all)]
pub fn handle_command(command: BotCommand, chat_id: String, sender: SenderIdentity, dispatcher: Dispatcher, access: AllowList, chat: ChatClient) {
    tokio::spawn(
        async move {
            // Process the command.
            let result = process_command(command, &chat_id, &sender, &dispatcher, &access, &chat).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling: {}", err);
            }
        }
        .in_current_span(),
    );
}

/// Checks the sender, then answers the command in `chat_id`.
#[instrument(skip(dispatcher, access, chat))]
pub async fn process_command(command: BotCommand, chat_id: &str, sender: &SenderIdentity, dispatcher: &Dispatcher, access: &AllowList, chat: &ChatClient) -> Void {
    if !access.is_allowed(sender) {
        info!("Ignoring {command} from unauthorized sender {}.", sender.label());
        return Ok(());
    }

    match command {
        BotCommand::Start => chat.send_message(chat_id, &render::greeting(&dispatcher.tracker_names()), false).await,
        BotCommand::Sprint => {
            let text = match dispatcher.active_milestone().await {
                Ok(Some(milestone)) => render::milestone(&milestone),
                Ok(None) => render::NO_ACTIVE_SPRINT.to_string(),
                Err(err) => {
                    error!("Failed to fetch the active sprint: {}", err);
                    render::SPRINT_UNAVAILABLE.to_string()
                }
            };

            chat.send_message(chat_id, &text, true).await
        }
    }
}
