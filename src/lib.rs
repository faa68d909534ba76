//! Library root for `ticket-bot`.
//!
//! Ticket-bot is a Slack companion for teams tracking work in Assembla or Jira:
//! - Spots ticket links in channel messages and replies with a summary
//! - Reports the current sprint on `/sprint`
//! - Only answers senders on a configured allow-list
//!
//! Backend responses are kept in a short-lived cache so that a ticket linked
//! repeatedly does not hit the tracker's API every time. The architecture is
//! built around traits for the chat platform and for each tracker, so that
//! either can be swapped or mocked.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the ticket-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with cache, backends, and chat client
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting ticket-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install the rustls crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
