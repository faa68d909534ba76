//! Event handling and user interactions for ticket-bot.
//!
//! This module provides functionality for handling chat messages and commands:
//! - Extracting ticket references from message links
//! - Dispatching references to the matching backend
//! - Rendering and sending replies

pub mod commands;
pub mod dispatch;
pub mod extract;
pub mod links;
pub mod render;
