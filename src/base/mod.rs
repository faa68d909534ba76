//! Core components, types, and utilities for the ticket-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The sender allow-list.
//! - The TTL response cache.
//! - Common types and result handling.

pub mod access;
pub mod cache;
pub mod config;
pub mod types;
