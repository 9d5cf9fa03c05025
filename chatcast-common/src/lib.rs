//! # Chatcast Common Library
//!
//! Shared code for the chatcast services including:
//! - Error type shared across crates
//! - Event types (ChatcastEvent enum) and the EventBus
//! - TOML configuration file discovery and loading
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
