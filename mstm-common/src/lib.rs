//! # MSTM Common Library
//!
//! Shared code for the MSTM music streaming microservices including:
//! - Error types
//! - TOML configuration file discovery and loading
//! - Event types published to the message broker
//! - Bearer token validation for API requests

pub mod api;
pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::PlaybackEvent;
