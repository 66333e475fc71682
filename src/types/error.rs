//! Unified error types for the sync core
//!
//! This module defines error types that:
//! - Are serializable for frontend consumption
//! - Provide actionable error messages
//! - Stay non-fatal: no condition in this crate aborts the process
//!
//! Stale thread-load responses and missing optimistic swap targets are
//! deliberately *not* errors; the stores handle both as silent no-ops.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for store operations and gateway calls
///
/// All errors are serializable so they can be sent to the frontend.
/// Gateway implementations are expected to reject with `Network` or
/// `Timeout` rather than hang.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum ChatError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

// Implement From for common error types

impl From<toml::de::Error> for ChatError {
    fn from(err: toml::de::Error) -> Self {
        ChatError::Config(err.to_string())
    }
}

impl From<String> for ChatError {
    fn from(err: String) -> Self {
        ChatError::Other(err)
    }
}

impl From<&str> for ChatError {
    fn from(err: &str) -> Self {
        ChatError::Other(err.to_string())
    }
}

/// Result type alias using ChatError
pub type Result<T> = std::result::Result<T, ChatError>;
