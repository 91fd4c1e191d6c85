//! Error types for swarmlink.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Agent already connected: {0}")]
    AlreadyConnected(String),

    #[error("Agent not connected: {0}")]
    NotConnected(String),

    #[error("Registration rejected for {agent_id}: {reason}")]
    Unauthorized { agent_id: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Dispatch {0} timed out")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}
