//! The six wire frame shapes exchanged with agent processes.
//!
//! Frames travel as newline-delimited JSON with a `type` discriminator.
//! Anything that does not decode into exactly one of these shapes is a
//! protocol violation and the connection carrying it is closed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Token accounting attached to a response frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// A single protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame on every connection: the agent introduces itself.
    Register {
        agent_id: String,
        token: String,
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(default)]
        workdir: Option<String>,
    },
    /// Handshake answer from the control plane.
    Registered {
        agent_id: String,
        accepted: bool,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Outbound task for a remote agent.
    Dispatch {
        message_id: String,
        content: String,
        #[serde(default)]
        context: Option<serde_json::Value>,
    },
    /// Non-terminal status update for an in-flight dispatch.
    Progress {
        message_id: String,
        status: String,
        #[serde(default)]
        detail: Option<String>,
    },
    /// Terminal answer for a dispatch. Exactly one of content/error is
    /// expected to be set; an error response resolves the dispatch as failed.
    Response {
        message_id: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        usage: Option<Usage>,
        #[serde(default)]
        error: Option<String>,
    },
    /// Periodic liveness signal. Timestamp is unix milliseconds.
    Heartbeat { agent_id: String, timestamp: i64 },
}

impl Frame {
    /// Generate a fresh message ID (ULID).
    pub fn generate_message_id() -> String {
        ulid::Ulid::new().to_string()
    }

    /// The frame's wire discriminator, for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Register { .. } => "register",
            Frame::Registered { .. } => "registered",
            Frame::Dispatch { .. } => "dispatch",
            Frame::Progress { .. } => "progress",
            Frame::Response { .. } => "response",
            Frame::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Decode one frame from a wire line.
pub fn decode_frame(line: &str) -> Result<Frame> {
    serde_json::from_str(line.trim())
        .map_err(|e| Error::Protocol(format!("unparseable frame: {}", e)))
}

/// Encode a frame to its wire line (no trailing newline).
pub fn encode_frame(frame: &Frame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}
