//! Collaborator seams: registration credentials and task execution.
//!
//! The control plane itself never runs agent workloads; remote workers do.
//! [`TaskBackend`] is the contract a worker process satisfies, and the
//! reference worker in `server.rs` drives one. [`TokenValidator`] is
//! consulted during registration.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::AuthSettings;
use crate::error::Result;
use crate::protocol::Usage;

/// Validates registration credentials.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, agent_id: &str, token: &str) -> bool;
}

/// Token validator backed by static settings.
///
/// A per-agent token, when configured, overrides the shared token. With
/// nothing configured every credential is accepted.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    shared: Option<String>,
    per_agent: HashMap<String, String>,
}

impl StaticTokenValidator {
    pub fn new(shared: Option<String>, per_agent: HashMap<String, String>) -> Self {
        Self { shared, per_agent }
    }

    pub fn from_auth(auth: &AuthSettings) -> Self {
        Self {
            shared: auth.shared_token.clone(),
            per_agent: auth.agent_tokens.clone(),
        }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, agent_id: &str, token: &str) -> bool {
        if let Some(expected) = self.per_agent.get(agent_id) {
            return expected == token;
        }
        match &self.shared {
            Some(shared) => shared == token,
            None => true,
        }
    }
}

/// Structured result of one task execution.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub content: String,
    pub usage: Option<Usage>,
}

/// Task execution contract satisfied by worker processes.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Execute one task and return its structured result.
    async fn execute(
        &self,
        role: &str,
        model: &str,
        prompt: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<TaskResult>;
}

/// Backend that echoes the prompt back, tagged with the role.
///
/// Useful for wiring tests and as a worker smoke-test target.
#[derive(Debug, Clone, Default)]
pub struct EchoBackend;

#[async_trait]
impl TaskBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(
        &self,
        role: &str,
        _model: &str,
        prompt: &str,
        _context: Option<&serde_json::Value>,
    ) -> Result<TaskResult> {
        Ok(TaskResult {
            content: format!("[{}] {}", role, prompt),
            usage: Some(Usage {
                input_tokens: prompt.len() as u64,
                output_tokens: prompt.len() as u64,
            }),
        })
    }
}
