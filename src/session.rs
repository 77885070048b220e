//! Session setup and teardown.
//!
//! A session owns one tool server connection, the tool registry built from
//! it, and an agent whose system prompt is formatted once from that
//! registry. Everything that can fail at startup fails here, before the model
//! is ever called.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::agent::{build_system_prompt, Agent, AgentOutcome, REACT_TEMPLATE};
use crate::config::{Config, ConfigError};
use crate::llm::{ChatModel, LlmError, OpenAiLikeClient};
use crate::mcp::{McpError, SseTransport, ToolTransport};
use crate::tools::{ToolDescriptor, ToolError, ToolRegistry};

/// Errors that prevent a session from starting.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to tool server: {0}")]
    Connect(McpError),

    #[error("failed to load tools: {0}")]
    Tools(ToolError),

    #[error("failed to create model client: {0}")]
    Model(LlmError),
}

/// A connected agent ready to answer questions.
pub struct Session {
    agent: Agent,
    registry: Arc<ToolRegistry>,
    cancel: CancellationToken,
}

impl Session {
    /// Connect using the OpenAI-compatible client described by `config`.
    pub async fn connect(config: &Config) -> Result<Self, SessionError> {
        config.validate()?;
        let chat = OpenAiLikeClient::new(config.model_options()).map_err(SessionError::Model)?;
        Self::connect_with_model(config, Arc::new(chat)).await
    }

    /// Connect to the configured tool server with a caller-supplied model.
    pub async fn connect_with_model(
        config: &Config,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let endpoint = SseTransport::endpoint_for(&config.mcp_host, config.mcp_port)
            .map_err(SessionError::Connect)?;
        let transport = SseTransport::connect(endpoint, config.transport_options())
            .await
            .map_err(SessionError::Connect)?;
        Self::with_transport(config, chat, Arc::new(transport)).await
    }

    /// Build a session on top of an already connected transport.
    pub async fn with_transport(
        config: &Config,
        chat: Arc<dyn ChatModel>,
        transport: Arc<dyn ToolTransport>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let registry = match ToolRegistry::load(Arc::clone(&transport)).await {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                transport.close().await;
                return Err(SessionError::Tools(e));
            }
        };

        let system_prompt = build_system_prompt(&config.task, registry.list_tools(), REACT_TEMPLATE);
        let agent = Agent::new(chat, Arc::clone(&registry), system_prompt, config.agent_options());

        Ok(Self {
            agent,
            registry,
            cancel: CancellationToken::new(),
        })
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        self.registry.list_tools()
    }

    /// Token that aborts the current and any future question when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the agent on one question.
    ///
    /// If the session was cancelled meanwhile, the connection is closed
    /// before returning.
    pub async fn ask(&self, question: &str) -> AgentOutcome {
        let outcome = self.agent.run(question, &self.cancel).await;
        if self.cancel.is_cancelled() {
            self.registry.close().await;
        }
        outcome
    }

    /// Cancel in-flight work and close the tool server connection.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.registry.close().await;
    }
}
