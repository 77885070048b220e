//! Tool registry backed by a remote tool server.
//!
//! The registry turns the server's capability listing into
//! [`ToolDescriptor`]s once, at session start, and afterwards routes every
//! call through the shared transport. A failed call never propagates as an
//! error: it comes back as a [`ToolObservation`] the model can read.

mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::mcp::{McpError, RawCapability, ToolTransport};

pub use schema::validate_arguments;

/// Errors surfaced by the registry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("unknown tool '{name}' (available: {available})")]
    UnknownTool { name: String, available: String },

    #[error("invalid arguments for '{tool}': {}", .fields.join("; "))]
    InvalidArguments { tool: String, fields: Vec<String> },

    /// Two capabilities share a name; the session cannot start.
    #[error("configuration error: tool '{0}' is advertised more than once")]
    DuplicateTool(String),

    #[error(transparent)]
    Transport(#[from] McpError),
}

impl ToolError {
    /// Whether the loop can carry on after this error by showing it to the
    /// model.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ToolError::UnknownTool { .. } | ToolError::InvalidArguments { .. } => true,
            ToolError::Transport(McpError::Remote(_))
            | ToolError::Transport(McpError::Timeout(_))
            | ToolError::Transport(McpError::Protocol(_)) => true,
            ToolError::Transport(McpError::Connection(_)) | ToolError::DuplicateTool(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Transport(McpError::Timeout(_)))
    }
}

/// A callable tool as the reasoning loop sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
}

impl From<RawCapability> for ToolDescriptor {
    fn from(raw: RawCapability) -> Self {
        Self {
            name: raw.name,
            description: raw.description.unwrap_or_default(),
            parameter_schema: raw
                .input_schema
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        }
    }
}

/// Outcome of one tool call, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolObservation {
    pub tool_name: String,
    pub raw_result: Result<String, ToolError>,
}

impl ToolObservation {
    /// Text of the tool-role message appended to the conversation.
    pub fn to_message_content(&self) -> String {
        match &self.raw_result {
            Ok(text) => format!("Observation: {}", text),
            Err(e) => format!("Observation: Error: {}", e),
        }
    }

    pub fn is_error(&self) -> bool {
        self.raw_result.is_err()
    }
}

/// Registry of the tools offered by one tool server.
pub struct ToolRegistry {
    transport: Arc<dyn ToolTransport>,
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// List the server's capabilities and build descriptors from them.
    ///
    /// # Errors
    ///
    /// Transport failures while listing, and [`ToolError::DuplicateTool`]
    /// when two capabilities share a name.
    pub async fn load(transport: Arc<dyn ToolTransport>) -> Result<Self, ToolError> {
        let capabilities = transport.list_capabilities().await?;

        let mut tools = Vec::with_capacity(capabilities.len());
        let mut by_name = HashMap::with_capacity(capabilities.len());
        for capability in capabilities {
            let descriptor = ToolDescriptor::from(capability);
            if by_name.contains_key(&descriptor.name) {
                return Err(ToolError::DuplicateTool(descriptor.name));
            }
            by_name.insert(descriptor.name.clone(), tools.len());
            tools.push(descriptor);
        }

        tracing::info!(
            "Registered {} tools: {}",
            tools.len(),
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            transport,
            tools,
            by_name,
        })
    }

    /// All descriptors, in the order the server listed them.
    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Validate and run one tool call.
    pub async fn call(&self, name: &str, arguments: Map<String, Value>) -> ToolObservation {
        let raw_result = self.try_call(name, arguments).await;
        if let Err(e) = &raw_result {
            tracing::warn!("Tool '{}' failed: {}", name, e);
        }
        ToolObservation {
            tool_name: name.to_string(),
            raw_result,
        }
    }

    async fn try_call(&self, name: &str, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let descriptor = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
            available: self.tool_names().join(", "),
        })?;

        let problems = validate_arguments(&descriptor.parameter_schema, &arguments);
        if !problems.is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: name.to_string(),
                fields: problems,
            });
        }

        tracing::debug!("Invoking tool '{}'", name);
        Ok(self.transport.invoke(name, arguments).await?)
    }

    /// Close the underlying connection.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}
