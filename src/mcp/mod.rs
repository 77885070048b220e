//! Model Context Protocol client.
//!
//! The agent only needs two things from a tool server: the list of tools it
//! offers and a way to call one. [`ToolTransport`] captures exactly that so
//! the registry and the loop never see wire details. [`SseTransport`] is the
//! production implementation, speaking JSON-RPC 2.0 over an HTTP
//! Server-Sent Events stream.

mod pending;
pub mod protocol;
mod sse;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use pending::{PendingCall, PendingRequests};
pub use protocol::{CallToolResult, RawCapability};
pub use sse::{SseTransport, SseTransportOptions};

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum McpError {
    /// Host unreachable, handshake failed, or the stream went away.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server sent something we could not make sense of.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response within the per-call deadline.
    #[error("no response from tool server after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error (JSON-RPC error or `isError`).
    #[error("tool server reported an error: {0}")]
    Remote(String),
}

/// A live connection to a tool server.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Fetch every capability the server advertises.
    async fn list_capabilities(&self) -> Result<Vec<RawCapability>, McpError>;

    /// Invoke one tool and return its textual result.
    async fn invoke(&self, tool_name: &str, arguments: Map<String, Value>)
        -> Result<String, McpError>;

    /// Tear the connection down. In-flight calls fail with
    /// [`McpError::Connection`].
    async fn close(&self);
}
