//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{ChatMessage, ChatModel, LlmError};
use crate::mcp::{McpError, RawCapability, ToolTransport};

pub(crate) fn capability(name: &str, schema: Value) -> RawCapability {
    RawCapability {
        name: name.to_string(),
        description: Some(format!("The {} tool", name)),
        input_schema: Some(schema),
    }
}

/// Transport that answers from a per-tool script. The last scripted reply for
/// a tool repeats once the script runs out.
pub(crate) struct ScriptedTransport {
    capabilities: Vec<RawCapability>,
    listing_error: Option<McpError>,
    replies: Mutex<HashMap<String, VecDeque<Result<String, McpError>>>>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    hang: bool,
    closed: AtomicBool,
}

impl ScriptedTransport {
    pub(crate) fn new(capabilities: Vec<RawCapability>) -> Self {
        Self {
            capabilities,
            listing_error: None,
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            hang: false,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn respond(self, tool: &str, reply: Result<String, McpError>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(tool.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn failing_listing(mut self, error: McpError) -> Self {
        self.listing_error = Some(error);
        self
    }

    /// Every invocation waits forever.
    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolTransport for ScriptedTransport {
    async fn list_capabilities(&self) -> Result<Vec<RawCapability>, McpError> {
        match &self.listing_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.capabilities.clone()),
        }
    }

    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool_name.to_string(), arguments));
        if self.hang {
            futures::future::pending::<()>().await;
        }
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(tool_name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Ok(format!("{} ok", tool_name)),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Chat model that replays canned assistant replies and records every
/// conversation it was shown.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    hang: bool,
}

impl ScriptedModel {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            seen: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    pub(crate) fn failing(error: LlmError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(vec![Err(error)])),
            seen: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            hang: true,
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(crate) fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        if self.hang {
            futures::future::pending::<()>().await;
        }
        let mut replies = self.replies.lock().unwrap();
        match replies.len() {
            0 => Err(LlmError::EmptyResponse),
            1 => replies[0].clone(),
            _ => replies.pop_front().unwrap(),
        }
    }
}
