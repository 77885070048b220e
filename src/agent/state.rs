//! Per-request loop state.

use crate::llm::ChatMessage;

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Running,
    Answered,
    Exhausted,
    Failed,
}

/// Conversation and counters for one user request.
///
/// The conversation is append-only. `iteration_count` counts tool calls and
/// never exceeds `max_iterations`; reaching the bound flips the status to
/// [`LoopStatus::Exhausted`].
#[derive(Debug, Clone)]
pub struct LoopState {
    conversation: Vec<ChatMessage>,
    iteration_count: usize,
    max_iterations: usize,
    status: LoopStatus,
}

impl LoopState {
    pub fn new(system_prompt: &str, user_message: &str, max_iterations: usize) -> Self {
        Self {
            conversation: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_message),
            ],
            iteration_count: 0,
            max_iterations,
            status: LoopStatus::Running,
        }
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn into_conversation(self) -> Vec<ChatMessage> {
        self.conversation
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    /// Whether another model call is allowed.
    pub fn can_call_model(&self) -> bool {
        self.status == LoopStatus::Running && self.iteration_count < self.max_iterations
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.conversation.push(message);
    }

    /// Count one tool call.
    pub fn record_tool_step(&mut self) {
        debug_assert!(self.iteration_count < self.max_iterations);
        self.iteration_count += 1;
        if self.iteration_count >= self.max_iterations && self.status == LoopStatus::Running {
            self.status = LoopStatus::Exhausted;
        }
    }

    pub fn finish(&mut self, status: LoopStatus) {
        self.status = status;
    }
}
