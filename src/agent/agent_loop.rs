//! Core agent loop implementation.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::llm::{ChatMessage, ChatModel};
use crate::tools::ToolRegistry;

use super::parser::{parse_step, ReasoningStep};
use super::state::{LoopState, LoopStatus};

/// What to do with a reply that is neither an action nor an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePolicy {
    /// Show the model a corrective instruction and ask again, at most
    /// `max_retries` times per run. Retries do not consume iterations.
    Retry { max_retries: usize },
    /// Fail the run on the first unparseable reply.
    Strict,
}

impl Default for ParsePolicy {
    fn default() -> Self {
        Self::Retry { max_retries: 2 }
    }
}

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Maximum number of tool calls per run. Must be positive.
    pub max_iterations: usize,
    pub parse_policy: ParsePolicy,
    /// Consecutive tool timeouts tolerated before the run fails.
    pub tool_timeout_retries: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            parse_policy: ParsePolicy::default(),
            tool_timeout_retries: 2,
        }
    }
}

/// Step at which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Model,
    Parse,
    Transport,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => write!(f, "model call"),
            Self::Parse => write!(f, "parse"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// Result of one run. Exactly one of these reaches the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Answered {
        answer: String,
        iterations: usize,
        conversation: Vec<ChatMessage>,
    },
    Exhausted {
        iterations: usize,
        last_observation: Option<String>,
        conversation: Vec<ChatMessage>,
    },
    Failed {
        stage: FailureStage,
        cause: String,
        iterations: usize,
        conversation: Vec<ChatMessage>,
    },
}

impl AgentOutcome {
    pub fn status(&self) -> LoopStatus {
        match self {
            Self::Answered { .. } => LoopStatus::Answered,
            Self::Exhausted { .. } => LoopStatus::Exhausted,
            Self::Failed { .. } => LoopStatus::Failed,
        }
    }

    /// Tool calls made during the run.
    pub fn iterations(&self) -> usize {
        match self {
            Self::Answered { iterations, .. }
            | Self::Exhausted { iterations, .. }
            | Self::Failed { iterations, .. } => *iterations,
        }
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        match self {
            Self::Answered { conversation, .. }
            | Self::Exhausted { conversation, .. }
            | Self::Failed { conversation, .. } => conversation,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answered { answer, .. } => Some(answer),
            _ => None,
        }
    }
}

impl fmt::Display for AgentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answered { answer, .. } => write!(f, "{}", answer),
            Self::Exhausted {
                iterations,
                last_observation,
                ..
            } => {
                write!(
                    f,
                    "Reached the limit of {} tool calls without a final answer.",
                    iterations
                )?;
                if let Some(observation) = last_observation {
                    write!(f, "\nLast {}", observation)?;
                }
                Ok(())
            }
            Self::Failed { stage, cause, .. } => {
                write!(f, "Agent failed during {}: {}", stage, cause)
            }
        }
    }
}

/// The reasoning/acting agent.
pub struct Agent {
    chat: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    options: AgentOptions,
}

impl Agent {
    /// Create an agent. `system_prompt` is fixed for the agent's lifetime.
    pub fn new(
        chat: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        system_prompt: String,
        options: AgentOptions,
    ) -> Self {
        Self {
            chat,
            tools,
            system_prompt,
            options,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Answer one user message.
    pub async fn run(&self, user_message: &str, cancel: &CancellationToken) -> AgentOutcome {
        let run_id = Uuid::new_v4();
        self.run_loop(user_message, cancel)
            .instrument(tracing::info_span!("agent_run", %run_id))
            .await
    }

    async fn run_loop(&self, user_message: &str, cancel: &CancellationToken) -> AgentOutcome {
        let mut state = LoopState::new(&self.system_prompt, user_message, self.options.max_iterations);
        let mut parse_failures = 0usize;
        let mut consecutive_timeouts = 0usize;
        let mut last_observation: Option<String> = None;

        while state.can_call_model() {
            tracing::debug!("Agent iteration {}", state.iteration_count() + 1);

            let reply = tokio::select! {
                _ = cancel.cancelled() => None,
                reply = self.chat.complete(state.conversation()) => Some(reply),
            };
            let reply = match reply {
                Some(Ok(text)) => text,
                Some(Err(e)) => return fail(state, FailureStage::Model, e.to_string()),
                None => return fail(state, FailureStage::Model, "cancelled".to_string()),
            };

            match parse_step(&reply) {
                ReasoningStep::FinalAnswer { answer, .. } => {
                    state.push(ChatMessage::assistant(reply));
                    state.finish(LoopStatus::Answered);
                    tracing::info!("Answered after {} tool calls", state.iteration_count());
                    return AgentOutcome::Answered {
                        answer,
                        iterations: state.iteration_count(),
                        conversation: state.into_conversation(),
                    };
                }
                ReasoningStep::Unparseable { reason, .. } => {
                    parse_failures += 1;
                    match self.options.parse_policy {
                        ParsePolicy::Strict => {
                            state.push(ChatMessage::assistant(reply));
                            return fail(state, FailureStage::Parse, reason);
                        }
                        ParsePolicy::Retry { max_retries } if parse_failures > max_retries => {
                            state.push(ChatMessage::assistant(reply));
                            return fail(
                                state,
                                FailureStage::Parse,
                                format!("{} (gave up after {} retries)", reason, max_retries),
                            );
                        }
                        ParsePolicy::Retry { .. } => {
                            tracing::warn!("Unparseable model reply, asking again: {}", reason);
                            state.push(ChatMessage::assistant(reply));
                            state.push(ChatMessage::user(corrective_instruction(&reason)));
                        }
                    }
                }
                ReasoningStep::ToolCall {
                    tool_name,
                    arguments,
                    ..
                } => {
                    state.push(ChatMessage::assistant(reply));
                    tracing::info!("Calling tool: {}", tool_name);

                    let observation = tokio::select! {
                        _ = cancel.cancelled() => None,
                        observation = self.tools.call(&tool_name, arguments) => Some(observation),
                    };
                    let Some(observation) = observation else {
                        return fail(state, FailureStage::Transport, "cancelled".to_string());
                    };

                    let content = observation.to_message_content();
                    state.push(ChatMessage::tool(content.clone()));
                    state.record_tool_step();
                    last_observation = Some(content);

                    match &observation.raw_result {
                        Err(e) if e.is_timeout() => {
                            consecutive_timeouts += 1;
                            if consecutive_timeouts > self.options.tool_timeout_retries {
                                return fail(
                                    state,
                                    FailureStage::Transport,
                                    format!("{} ({} consecutive timeouts)", e, consecutive_timeouts),
                                );
                            }
                        }
                        Err(e) if !e.is_recoverable() => {
                            return fail(state, FailureStage::Transport, e.to_string());
                        }
                        _ => consecutive_timeouts = 0,
                    }
                }
            }
        }

        tracing::warn!(
            "Max iterations ({}) reached without a final answer",
            state.max_iterations()
        );
        AgentOutcome::Exhausted {
            iterations: state.iteration_count(),
            last_observation,
            conversation: state.into_conversation(),
        }
    }
}

fn fail(mut state: LoopState, stage: FailureStage, cause: String) -> AgentOutcome {
    tracing::error!("Agent failed during {}: {}", stage, cause);
    state.finish(LoopStatus::Failed);
    AgentOutcome::Failed {
        stage,
        cause,
        iterations: state.iteration_count(),
        conversation: state.into_conversation(),
    }
}

fn corrective_instruction(reason: &str) -> String {
    format!(
        "Your previous reply could not be parsed ({}). Reply in exactly one of the two formats \
         from the instructions: `Thought:`, `Action:` and `Action Input:` with a JSON object, \
         or `Thought:` followed by `Answer:`.",
        reason
    )
}
