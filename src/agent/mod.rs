//! Agent module - the reasoning/acting loop.
//!
//! The agent follows the ReAct pattern:
//! 1. Seed the conversation with the system prompt and the user message
//! 2. Ask the model for its next step
//! 3. If the step is an action, call the tool and append the observation
//! 4. Repeat until the model answers or the iteration bound is reached

mod agent_loop;
mod parser;
mod prompt;
mod state;

pub use agent_loop::{Agent, AgentOptions, AgentOutcome, FailureStage, ParsePolicy};
pub use parser::{parse_step, ReasoningStep};
pub use prompt::{build_system_prompt, render_tools, DEFAULT_TASK, REACT_TEMPLATE};
pub use state::{LoopState, LoopStatus};
