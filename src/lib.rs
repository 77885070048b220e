//! # MCP Agent
//!
//! A ReAct agent that answers questions using tools served by a remote
//! Model Context Protocol server.
//!
//! This library provides:
//! - An MCP client over HTTP Server-Sent Events with per-request correlation
//! - A tool registry built from the server's capability listing
//! - A think/act/observe loop driving any OpenAI-compatible model
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Connect to the tool server and list its tools once
//! 2. Format a fixed system prompt describing those tools
//! 3. Call the model, parse its reply into an action or an answer
//! 4. Run the action, feed the observation back, repeat until answered or
//!    the iteration bound is reached
//!
//! ## Example
//!
//! ```rust,ignore
//! use mcp_agent::{Config, Session};
//!
//! let config = Config::from_env()?;
//! let session = Session::connect(&config).await?;
//! let outcome = session.ask("What is the main finding of the data?").await;
//! println!("{}", outcome);
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod mcp;
pub mod session;
pub mod tools;

#[cfg(test)]
mod testing;

pub use agent::AgentOutcome;
pub use config::Config;
pub use session::{Session, SessionError};
