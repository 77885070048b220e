//! Configuration management for the agent.
//!
//! Configuration can be set via environment variables:
//! - `OPENAI_MODEL` - Required. Model identifier sent to the endpoint.
//! - `OPENAI_ENDPOINT` - Required. Base URL of the OpenAI-compatible API.
//! - `OPENAI_API_KEY` - Required. Credential for the model endpoint.
//! - `MCP_HOST` - Required. Tool server host.
//! - `MCP_PORT` - Required. Tool server port.
//! - `IS_CHAT_MODEL` - Optional. Use the chat completions API. Defaults to `true`.
//! - `MAX_ITERATIONS` - Optional. Maximum tool calls per question. Defaults to `20`.
//! - `TOOL_TIMEOUT_SECS` - Optional. Per tool call deadline. Defaults to `30`.
//! - `MODEL_TIMEOUT_SECS` - Optional. Per model call deadline. Defaults to `120`.
//! - `CONNECT_TIMEOUT_SECS` - Optional. Tool server connect deadline. Defaults to `10`.
//! - `TOOL_TIMEOUT_RETRIES` - Optional. Consecutive tool timeouts tolerated. Defaults to `2`.
//! - `PARSE_POLICY` - Optional. `retry` or `strict`. Defaults to `retry`.
//! - `MAX_PARSE_RETRIES` - Optional. Corrective retries under `retry`. Defaults to `2`.
//! - `AGENT_TASK` - Optional. Task description placed before the ReAct instructions.

use std::time::Duration;

use thiserror::Error;

use crate::agent::{AgentOptions, ParsePolicy, DEFAULT_TASK};
use crate::llm::OpenAiLikeOptions;
use crate::mcp::SseTransportOptions;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model identifier
    pub model: String,

    /// Base URL of the model endpoint
    pub model_endpoint: String,

    /// Credential for the model endpoint
    pub api_key: String,

    /// Chat-style (true) or completion-style (false) invocation
    pub is_chat_model: bool,

    /// Tool server host
    pub mcp_host: String,

    /// Tool server port
    pub mcp_port: u16,

    /// Maximum tool calls per question
    pub max_iterations: usize,

    /// Deadline for each tool call
    pub tool_timeout: Duration,

    /// Deadline for each model call
    pub model_timeout: Duration,

    /// Deadline for connecting to the tool server
    pub connect_timeout: Duration,

    /// Consecutive tool timeouts tolerated before giving up
    pub tool_timeout_retries: usize,

    /// Handling of unparseable model replies
    pub parse_policy: ParsePolicy,

    /// Task description prepended to the system prompt
    pub task: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if a required variable is unset and
    /// `ConfigError::InvalidValue` if a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let model = required("OPENAI_MODEL")?;
        let model_endpoint = required("OPENAI_ENDPOINT")?;
        let api_key = required("OPENAI_API_KEY")?;
        let mcp_host = required("MCP_HOST")?;
        let mcp_port: u16 = parse_value("MCP_PORT", &required("MCP_PORT")?)?;

        let is_chat_model = lookup("IS_CHAT_MODEL")
            .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue("IS_CHAT_MODEL".to_string(), e)))
            .transpose()?
            .unwrap_or(true);

        let max_iterations = optional(&lookup, "MAX_ITERATIONS", 20usize)?;
        let tool_timeout = Duration::from_secs(optional(&lookup, "TOOL_TIMEOUT_SECS", 30u64)?);
        let model_timeout = Duration::from_secs(optional(&lookup, "MODEL_TIMEOUT_SECS", 120u64)?);
        let connect_timeout = Duration::from_secs(optional(&lookup, "CONNECT_TIMEOUT_SECS", 10u64)?);
        let tool_timeout_retries = optional(&lookup, "TOOL_TIMEOUT_RETRIES", 2usize)?;
        let max_parse_retries = optional(&lookup, "MAX_PARSE_RETRIES", 2usize)?;

        let parse_policy = match lookup("PARSE_POLICY")
            .map(|v| v.trim().to_lowercase())
            .as_deref()
        {
            None | Some("retry") => ParsePolicy::Retry {
                max_retries: max_parse_retries,
            },
            Some("strict") => ParsePolicy::Strict,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "PARSE_POLICY".to_string(),
                    format!("expected 'retry' or 'strict', got: {}", other),
                ))
            }
        };

        let task = lookup("AGENT_TASK").unwrap_or_else(|| DEFAULT_TASK.to_string());

        let config = Self {
            model,
            model_endpoint,
            api_key,
            is_chat_model,
            mcp_host,
            mcp_port,
            max_iterations,
            tool_timeout,
            model_timeout,
            connect_timeout,
            tool_timeout_retries,
            parse_policy,
            task,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(
        model: String,
        model_endpoint: String,
        api_key: String,
        mcp_host: String,
        mcp_port: u16,
    ) -> Self {
        Self {
            model,
            model_endpoint,
            api_key,
            is_chat_model: true,
            mcp_host,
            mcp_port,
            max_iterations: 20,
            tool_timeout: Duration::from_secs(30),
            model_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            tool_timeout_retries: 2,
            parse_policy: ParsePolicy::default(),
            task: DEFAULT_TASK.to_string(),
        }
    }

    /// Check invariants that the individual parsers cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        for (key, value) in [
            ("OPENAI_MODEL", &self.model),
            ("OPENAI_ENDPOINT", &self.model_endpoint),
            ("OPENAI_API_KEY", &self.api_key),
            ("MCP_HOST", &self.mcp_host),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingEnvVar(key.to_string()));
            }
        }
        Ok(())
    }

    pub fn model_options(&self) -> OpenAiLikeOptions {
        let mut options = OpenAiLikeOptions::new(
            self.model.clone(),
            self.model_endpoint.clone(),
            self.api_key.clone(),
        );
        options.is_chat_model = self.is_chat_model;
        options.timeout = self.model_timeout;
        options
    }

    pub fn transport_options(&self) -> SseTransportOptions {
        SseTransportOptions {
            connect_timeout: self.connect_timeout,
            request_timeout: self.tool_timeout,
            ..SseTransportOptions::default()
        }
    }

    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            max_iterations: self.max_iterations,
            parse_policy: self.parse_policy,
            tool_timeout_retries: self.tool_timeout_retries,
        }
    }
}

fn optional<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
