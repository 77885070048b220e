//! Parser for the think/act/observe reply format.
//!
//! A reply is one of:
//!
//! ```text
//! Thought: ...
//! Action: <tool name>
//! Action Input: {"json": "object"}
//! ```
//!
//! or
//!
//! ```text
//! Thought: ...
//! Answer: ...
//! ```
//!
//! When both markers are present the earlier one decides, so an `Action:`
//! quoted inside an answer stays part of the answer. Anything that fits
//! neither shape is [`ReasoningStep::Unparseable`].

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// What the model decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningStep {
    FinalAnswer {
        thought: Option<String>,
        answer: String,
    },
    ToolCall {
        thought: Option<String>,
        tool_name: String,
        arguments: Map<String, Value>,
    },
    Unparseable {
        raw: String,
        reason: String,
    },
}

fn thought_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Thought:\s*(.*?)\s*(?:Action:|Answer:|$)").expect("valid thought regex")
    })
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Action:[ \t]*([^\n]*)").expect("valid action regex"))
}

fn answer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Answer:\s*(.*)$").expect("valid answer regex"))
}

/// Classify one assistant reply.
pub fn parse_step(output: &str) -> ReasoningStep {
    let thought = thought_re()
        .captures(output)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty());

    let answer_at = answer_re().find(output).map(|m| m.start());
    let action = action_re()
        .captures(output)
        .filter(|a| match (a.get(0), answer_at) {
            (Some(m), Some(at)) => m.start() < at,
            _ => true,
        });

    if let Some(action) = action {
        let tool_name = action[1]
            .trim()
            .trim_matches(|c| c == '`' || c == '"' || c == '\'')
            .trim_end_matches("()")
            .to_string();
        if tool_name.is_empty() {
            return unparseable(output, "Action has no tool name");
        }

        let after_action = &output[action.get(0).map_or(0, |m| m.end())..];
        let Some(input_at) = after_action.find("Action Input:") else {
            return unparseable(output, "Action is missing its Action Input");
        };
        let input = &after_action[input_at + "Action Input:".len()..];

        return match parse_arguments(input) {
            Ok(arguments) => ReasoningStep::ToolCall {
                thought,
                tool_name,
                arguments,
            },
            Err(reason) => unparseable(output, &reason),
        };
    }

    if let Some(answer) = answer_re().captures(output) {
        let answer = answer[1].trim();
        if answer.is_empty() {
            return unparseable(output, "Answer is empty");
        }
        return ReasoningStep::FinalAnswer {
            thought,
            answer: answer.to_string(),
        };
    }

    unparseable(output, "reply contains neither an Action nor an Answer")
}

/// Read the first JSON value after `Action Input:`, tolerating a code fence.
fn parse_arguments(input: &str) -> Result<Map<String, Value>, String> {
    let mut text = input.trim_start();
    if text.starts_with("```") {
        text = text
            .find('\n')
            .map(|nl| &text[nl + 1..])
            .unwrap_or("")
            .trim_start();
    }

    let first = serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next();
    match first {
        Some(Ok(Value::Object(arguments))) => Ok(arguments),
        Some(Ok(other)) => Err(format!(
            "Action Input must be a JSON object, got {}",
            other
        )),
        Some(Err(e)) => Err(format!("Action Input is not valid JSON: {}", e)),
        None => Err("Action Input is empty".to_string()),
    }
}

fn unparseable(raw: &str, reason: &str) -> ReasoningStep {
    ReasoningStep::Unparseable {
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}
