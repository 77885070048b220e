//! Client for OpenAI-compatible completion endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatModel, LlmError, Role};

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiLikeOptions {
    pub model: String,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub api_base: String,
    pub api_key: String,
    /// Use `/chat/completions` (true) or `/completions` (false).
    pub is_chat_model: bool,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    /// Sequences that end generation. The ReAct protocol stops before the
    /// model can invent its own observation.
    pub stop: Vec<String>,
}

impl OpenAiLikeOptions {
    pub fn new(model: String, api_base: String, api_key: String) -> Self {
        Self {
            model,
            api_base,
            api_key,
            is_chat_model: true,
            timeout: Duration::from_secs(120),
            temperature: None,
            stop: vec!["Observation:".to_string()],
        }
    }
}

fn no_stop_sequences(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "no_stop_sequences")]
    stop: &'a [String],
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "no_stop_sequences")]
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// [`ChatModel`] over an OpenAI-compatible HTTP API.
pub struct OpenAiLikeClient {
    http: reqwest::Client,
    options: OpenAiLikeOptions,
}

impl OpenAiLikeClient {
    pub fn new(options: OpenAiLikeOptions) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self { http, options })
    }

    pub fn model(&self) -> &str {
        &self.options.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.options.api_base.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<String, LlmError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.options.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.options.timeout)
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiLikeClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let content = if self.options.is_chat_model {
            let request = ChatCompletionRequest {
                model: &self.options.model,
                messages: wire_messages(messages),
                temperature: self.options.temperature,
                stop: &self.options.stop,
            };
            let body = self.post("chat/completions", &request).await?;
            let parsed: ChatCompletionResponse =
                serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
        } else {
            let request = CompletionRequest {
                model: &self.options.model,
                prompt: flatten_prompt(messages),
                temperature: self.options.temperature,
                stop: &self.options.stop,
            };
            let body = self.post("completions", &request).await?;
            let parsed: CompletionResponse =
                serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;
            parsed.choices.into_iter().next().map(|c| c.text)
        };

        match content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(LlmError::EmptyResponse),
        }
    }
}

/// Text-protocol observations have no tool-call id, so they travel as user
/// turns.
fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: match m.role {
                Role::System => "system",
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        })
        .collect()
}

fn flatten_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    prompt.push_str("\nassistant: ");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_messages_are_sent_as_user_turns() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("question"),
            ChatMessage::assistant("Thought: look\nAction: ls"),
            ChatMessage::tool("Observation: a.txt"),
        ];
        let wire = serde_json::to_value(wire_messages(&messages)).unwrap();
        assert_eq!(
            wire,
            json!([
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "question"},
                {"role": "assistant", "content": "Thought: look\nAction: ls"},
                {"role": "user", "content": "Observation: a.txt"}
            ])
        );
    }

    #[test]
    fn completion_prompt_ends_with_assistant_turn() {
        let prompt = flatten_prompt(&[ChatMessage::system("sys"), ChatMessage::user("hi")]);
        assert_eq!(prompt, "system: sys\nuser: hi\nassistant: ");
    }

    #[test]
    fn url_tolerates_trailing_slash() {
        let client = OpenAiLikeClient::new(OpenAiLikeOptions::new(
            "m".to_string(),
            "http://localhost:8000/v1/".to_string(),
            "k".to_string(),
        ))
        .unwrap();
        assert_eq!(client.url("chat/completions"), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn request_omits_empty_optionals() {
        let request = ChatCompletionRequest {
            model: "m",
            messages: vec![],
            temperature: None,
            stop: &[],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"model": "m", "messages": []})
        );
    }
}
