//! JSON-RPC 2.0 envelopes and the MCP payloads the agent needs.
//!
//! Only the client side of `initialize`, `tools/list` and `tools/call` is
//! modelled. Everything else the server sends is either a response we are
//! waiting for or noise we log and drop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision announced during the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const JSONRPC_VERSION: &str = "2.0";

/// Outgoing request. `id` is what the correlation table keys on.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Outgoing notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params: None,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response to one of our requests.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JsonRpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Anything that can arrive on the event stream.
///
/// Server-initiated requests and notifications carry a `method`; responses
/// don't. Servers are free to use string ids for their own requests, so the
/// id is kept loose here and narrowed when routing.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingFrame {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl IncomingFrame {
    /// Interpret the frame as a response to one of our integer-id requests.
    pub fn into_response(self) -> Option<JsonRpcResponse> {
        if self.method.is_some() {
            return None;
        }
        let id = self.id?.as_u64()?;
        Some(JsonRpcResponse {
            id,
            result: self.result,
            error: self.error,
        })
    }
}

/// Tool as advertised by `tools/list`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawCapability {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<RawCapability>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One content block of a `tools/call` result.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
    },
    Resource {
        resource: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Render the content blocks as the text the model will observe.
    pub fn to_text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::Image { .. } => "[image]".to_string(),
                ContentBlock::Resource { resource } => match resource.get("text") {
                    Some(Value::String(text)) => text.clone(),
                    _ => format!(
                        "[resource: {}]",
                        resource
                            .get("uri")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                    ),
                },
                ContentBlock::Unknown => "[unsupported content]".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_without_null_params() {
        let req = JsonRpcRequest::new(7, "tools/list", None);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}));
    }

    #[test]
    fn frame_with_method_is_not_a_response() {
        let frame: IncomingFrame = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {}
        }))
        .unwrap();
        assert!(frame.into_response().is_none());
    }

    #[test]
    fn frame_with_string_id_is_not_ours() {
        let frame: IncomingFrame =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": "abc", "result": {}})).unwrap();
        assert!(frame.into_response().is_none());
    }

    #[test]
    fn frame_with_error_becomes_response() {
        let frame: IncomingFrame = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();
        let resp = frame.into_response().unwrap();
        assert_eq!(resp.id, 3);
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[test]
    fn call_result_text_joins_blocks() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "fs://data/a.csv"}},
                {"type": "text", "text": "last"}
            ]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(
            result.to_text(),
            "first\n[image]\n[resource: fs://data/a.csv]\nlast"
        );
    }

    #[test]
    fn unknown_content_block_does_not_fail_deserialization() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "audio", "data": "..."}],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.to_text(), "[unsupported content]");
    }
}
