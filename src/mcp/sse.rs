//! MCP over HTTP Server-Sent Events.
//!
//! The client opens a long-lived `GET /sse` stream. The server's first
//! `endpoint` event names the URL that JSON-RPC messages must be POSTed to;
//! every response then comes back as a `message` event on the stream. One
//! background task reads the stream and routes responses by id through
//! [`PendingRequests`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{retry::Never, Event, EventSource};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::pending::PendingRequests;
use super::protocol::{
    CallToolResult, IncomingFrame, JsonRpcNotification, JsonRpcRequest, ListToolsResult,
    RawCapability, PROTOCOL_VERSION,
};
use super::{McpError, ToolTransport};

/// Connection tuning.
#[derive(Debug, Clone)]
pub struct SseTransportOptions {
    /// Deadline for opening the stream and receiving the `endpoint` event.
    pub connect_timeout: Duration,
    /// Deadline for each request/response exchange.
    pub request_timeout: Duration,
    pub client_name: String,
    pub client_version: String,
}

impl Default for SseTransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Persistent connection to an MCP server over SSE.
pub struct SseTransport {
    http: reqwest::Client,
    message_url: Url,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    options: SseTransportOptions,
}

impl SseTransport {
    /// The conventional stream URL for a server at `host:port`.
    pub fn endpoint_for(host: &str, port: u16) -> Result<Url, McpError> {
        Url::parse(&format!("http://{}:{}/sse", host, port)).map_err(|e| {
            McpError::Connection(format!("invalid tool server address {}:{}: {}", host, port, e))
        })
    }

    /// Open the stream, learn the message endpoint and run the `initialize`
    /// handshake.
    pub async fn connect(endpoint: Url, options: SseTransportOptions) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| McpError::Connection(format!("failed to build HTTP client: {}", e)))?;

        let mut events = EventSource::new(http.get(endpoint.clone()))
            .map_err(|e| McpError::Connection(format!("cannot open {}: {}", endpoint, e)))?;
        events.set_retry_policy(Box::new(Never));

        let announced =
            tokio::time::timeout(options.connect_timeout, wait_for_endpoint(&mut events, &endpoint))
                .await;
        let message_url = match announced {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                events.close();
                return Err(e);
            }
            Err(_) => {
                events.close();
                return Err(McpError::Connection(format!(
                    "{} sent no endpoint within {:?}",
                    endpoint, options.connect_timeout
                )));
            }
        };
        info!("Connected to tool server stream at {}", endpoint);
        debug!("Posting messages to {}", message_url);

        let pending = PendingRequests::new();
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_events(events, Arc::clone(&pending), cancel.clone()));

        let transport = Self {
            http,
            message_url,
            pending,
            cancel,
            reader: Mutex::new(Some(reader)),
            options,
        };

        if let Err(e) = transport.initialize().await {
            transport.close().await;
            return Err(match e {
                McpError::Connection(msg) => McpError::Connection(msg),
                other => McpError::Connection(format!("handshake failed: {}", other)),
            });
        }

        Ok(transport)
    }

    /// Whether the stream is still up.
    pub fn is_connected(&self) -> bool {
        !self.pending.is_closed()
    }

    /// Calls currently waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.pending.in_flight()
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": self.options.client_name,
                "version": self.options.client_version,
            }
        });
        let result = self.request("initialize", Some(params)).await?;

        let server = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        info!("MCP session initialized with {} (protocol {})", server, version);

        self.post(&JsonRpcNotification::new("notifications/initialized"))
            .await
    }

    /// Send one request and wait for the response with the same id.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let mut call = self
            .pending
            .register()
            .ok_or_else(|| McpError::Connection("connection closed".to_string()))?;
        let request = JsonRpcRequest::new(call.id(), method, params);
        let deadline = self.options.request_timeout;

        let exchange = async {
            self.post(&request).await?;
            call.response()
                .await
                .ok_or_else(|| McpError::Connection("connection closed".to_string()))
        };

        let response = tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| McpError::Timeout(deadline))??;

        if let Some(err) = response.error {
            return Err(McpError::Remote(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }
        response.result.ok_or_else(|| {
            McpError::Protocol(format!(
                "response {} carries neither result nor error",
                response.id
            ))
        })
    }

    async fn post<T: Serialize>(&self, body: &T) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.message_url.clone())
            .timeout(self.options.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| McpError::Connection(format!("failed to send message: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Protocol(format!(
                "tool server rejected message with {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ToolTransport for SseTransport {
    async fn list_capabilities(&self) -> Result<Vec<RawCapability>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(format!("malformed tools/list result: {}", e)))?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        return Err(McpError::Protocol(format!(
                            "tools/list repeated cursor {}",
                            next
                        )));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        info!("Tool server advertises {} tools", tools.len());
        Ok(tools)
    }

    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, McpError> {
        let params = json!({ "name": tool_name, "arguments": Value::Object(arguments) });
        let result = self.request("tools/call", Some(params)).await?;
        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("malformed tools/call result: {}", e)))?;

        if result.is_error {
            Err(McpError::Remote(result.to_text()))
        } else {
            Ok(result.to_text())
        }
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.pending.close();
        let reader = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = reader {
            if let Err(e) = handle.await {
                warn!("Tool server reader task ended abnormally: {}", e);
            }
            info!("Closed tool server connection");
        }
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.pending.close();
    }
}

/// Read events until the server announces where to POST messages.
async fn wait_for_endpoint(events: &mut EventSource, base: &Url) -> Result<Url, McpError> {
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Open) => debug!("Event stream opened"),
            Ok(Event::Message(msg)) if msg.event == "endpoint" => {
                return base.join(msg.data.trim()).map_err(|e| {
                    McpError::Connection(format!("bad endpoint {:?}: {}", msg.data, e))
                });
            }
            Ok(Event::Message(msg)) => {
                debug!("Ignoring '{}' event before endpoint", msg.event)
            }
            Err(e) => return Err(McpError::Connection(format!("{}: {}", base, e))),
        }
    }
    Err(McpError::Connection(format!(
        "{} closed the stream before sending an endpoint",
        base
    )))
}

async fn read_events(
    mut events: EventSource,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };

        match next {
            Some(Ok(Event::Message(msg))) if msg.event == "message" => dispatch(&pending, &msg.data),
            Some(Ok(Event::Message(msg))) => debug!("Ignoring '{}' event", msg.event),
            Some(Ok(Event::Open)) => {}
            Some(Err(e)) => {
                warn!("Tool server stream failed: {}", e);
                break;
            }
            None => {
                warn!("Tool server stream ended");
                break;
            }
        }
    }

    events.close();
    pending.close();
}

fn dispatch(pending: &PendingRequests, data: &str) {
    let frame: IncomingFrame = match serde_json::from_str(data) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping malformed frame from tool server: {}", e);
            return;
        }
    };

    let method = frame.method.clone();
    match frame.into_response() {
        Some(response) => {
            let id = response.id;
            if !pending.resolve(response) {
                warn!("Dropping response {} with no waiting caller", id);
            }
        }
        None => debug!("Ignoring server message {:?}", method),
    }
}
