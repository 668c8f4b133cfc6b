//! SSE transport and the server-sent-events decoder shared with streamable HTTP.
//!
//! Legacy MCP-over-SSE: the client keeps a `GET` event stream open, the server
//! announces a POST endpoint in an `endpoint` event, requests are POSTed there
//! and responses come back as `message` events on the stream. A background
//! task reads the stream and hands each response to the request waiting on
//! its id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::{
    next_request_id, to_header_map, HttpHeaders, McpSession, McpTransport, RpcChannel,
    RpcSession,
};
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout for HTTP transports.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body quoted in an error message.
pub(crate) const ERROR_BODY_PREVIEW: usize = 500;

// ─── SSE Decoding ────────────────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    /// The `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Incremental decoder: feed raw body chunks, get complete events.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_event(&String::from_utf8_lossy(&raw)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&String::from_utf8_lossy(&raw))
    }
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

/// Whether a `Content-Type` value denotes an event stream.
pub(crate) fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .eq_ignore_ascii_case("text/event-stream")
}

/// Truncate a response body for inclusion in an error message.
pub(crate) fn body_preview(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((idx, _)) => format!("{}...(truncated)", &body[..idx]),
        None => body.to_string(),
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Requests waiting for a response, keyed by id.
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<JsonRpcResponse>>,
    /// Set by the reader when the stream ends; no waiter is accepted after.
    closed: bool,
}

impl Pending {
    /// Drop every waiter and refuse new ones.
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

type PendingMap = Arc<Mutex<Pending>>;

/// MCP over a `GET` event stream plus POSTed requests.
pub struct SseTransport {
    url: reqwest::Url,
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new(url: &str, headers: &HttpHeaders) -> Result<Self, McpError> {
        let url = reqwest::Url::parse(url).map_err(|e| McpError::ConfigError {
            reason: format!("invalid server URL '{url}': {e}"),
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(to_header_map(headers)?)
            .build()
            .map_err(|e| McpError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { url, http })
    }

    fn connection_error(&self, reason: String) -> McpError {
        McpError::ConnectionError {
            server: self.url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn open(&self) -> Result<Box<dyn McpSession>, McpError> {
        let resp = self
            .http
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| self.connection_error(format!("failed to open event stream: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.connection_error(format!(
                "event stream rejected: HTTP {status}: {}",
                body_preview(&body)
            )));
        }

        let mut stream = Box::pin(resp.bytes_stream());
        let mut decoder = SseDecoder::new();
        let endpoint = loop {
            let chunk = match stream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    return Err(self.connection_error(format!("event stream read error: {e}")))
                }
                None => {
                    return Err(self.connection_error(
                        "event stream ended before the endpoint event".into(),
                    ))
                }
            };
            let announced = decoder
                .push(&chunk)
                .into_iter()
                .find(|event| event.event.as_deref() == Some("endpoint"));
            if let Some(event) = announced {
                break self.url.join(event.data.trim()).map_err(|e| {
                    self.connection_error(format!("invalid endpoint '{}': {e}", event.data))
                })?;
            }
        };

        tracing::debug!(server = %self.url, endpoint = %endpoint, "SSE endpoint announced");

        let pending: PendingMap = Arc::default();
        let reader = tokio::spawn(pump_events(
            stream,
            decoder,
            Arc::clone(&pending),
            self.url.to_string(),
        ));

        let channel = SseChannel {
            server: self.url.to_string(),
            http: self.http.clone(),
            endpoint,
            pending,
            reader,
        };
        let session = RpcSession::initialize(channel).await?;
        Ok(Box::new(session))
    }
}

/// Route `message` events to waiting requests until the stream ends.
async fn pump_events<S, B>(mut stream: S, mut decoder: SseDecoder, pending: PendingMap, server: String)
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "SSE stream read error");
                break;
            }
        };
        for event in decoder.push(chunk.as_ref()) {
            dispatch(&event, &pending, &server).await;
        }
    }
    if let Some(event) = decoder.finish() {
        dispatch(&event, &pending, &server).await;
    }

    tracing::debug!(server = %server, "SSE stream closed");
    pending.lock().await.close();
}

async fn dispatch(event: &SseEvent, pending: &PendingMap, server: &str) {
    if !event.is_message() {
        return;
    }
    let response = match serde_json::from_str::<JsonRpcResponse>(&event.data) {
        Ok(response) if response.method.is_none() => response,
        Ok(_) | Err(_) => {
            tracing::trace!(server = %server, data = %event.data, "ignoring non-response event");
            return;
        }
    };
    let waiter = {
        let mut pending = pending.lock().await;
        match response.id.as_u64() {
            Some(id) => pending.waiters.remove(&id),
            // A null-id error can only be attributed when one request waits.
            None if response.is_unattributed_error() && pending.waiters.len() == 1 => {
                let id = pending.waiters.keys().next().copied();
                id.and_then(|id| pending.waiters.remove(&id))
            }
            None => None,
        }
    };
    if let Some(waiter) = waiter {
        let _ = waiter.send(response);
    }
}

// ─── Channel ─────────────────────────────────────────────────────────────────

struct SseChannel {
    server: String,
    http: reqwest::Client,
    endpoint: reqwest::Url,
    pending: PendingMap,
    reader: JoinHandle<()>,
}

impl SseChannel {
    fn protocol_error(&self, reason: String) -> McpError {
        McpError::ProtocolError {
            server: self.server.clone(),
            reason,
        }
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<(), McpError> {
        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.protocol_error(format!("POST to {} failed: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.protocol_error(format!("HTTP {status}: {}", body_preview(&body))));
        }
        Ok(())
    }
}

#[async_trait]
impl RpcChannel for SseChannel {
    fn server(&self) -> &str {
        &self.server
    }

    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(self.protocol_error("event stream closed".into()));
            }
            pending.waiters.insert(id, tx);
        }

        let req = JsonRpcRequest::new(id, method, params);
        if let Err(e) = self.post(&req).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        rx.await
            .map_err(|_| self.protocol_error(format!("event stream closed before response to {method}")))
    }

    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await
    }

    async fn shutdown(&mut self) -> Result<(), McpError> {
        self.reader.abort();
        self.pending.lock().await.close();
        Ok(())
    }
}

impl Drop for SseChannel {
    /// Stop the event reader if the session is dropped without `close()`.
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
