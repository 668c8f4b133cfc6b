//! Streamable HTTP transport.
//!
//! Every JSON-RPC message is POSTed to the server url. The server answers with
//! either a JSON body or an event-stream body carrying the response. The
//! `Mcp-Session-Id` returned by `initialize` is echoed on every later request
//! and the session is ended with a `DELETE`.

use async_trait::async_trait;
use futures::StreamExt;

use super::errors::McpError;
use super::sse::{body_preview, is_event_stream, SseDecoder, CONNECT_TIMEOUT};
use super::transport::{
    next_request_id, to_header_map, HttpHeaders, McpSession, McpTransport, RpcChannel,
    RpcSession,
};
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Session header assigned by the server at initialize.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

// ─── Transport ───────────────────────────────────────────────────────────────

pub struct StreamableHttpTransport {
    url: reqwest::Url,
    http: reqwest::Client,
}

impl StreamableHttpTransport {
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
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn open(&self) -> Result<Box<dyn McpSession>, McpError> {
        let channel = HttpChannel {
            server: self.url.to_string(),
            url: self.url.clone(),
            http: self.http.clone(),
            session_id: None,
        };
        let session = RpcSession::initialize(channel).await?;
        Ok(Box::new(session))
    }
}

// ─── Channel ─────────────────────────────────────────────────────────────────

struct HttpChannel {
    server: String,
    url: reqwest::Url,
    http: reqwest::Client,
    session_id: Option<String>,
}

impl HttpChannel {
    fn protocol_error(&self, reason: String) -> McpError {
        McpError::ProtocolError {
            server: self.server.clone(),
            reason,
        }
    }

    /// POST one message and return the successful response.
    async fn post(&mut self, body: &impl serde::Serialize) -> Result<reqwest::Response, McpError> {
        let mut builder = self
            .http
            .post(self.url.clone())
            .header(
                reqwest::header::ACCEPT,
                "application/json, text/event-stream",
            )
            .json(body);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| self.protocol_error(format!("POST failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.protocol_error(format!("HTTP {status}: {}", body_preview(&body))));
        }

        if let Some(session_id) = resp
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(session_id) {
                tracing::debug!(server = %self.server, session_id, "streamable HTTP session assigned");
                self.session_id = Some(session_id.to_string());
            }
        }

        Ok(resp)
    }

    /// Read an event-stream body until the response for `id` arrives.
    async fn read_event_stream(
        &self,
        resp: reqwest::Response,
        id: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut stream = Box::pin(resp.bytes_stream());
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| self.protocol_error(format!("event stream read error: {e}")))?;
            for event in decoder.push(&chunk) {
                if let Some(found) = match_response(&event.data, id) {
                    return Ok(found);
                }
            }
        }
        if let Some(found) = decoder.finish().and_then(|event| match_response(&event.data, id)) {
            return Ok(found);
        }

        Err(self.protocol_error(format!("event stream ended without a response to request {id}")))
    }
}

/// Find the response to `id` in a JSON payload (single message or batch).
fn match_response(data: &str, id: u64) -> Option<JsonRpcResponse> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    let candidates = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    candidates
        .into_iter()
        .filter_map(|c| serde_json::from_value::<JsonRpcResponse>(c).ok())
        .find(|resp| resp.answers(id) || resp.is_unattributed_error())
}

#[async_trait]
impl RpcChannel for HttpChannel {
    fn server(&self) -> &str {
        &self.server
    }

    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let resp = self.post(&JsonRpcRequest::new(id, method, params)).await?;

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if is_event_stream(&content_type) {
            return self.read_event_stream(resp, id).await;
        }

        let body = resp
            .text()
            .await
            .map_err(|e| self.protocol_error(format!("failed to read response body: {e}")))?;
        match_response(&body, id).ok_or_else(|| {
            self.protocol_error(format!(
                "no response to {method} in body: {}",
                body_preview(&body)
            ))
        })
    }

    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    /// End the server-side session; servers without sessions need nothing.
    async fn shutdown(&mut self) -> Result<(), McpError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };

        let resp = self
            .http
            .delete(self.url.clone())
            .header(SESSION_ID_HEADER, &session_id)
            .send()
            .await
            .map_err(|e| self.protocol_error(format!("DELETE failed: {e}")))?;

        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(self.protocol_error(format!("session termination returned HTTP {status}")))
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
