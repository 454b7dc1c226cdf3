//! Transport bindings for MCP over HTTP.
//!
//! Two bindings are supported:
//!
//! - **Streaming discovery** (HTTP+SSE): a long-lived `GET` event stream
//!   announces the call endpoint in an `endpoint` event. Calls are separate
//!   unary POSTs; the stream stays open for server-initiated messages.
//! - **Direct call**: the target URL is the endpoint. No stream.
//!
//! Both share one [`HttpChannel`] that applies headers, the bearer token and
//! the optional cookie store to every request.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::codec::{self, RpcEnvelope};
use crate::error::{McpError, Result};
use crate::protocol::ClientInfo;

/// Default time allowed for a session to reach the ready state.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for a single call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the SSE event carrying the call endpoint.
pub const ENDPOINT_EVENT: &str = "endpoint";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which transport binding to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP+SSE with endpoint discovery.
    #[default]
    #[serde(rename = "sse")]
    Streaming,
    /// Plain HTTP POST to the target URL.
    #[serde(rename = "http")]
    Direct,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming => write!(f, "sse"),
            Self::Direct => write!(f, "http"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sse" | "stream" | "streaming" => Ok(Self::Streaming),
            "http" | "direct" => Ok(Self::Direct),
            other => Err(McpError::config(format!(
                "unknown transport '{}' (expected 'sse' or 'http')",
                other
            ))),
        }
    }
}

/// Everything needed to open one session against one server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Target URL as typed by the operator; normalized on use.
    pub target: String,
    /// Transport binding.
    pub transport: TransportKind,
    /// Call endpoint that bypasses discovery (streaming binding only).
    pub manual_endpoint: Option<String>,
    /// Bearer token sent as `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
    /// Extra request headers. Later entries win; these override the token.
    pub headers: Vec<(String, String)>,
    /// Keep a per-session cookie store and attach it to every call.
    pub include_credentials: bool,
    /// Time allowed to reach the ready state.
    pub connect_timeout: Duration,
    /// Time allowed for a single call.
    pub request_timeout: Duration,
    /// Client identity announced in `initialize`.
    pub client_info: ClientInfo,
}

impl ConnectionConfig {
    /// Create a config for the given target with default settings.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            transport: TransportKind::default(),
            manual_endpoint: None,
            auth_token: None,
            headers: Vec::new(),
            include_credentials: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_info: ClientInfo::default(),
        }
    }

    /// Set the transport binding.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Set a manual call endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.manual_endpoint = Some(endpoint.into());
        self
    }

    /// Set the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Enable or disable the per-session cookie store.
    pub fn with_credentials(mut self, include: bool) -> Self {
        self.include_credentials = include;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the client identity.
    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }

    /// Build the header map applied to every request.
    ///
    /// The bearer token goes in first so explicit headers can replace it.
    /// Keys are trimmed and empty keys skipped.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();

        if let Some(token) = self.auth_token.as_deref().map(str::trim)
            && !token.is_empty()
        {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| McpError::config(format!("invalid auth token: {}", e)))?;
            map.insert(AUTHORIZATION, value);
        }

        for (key, value) in &self.headers {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| McpError::config(format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| McpError::config(format!("invalid value for header '{}': {}", key, e)))?;
            map.insert(name, value);
        }

        Ok(map)
    }
}

/// Parse an operator-typed URL, adding `http://` when no scheme was given.
pub fn normalize_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(McpError::config("URL is empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&candidate)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(McpError::config(format!("unsupported URL scheme '{}'", other))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure hints
// ─────────────────────────────────────────────────────────────────────────────

/// Recognized failure signatures with an operator-facing remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHint {
    /// Connection refused, DNS or TLS failure.
    RequestNotSent,
    /// Same, while ambient credentials were attached.
    RequestNotSentWithCredentials,
    /// HTTP 400 complaining about a session id.
    SessionIdRequired,
    /// The stream closed before discovery and its path is not `/sse`.
    StreamPathMismatch,
    /// The stream closed before discovery; the target may not stream at all.
    NotAnEventStream,
}

impl FailureHint {
    /// Human-readable remediation.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::RequestNotSent => {
                "The request never reached the server. Check that it is running, the URL is \
                 correct, and that it accepts cross-origin requests."
            }
            Self::RequestNotSentWithCredentials => {
                "The request never reached the server. Credentialed requests are often rejected \
                 by cross-origin policy; try again without credentials."
            }
            Self::SessionIdRequired => {
                "The server expects a session id. It probably speaks the streaming binding; \
                 switch the transport to SSE, or connect through its event stream first."
            }
            Self::StreamPathMismatch => {
                "The event stream closed before announcing an endpoint. Many MCP servers host \
                 their stream at /sse."
            }
            Self::NotAnEventStream => {
                "The event stream closed before announcing an endpoint. If the server takes \
                 plain JSON-RPC POSTs, switch the transport to HTTP."
            }
        }
    }

    /// Classify a non-2xx HTTP answer.
    pub fn classify_status(status: u16, body: &str) -> Option<Self> {
        let body = body.to_ascii_lowercase();
        let mentions_session =
            body.contains("session id") || body.contains("session_id") || body.contains("sessionid");
        (status == 400 && mentions_session).then_some(Self::SessionIdRequired)
    }

    /// Hint for a request that never left the client.
    pub fn request_not_sent(include_credentials: bool) -> Self {
        if include_credentials {
            Self::RequestNotSentWithCredentials
        } else {
            Self::RequestNotSent
        }
    }

    /// Hint for a stream that ended before announcing an endpoint.
    pub fn for_discovery_failure(stream_url: &Url) -> Self {
        if stream_url.path().trim_end_matches('/').ends_with("/sse") {
            Self::NotAnEventStream
        } else {
            Self::StreamPathMismatch
        }
    }
}

impl fmt::Display for FailureHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remediation())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP channel
// ─────────────────────────────────────────────────────────────────────────────

/// What a unary POST produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The reply envelope came back in the response body.
    Inline(Vec<u8>),
    /// 2xx with an empty body.
    NoContent,
    /// 202 on the streaming binding: the reply will arrive on the stream.
    Deferred,
}

/// Shared HTTP client for one session.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    http: reqwest::Client,
    request_timeout: Duration,
    include_credentials: bool,
}

impl HttpChannel {
    /// Build a channel from the connection config.
    ///
    /// No global client timeout is set; it would cut the event stream.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .default_headers(config.header_map()?)
            .cookie_store(config.include_credentials)
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            request_timeout: config.request_timeout,
            include_credentials: config.include_credentials,
        })
    }

    /// POST one encoded envelope.
    pub async fn post(&self, endpoint: &Url, body: Vec<u8>) -> Result<(StatusCode, Delivery)> {
        let response = self
            .http
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.request_error(e))?;

        if !status.is_success() {
            // A JSON-RPC error object is still a protocol answer.
            if let Ok(RpcEnvelope::ErrorResponse { .. }) = codec::decode(&bytes) {
                return Ok((status, Delivery::Inline(bytes.to_vec())));
            }
            let text = String::from_utf8_lossy(&bytes);
            return Err(McpError::Transport {
                message: format!("HTTP {}: {}", status.as_u16(), text.trim()),
                status: Some(status.as_u16()),
                hint: FailureHint::classify_status(status.as_u16(), &text),
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok((status, Delivery::NoContent));
        }
        Ok((status, Delivery::Inline(bytes.to_vec())))
    }

    /// Open the event stream.
    pub async fn open_stream(&self, url: &Url) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::Transport {
                message: format!("HTTP {}: {}", status.as_u16(), text.trim()),
                status: Some(status.as_u16()),
                hint: FailureHint::classify_status(status.as_u16(), &text),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(McpError::Transport {
                message: format!("expected text/event-stream, got '{}'", content_type),
                status: Some(status.as_u16()),
                hint: Some(FailureHint::NotAnEventStream),
            });
        }

        Ok(response)
    }

    fn request_error(&self, err: reqwest::Error) -> McpError {
        let hint = (err.is_connect() || (err.is_request() && !err.is_timeout()))
            .then(|| FailureHint::request_not_sent(self.include_credentials));
        let message = if err.is_timeout() {
            format!("request timed out after {:?}", self.request_timeout)
        } else {
            err.to_string()
        };
        McpError::Transport {
            message,
            status: err.status().map(|s| s.as_u16()),
            hint,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bindings
// ─────────────────────────────────────────────────────────────────────────────

/// Something the stream reader observed.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The stream answered with an event-stream response.
    Opened,
    /// An `endpoint` event with its raw payload.
    Endpoint(String),
    /// Any other event, typically a JSON-RPC envelope.
    Message { event: String, data: String },
    /// The server ended the stream.
    Closed,
    /// The stream could not be opened or broke.
    Failed(McpError),
}

/// The raw channel to one server.
pub enum TransportBinding {
    /// The target URL is the call endpoint.
    DirectCall {
        /// HTTP channel.
        channel: HttpChannel,
        /// Call endpoint.
        endpoint: Url,
        /// Cleared on close.
        open: AtomicBool,
    },
    /// Event stream announcing the call endpoint.
    StreamingDiscovery {
        /// HTTP channel.
        channel: HttpChannel,
        /// Stream URL; relative endpoints resolve against it.
        stream_url: Url,
        /// Endpoint that bypasses discovery.
        manual_endpoint: Option<Url>,
        /// Stream reader task.
        reader: Mutex<Option<JoinHandle<()>>>,
    },
}

impl TransportBinding {
    /// Validate the config and build the binding. No network activity.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let target = normalize_url(&config.target)?;
        let channel = HttpChannel::new(config)?;

        let binding = match config.transport {
            TransportKind::Direct => Self::DirectCall {
                channel,
                endpoint: target,
                open: AtomicBool::new(true),
            },
            TransportKind::Streaming => {
                let manual_endpoint = config
                    .manual_endpoint
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .map(normalize_url)
                    .transpose()?;
                Self::StreamingDiscovery {
                    channel,
                    stream_url: target,
                    manual_endpoint,
                    reader: Mutex::new(None),
                }
            }
        };

        tracing::info!(
            transport = %binding.kind(),
            url = %binding.target(),
            "created transport binding"
        );
        Ok(binding)
    }

    /// Transport kind.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::DirectCall { .. } => TransportKind::Direct,
            Self::StreamingDiscovery { .. } => TransportKind::Streaming,
        }
    }

    /// The URL the binding was created for.
    pub fn target(&self) -> &Url {
        match self {
            Self::DirectCall { endpoint, .. } => endpoint,
            Self::StreamingDiscovery { stream_url, .. } => stream_url,
        }
    }

    /// Endpoint known without waiting for the stream.
    pub fn resolve_endpoint(&self) -> Option<Url> {
        match self {
            Self::DirectCall { endpoint, .. } => Some(endpoint.clone()),
            Self::StreamingDiscovery { .. } => None,
        }
    }

    /// Manually configured endpoint, used as soon as the stream opens.
    pub fn manual_endpoint(&self) -> Option<&Url> {
        match self {
            Self::StreamingDiscovery {
                manual_endpoint, ..
            } => manual_endpoint.as_ref(),
            Self::DirectCall { .. } => None,
        }
    }

    /// Resolve a discovery payload against the stream URL.
    pub fn resolve_discovered(&self, raw: &str) -> Result<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(McpError::discovery("endpoint event was empty", None));
        }
        self.target()
            .join(raw)
            .map_err(|e| McpError::discovery(format!("invalid endpoint '{}': {}", raw, e), None))
    }

    /// Send one encoded envelope to the endpoint.
    pub async fn send(&self, endpoint: &Url, body: Vec<u8>) -> Result<Delivery> {
        match self {
            Self::DirectCall { channel, .. } => {
                let (_, delivery) = channel.post(endpoint, body).await?;
                Ok(delivery)
            }
            Self::StreamingDiscovery { channel, .. } => {
                let (status, delivery) = channel.post(endpoint, body).await?;
                match delivery {
                    Delivery::Inline(ref bytes)
                        if status == StatusCode::ACCEPTED && codec::decode(bytes).is_err() =>
                    {
                        Ok(Delivery::Deferred)
                    }
                    Delivery::NoContent if status == StatusCode::ACCEPTED => Ok(Delivery::Deferred),
                    other => Ok(other),
                }
            }
        }
    }

    /// Start the stream reader, if this binding has a stream.
    pub fn open(&self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        match self {
            Self::DirectCall { .. } => None,
            Self::StreamingDiscovery {
                channel,
                stream_url,
                reader,
                ..
            } => {
                let (tx, rx) = mpsc::unbounded_channel();
                let handle = tokio::spawn(run_stream(channel.clone(), stream_url.clone(), tx));
                if let Some(previous) = reader.lock().replace(handle) {
                    previous.abort();
                }
                Some(rx)
            }
        }
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        match self {
            Self::DirectCall { open, .. } => open.store(false, Ordering::SeqCst),
            Self::StreamingDiscovery { reader, .. } => {
                if let Some(handle) = reader.lock().take() {
                    handle.abort();
                }
            }
        }
    }

    /// Whether the channel is still open.
    pub fn is_open(&self) -> bool {
        match self {
            Self::DirectCall { open, .. } => open.load(Ordering::SeqCst),
            Self::StreamingDiscovery { reader, .. } => reader
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
        }
    }
}

impl fmt::Debug for TransportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBinding")
            .field("kind", &self.kind())
            .field("target", &self.target().as_str())
            .field("manual_endpoint", &self.manual_endpoint().map(Url::as_str))
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for TransportBinding {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_stream(channel: HttpChannel, url: Url, tx: mpsc::UnboundedSender<StreamEvent>) {
    let response = match channel.open_stream(&url).await {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(StreamEvent::Failed(e));
            return;
        }
    };

    if tx.send(StreamEvent::Opened).is_err() {
        return;
    }

    let mut events = response.bytes_stream().eventsource();
    while let Some(item) = events.next().await {
        let event = match item {
            Ok(event) if event.event == ENDPOINT_EVENT => StreamEvent::Endpoint(event.data),
            Ok(event) => StreamEvent::Message {
                event: event.event,
                data: event.data,
            },
            Err(e) => {
                let _ = tx.send(StreamEvent::Failed(McpError::transport(format!(
                    "event stream error: {}",
                    e
                ))));
                return;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }

    let _ = tx.send(StreamEvent::Closed);
}
