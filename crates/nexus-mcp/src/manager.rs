//! Connection manager: the session state machine.
//!
//! A [`ConnectionManager`] owns at most one session at a time. It picks the
//! transport binding, waits for the call endpoint, runs the handshake and then
//! routes tool calls through the session's [`JsonRpcClient`].
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──(direct)──────────────▶ Initializing
//!                                 │                                     ▲
//!                                 └─(stream open)─▶ AwaitingEndpoint ───┘
//!                                                   (endpoint event or manual)
//! Initializing ──initialize ok──▶ Ready ──disconnect()/stream error──▶ Closing ─▶ Disconnected
//! ```
//!
//! The attempt itself runs on a spawned task and publishes its outcome on a
//! watch channel, so every `connect()` caller sees the same result and a
//! dropped caller never strands the state machine.
//!
//! # Example
//!
//! ```rust,ignore
//! use nexus_mcp::{ConnectionConfig, ConnectionManager, TransportKind};
//!
//! let manager = ConnectionManager::new(
//!     ConnectionConfig::new("http://localhost:8000/mcp").with_transport(TransportKind::Direct),
//! );
//! let summary = manager.connect().await?;
//! println!("{} tools", summary.catalog.tools.len());
//!
//! let result = manager.call_tool("echo", serde_json::json!({"x": 1})).await?;
//! manager.disconnect();
//! ```

use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use url::Url;

use crate::client::{JsonRpcClient, PendingCall};
use crate::codec;
use crate::diagnostics::{DiagnosticEvent, DiagnosticLog};
use crate::error::{McpError, Result};
use crate::handshake::{Catalog, SessionHandshake};
use crate::protocol::{
    CallToolParams, InitializeResult, ServerCapabilities, ServerInfo, result_is_error,
};
use crate::transport::{ConnectionConfig, FailureHint, StreamEvent, TransportBinding, TransportKind};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingEndpoint,
    Initializing,
    Ready,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingEndpoint => "awaiting endpoint",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// What an established session looks like.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub endpoint: Url,
    pub transport: TransportKind,
    pub protocol_version: Option<String>,
    pub server_info: Option<ServerInfo>,
    pub capabilities: ServerCapabilities,
    pub catalog: Catalog,
}

type AttemptOutcome = Option<Result<SessionSummary>>;

#[derive(Default)]
struct Session {
    state: SessionState,
    generation: u64,
    transport: Option<Arc<TransportBinding>>,
    rpc: Option<Arc<JsonRpcClient>>,
    endpoint: Option<Url>,
    init: Option<InitializeResult>,
    catalog: Catalog,
    endpoint_waiter: Option<oneshot::Sender<Result<Url>>>,
    attempt: Option<watch::Receiver<AttemptOutcome>>,
}

impl Session {
    /// Record the call endpoint and hand it to the waiting attempt.
    fn resolve(&mut self, endpoint: Url) {
        self.endpoint = Some(endpoint.clone());
        self.state = SessionState::Initializing;
        if let Some(waiter) = self.endpoint_waiter.take() {
            let _ = waiter.send(Ok(endpoint));
        }
    }

    fn attempt_settled(&self) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|rx| rx.borrow().is_some())
    }
}

struct Inner {
    config: ConnectionConfig,
    session: Mutex<Session>,
    diagnostics: DiagnosticLog,
}

/// Owns one MCP session and its diagnostic log.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager for the given target. Nothing is opened yet.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                session: Mutex::new(Session::default()),
                diagnostics: DiagnosticLog::new(),
            }),
        }
    }

    /// Establish the session, or join the attempt already in flight.
    ///
    /// While `Ready` this returns the current summary without touching the
    /// network.
    pub async fn connect(&self) -> Result<SessionSummary> {
        let mut attempt = {
            let mut session = self.inner.session.lock();
            match session.state {
                SessionState::Disconnected => start_attempt(&self.inner, &mut session),
                SessionState::Ready if session.attempt_settled() => {
                    if let Some(summary) = self.inner.summary(&session) {
                        return Ok(summary);
                    }
                }
                _ => {}
            }
            match session.attempt.clone() {
                Some(rx) => rx,
                None => return Err(McpError::NotConnected),
            }
        };

        let outcome = attempt
            .wait_for(Option::is_some)
            .await
            .map_err(|_| McpError::SessionClosed)?
            .clone();
        outcome.unwrap_or(Err(McpError::SessionClosed))
    }

    /// Close the session from any state. Outstanding calls fail with
    /// [`McpError::SessionClosed`]; the diagnostic log is kept.
    pub fn disconnect(&self) {
        let mut session = self.inner.session.lock();
        if session.state == SessionState::Disconnected {
            return;
        }
        self.inner.close_locked(&mut session, "disconnect requested");
    }

    /// Call a tool. Only valid while `Ready`.
    ///
    /// The result payload is returned verbatim, including tool-level errors
    /// flagged with `isError`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let (rpc, endpoint) = self.ready_session()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = rpc
            .call(&endpoint, "tools/call", Some(serde_json::to_value(&params)?))
            .await?;

        if result_is_error(&result) {
            tracing::warn!(tool = %name, "tool call returned error");
            self.inner
                .diagnostics
                .error(format!("tool {} reported an error", name));
        } else {
            tracing::debug!(tool = %name, "tool call succeeded");
        }

        Ok(result)
    }

    /// Re-run capability discovery on the live session.
    pub async fn refresh_catalog(&self) -> Result<Catalog> {
        let (rpc, endpoint) = self.ready_session()?;
        let generation = self.inner.session.lock().generation;

        let handshake = SessionHandshake::new(rpc, endpoint, self.inner.diagnostics.clone());
        let catalog = handshake.discover().await;

        let mut session = self.inner.session.lock();
        if session.generation != generation {
            return Err(McpError::SessionClosed);
        }
        session.catalog = catalog.clone();
        Ok(catalog)
    }

    fn ready_session(&self) -> Result<(Arc<JsonRpcClient>, Url)> {
        let session = self.inner.session.lock();
        if session.state != SessionState::Ready {
            return Err(McpError::NotConnected);
        }
        match (&session.rpc, &session.endpoint) {
            (Some(rpc), Some(endpoint)) => Ok((rpc.clone(), endpoint.clone())),
            _ => Err(McpError::NotConnected),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.session.lock().state
    }

    /// The connection config this manager was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Resolved call endpoint.
    pub fn endpoint(&self) -> Option<Url> {
        self.inner.session.lock().endpoint.clone()
    }

    /// Capabilities the server declared.
    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        let session = self.inner.session.lock();
        session.init.as_ref().map(|init| init.capabilities.clone())
    }

    /// Server name and version, if the server sent them.
    pub fn server_info(&self) -> Option<ServerInfo> {
        let session = self.inner.session.lock();
        session.init.as_ref().and_then(|init| init.server_info.clone())
    }

    /// What discovery found.
    pub fn catalog(&self) -> Catalog {
        self.inner.session.lock().catalog.clone()
    }

    /// Summary of the live session, if one is ready.
    pub fn summary(&self) -> Option<SessionSummary> {
        let session = self.inner.session.lock();
        if session.state != SessionState::Ready {
            return None;
        }
        self.inner.summary(&session)
    }

    /// Diagnostic log handle.
    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.inner.diagnostics
    }

    /// Snapshot of the diagnostic log, newest first.
    pub fn diagnostic_events(&self) -> Vec<DiagnosticEvent> {
        self.inner.diagnostics.snapshot()
    }

    /// Clear the diagnostic log.
    pub fn clear_diagnostics(&self) {
        self.inner.diagnostics.clear();
    }

    /// Subscribe to new diagnostic events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.inner.diagnostics.subscribe()
    }

    /// Outstanding calls of the current session.
    pub fn pending_calls(&self) -> Vec<PendingCall> {
        let session = self.inner.session.lock();
        session
            .rpc
            .as_ref()
            .map(|rpc| rpc.pending().snapshot())
            .unwrap_or_default()
    }

    /// Whether the session's channel is open.
    pub fn is_channel_open(&self) -> bool {
        let session = self.inner.session.lock();
        session.transport.as_ref().is_some_and(|t| t.is_open())
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("ConnectionManager")
            .field("target", &self.inner.config.target)
            .field("transport", &self.inner.config.transport)
            .field("state", &session.state)
            .field("endpoint", &session.endpoint.as_ref().map(Url::as_str))
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection attempt
// ─────────────────────────────────────────────────────────────────────────────

fn start_attempt(inner: &Arc<Inner>, session: &mut Session) {
    session.generation += 1;
    let generation = session.generation;

    session.transport = None;
    session.rpc = None;
    session.endpoint = None;
    session.init = None;
    session.catalog = Catalog::default();
    session.endpoint_waiter = None;
    session.state = SessionState::Connecting;

    inner.diagnostics.clear();
    inner.diagnostics.info(format!(
        "connecting to {} via {}",
        inner.config.target, inner.config.transport
    ));

    let (tx, rx) = watch::channel(None);
    session.attempt = Some(rx);
    tokio::spawn(run_attempt(inner.clone(), generation, tx));
}

async fn run_attempt(inner: Arc<Inner>, generation: u64, tx: watch::Sender<AttemptOutcome>) {
    let connect_timeout = inner.config.connect_timeout;

    let outcome = match tokio::time::timeout(connect_timeout, establish(&inner, generation)).await
    {
        Ok(Ok(handshake)) => {
            handshake.acknowledge().await;
            let catalog = handshake.discover().await;
            inner.finish(generation, catalog)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(McpError::ConnectTimeout(connect_timeout)),
    };

    let outcome = match outcome {
        Ok(summary) => {
            tracing::info!(endpoint = %summary.endpoint, "MCP session ready");
            Ok(summary)
        }
        Err(e) => Err(inner.fail_attempt(generation, e)),
    };

    // Receivers may all be gone.
    let _ = tx.send(Some(outcome));
}

async fn establish(inner: &Arc<Inner>, generation: u64) -> Result<SessionHandshake> {
    let transport = Arc::new(TransportBinding::from_config(&inner.config)?);
    let rpc = Arc::new(JsonRpcClient::new(
        transport.clone(),
        inner.diagnostics.clone(),
        inner.config.request_timeout,
    ));

    let (endpoint_tx, endpoint_rx) = oneshot::channel();
    {
        let mut session = inner.session.lock();
        if session.generation != generation {
            return Err(McpError::SessionClosed);
        }
        session.transport = Some(transport.clone());
        session.rpc = Some(rpc.clone());

        match transport.resolve_endpoint() {
            Some(endpoint) => {
                inner
                    .diagnostics
                    .info(format!("using endpoint {}", endpoint));
                session.endpoint_waiter = Some(endpoint_tx);
                session.resolve(endpoint);
            }
            None => {
                session.endpoint_waiter = Some(endpoint_tx);
                if let Some(events) = transport.open() {
                    tokio::spawn(consume_stream(Arc::downgrade(inner), generation, events));
                }
            }
        }
    }

    let endpoint = endpoint_rx.await.map_err(|_| McpError::SessionClosed)??;
    tracing::debug!(endpoint = %endpoint, "call endpoint resolved");

    let handshake = SessionHandshake::new(rpc, endpoint, inner.diagnostics.clone());
    let init = handshake.initialize(&inner.config.client_info).await?;

    let mut session = inner.session.lock();
    if session.generation != generation {
        return Err(McpError::SessionClosed);
    }
    session.init = Some(init);
    session.state = SessionState::Ready;
    inner.diagnostics.info("session ready");
    drop(session);

    Ok(handshake)
}

async fn consume_stream(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<StreamEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.handle_stream_event(generation, event).is_break() {
            break;
        }
    }
}

impl Inner {
    fn summary(&self, session: &Session) -> Option<SessionSummary> {
        let endpoint = session.endpoint.clone()?;
        let init = session.init.clone().unwrap_or_default();
        Some(SessionSummary {
            endpoint,
            transport: self.config.transport,
            protocol_version: init.protocol_version,
            server_info: init.server_info,
            capabilities: init.capabilities,
            catalog: session.catalog.clone(),
        })
    }

    fn finish(&self, generation: u64, catalog: Catalog) -> Result<SessionSummary> {
        let mut session = self.session.lock();
        if session.generation != generation || session.state != SessionState::Ready {
            return Err(McpError::SessionClosed);
        }
        session.catalog = catalog;
        self.summary(&session).ok_or(McpError::SessionClosed)
    }

    /// Tear down a failed attempt unless a newer session replaced it.
    fn fail_attempt(&self, generation: u64, err: McpError) -> McpError {
        let mut session = self.session.lock();
        if session.generation != generation {
            // disconnect() already tore this attempt down.
            return McpError::SessionClosed;
        }
        tracing::warn!(error = %err, "connection attempt failed");
        self.diagnostics
            .error_with_hint(format!("connection failed: {}", err), err.hint());
        self.close_locked(&mut session, "connection failed");
        err
    }

    fn handle_stream_event(&self, generation: u64, event: StreamEvent) -> ControlFlow<()> {
        let mut session = self.session.lock();
        if session.generation != generation {
            tracing::debug!(generation, "ignoring event from a previous session");
            return ControlFlow::Break(());
        }

        match event {
            StreamEvent::Opened => {
                self.diagnostics.info("event stream opened");
                if session.state != SessionState::Connecting {
                    return ControlFlow::Continue(());
                }
                let manual = session
                    .transport
                    .as_ref()
                    .and_then(|t| t.manual_endpoint().cloned());
                match manual {
                    Some(endpoint) => {
                        self.diagnostics
                            .info(format!("using manual endpoint {}", endpoint));
                        session.resolve(endpoint);
                    }
                    None => {
                        session.state = SessionState::AwaitingEndpoint;
                        self.diagnostics.info("waiting for endpoint event");
                    }
                }
                ControlFlow::Continue(())
            }

            StreamEvent::Endpoint(raw) => {
                if session.state != SessionState::AwaitingEndpoint {
                    self.diagnostics.info(format!(
                        "ignoring endpoint event '{}' while {}",
                        raw, session.state
                    ));
                    return ControlFlow::Continue(());
                }
                let resolved = match session.transport.as_ref() {
                    Some(transport) => transport.resolve_discovered(&raw),
                    None => Err(McpError::SessionClosed),
                };
                match resolved {
                    Ok(endpoint) => {
                        self.diagnostics
                            .inbound(format!("endpoint event: {}", endpoint));
                        session.resolve(endpoint);
                    }
                    Err(e) => {
                        if let Some(waiter) = session.endpoint_waiter.take() {
                            let _ = waiter.send(Err(e));
                        }
                    }
                }
                ControlFlow::Continue(())
            }

            StreamEvent::Message { event, data } => {
                let rpc = session.rpc.clone();
                drop(session);
                if data.trim().is_empty() {
                    return ControlFlow::Continue(());
                }
                match codec::decode(data.as_bytes()) {
                    Ok(envelope) => {
                        if let Some(rpc) = rpc {
                            rpc.dispatch(envelope, "event stream");
                        }
                    }
                    Err(e) => self
                        .diagnostics
                        .error(format!("undecodable '{}' event: {} ({})", event, data, e)),
                }
                ControlFlow::Continue(())
            }

            StreamEvent::Closed | StreamEvent::Failed(_) if session.endpoint.is_none() => {
                let (reason, hint) = match &event {
                    StreamEvent::Failed(e) => (e.to_string(), e.hint()),
                    _ => ("event stream closed before an endpoint was announced".to_string(), None),
                };
                let hint = hint.or_else(|| {
                    session
                        .transport
                        .as_ref()
                        .map(|t| FailureHint::for_discovery_failure(t.target()))
                });
                if let Some(waiter) = session.endpoint_waiter.take() {
                    let _ = waiter.send(Err(McpError::discovery(reason, hint)));
                }
                ControlFlow::Break(())
            }

            StreamEvent::Closed => {
                self.diagnostics
                    .info("event stream closed by server; calls continue on the endpoint");
                ControlFlow::Break(())
            }

            StreamEvent::Failed(e) => {
                self.diagnostics
                    .error_with_hint(format!("event stream failed: {}", e), e.hint());
                self.close_locked(&mut session, "event stream failed");
                ControlFlow::Break(())
            }
        }
    }

    /// Ready/any state -> Closing -> Disconnected. Caller holds the lock.
    fn close_locked(&self, session: &mut Session, reason: &str) {
        session.state = SessionState::Closing;
        session.generation += 1;

        if let Some(transport) = session.transport.take() {
            transport.close();
        }
        if let Some(rpc) = session.rpc.take() {
            let failed = rpc.close();
            if failed > 0 {
                self.diagnostics
                    .info(format!("failed {} outstanding call(s)", failed));
            }
        }
        if let Some(waiter) = session.endpoint_waiter.take() {
            let _ = waiter.send(Err(McpError::SessionClosed));
        }

        session.endpoint = None;
        session.init = None;
        session.catalog = Catalog::default();
        session.attempt = None;
        session.state = SessionState::Disconnected;

        tracing::info!(target_url = %self.config.target, reason, "MCP session closed");
        self.diagnostics.info(format!("disconnected: {}", reason));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        if let Some(rpc) = session.rpc.take() {
            rpc.close();
        }
        if let Some(transport) = session.transport.take() {
            transport.close();
        }
    }
}
