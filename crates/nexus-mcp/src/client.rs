//! Correlated JSON-RPC calls over a transport binding.
//!
//! Each call registers a [`PendingCall`] under a fresh id and waits for the
//! response with that id. Responses may arrive in the POST body or, on the
//! streaming binding, on the event stream; either way they go through
//! [`JsonRpcClient::dispatch`], so arrival order does not matter.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use url::Url;

use crate::codec::{self, RpcEnvelope};
use crate::diagnostics::DiagnosticLog;
use crate::error::{McpError, Result};
use crate::protocol::RequestId;
use crate::transport::{Delivery, TransportBinding, TransportKind};

/// A call waiting for its response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub id: RequestId,
    pub method: String,
    pub submitted_at: DateTime<Utc>,
}

struct PendingEntry {
    call: PendingCall,
    responder: oneshot::Sender<Result<Value>>,
}

/// Outstanding calls keyed by id.
///
/// Entries are removed exactly once: by completion, by the caller giving up,
/// or by [`PendingCalls::fail_all`]. After `fail_all` no new call is accepted.
#[derive(Default)]
pub struct PendingCalls {
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
    closed: AtomicBool,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the receiver its outcome is delivered on.
    pub fn register(
        &self,
        id: RequestId,
        method: &str,
    ) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut entries = self.entries.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::SessionClosed);
        }
        if entries.contains_key(&id) {
            return Err(McpError::decode(format!("id {} is already pending", id)));
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            id.clone(),
            PendingEntry {
                call: PendingCall {
                    id,
                    method: method.to_string(),
                    submitted_at: Utc::now(),
                },
                responder: tx,
            },
        );
        Ok(rx)
    }

    /// Deliver an outcome. Returns the call it belonged to, if any was pending.
    pub fn complete(&self, id: &RequestId, outcome: Result<Value>) -> Option<PendingCall> {
        let entry = self.entries.lock().remove(id)?;
        // The caller may have stopped waiting.
        let _ = entry.responder.send(outcome);
        Some(entry.call)
    }

    /// Forget a call without delivering anything.
    pub fn remove(&self, id: &RequestId) -> Option<PendingCall> {
        self.entries.lock().remove(id).map(|entry| entry.call)
    }

    /// Fail every outstanding call and refuse new ones.
    pub fn fail_all(&self, err: McpError) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut entries = self.entries.lock();
            self.closed.store(true, Ordering::SeqCst);
            entries.drain().map(|(_, entry)| entry).collect()
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.responder.send(Err(err.clone()));
        }
        count
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Outstanding calls, oldest first.
    pub fn snapshot(&self) -> Vec<PendingCall> {
        let mut calls: Vec<PendingCall> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.call.clone())
            .collect();
        calls.sort_by_key(|call| call.submitted_at);
        calls
    }
}

/// Removes the pending entry if the caller stops waiting early.
struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// JSON-RPC client for one session.
pub struct JsonRpcClient {
    transport: Arc<TransportBinding>,
    next_id: AtomicI64,
    pending: PendingCalls,
    diagnostics: DiagnosticLog,
    request_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl JsonRpcClient {
    /// Create a client over the given binding. Ids start at 1.
    pub fn new(
        transport: Arc<TransportBinding>,
        diagnostics: DiagnosticLog,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            next_id: AtomicI64::new(1),
            pending: PendingCalls::new(),
            diagnostics,
            request_timeout,
            closed: watch::Sender::new(false),
        }
    }

    /// Get the next request ID.
    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Outstanding calls.
    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Issue a call and wait for its result.
    pub async fn call(&self, endpoint: &Url, method: &str, params: Option<Value>) -> Result<Value> {
        if self.is_closed() {
            return Err(McpError::SessionClosed);
        }
        let id = self.next_request_id();
        let body = codec::encode_request(&id, method, params)?;
        let rx = self.pending.register(id.clone(), method)?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        self.diagnostics.out(format!("{} (id {})", method, id));

        let mut closed = self.closed.subscribe();
        let outcome = tokio::select! {
            outcome = self.exchange(endpoint, &id, body, rx) => outcome,
            _ = closed.wait_for(|closed| *closed) => Err(McpError::SessionClosed),
        };
        if let Err(ref e) = outcome {
            self.record_failure(method, &id, e);
        }
        outcome
    }

    async fn exchange(
        &self,
        endpoint: &Url,
        id: &RequestId,
        body: Vec<u8>,
        rx: oneshot::Receiver<Result<Value>>,
    ) -> Result<Value> {
        match self.transport.send(endpoint, body).await? {
            Delivery::NoContent => {
                self.pending.complete(id, Ok(Value::Null));
                self.diagnostics.inbound(format!("empty body (id {})", id));
            }
            Delivery::Deferred => {
                tracing::debug!(id = %id, "reply deferred to event stream");
            }
            Delivery::Inline(bytes) => match codec::decode(&bytes)? {
                RpcEnvelope::ErrorResponse { id: None, error } => {
                    self.diagnostics
                        .inbound(format!("error {} (id {}): {}", error.code, id, error.message));
                    self.pending.complete(id, Err(error.into()));
                }
                envelope => {
                    let kind = envelope.kind();
                    let answered = envelope.response_id().cloned();
                    self.dispatch(envelope, "response body");

                    // A direct binding has no stream for the real reply to arrive on.
                    if self.transport.kind() == TransportKind::Direct
                        && answered.as_ref() != Some(id)
                    {
                        return Err(McpError::decode(match answered {
                            Some(other) => format!(
                                "response body answered id {} instead of id {}",
                                other, id
                            ),
                            None => format!(
                                "response body held a {} instead of the reply to id {}",
                                kind, id
                            ),
                        }));
                    }
                }
            },
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::SessionClosed),
            Err(_) => Err(McpError::transport(format!(
                "no response for id {} within {:?}",
                id, self.request_timeout
            ))),
        }
    }

    /// Send a notification. Nothing is tracked and no reply is awaited.
    pub async fn notify(&self, endpoint: &Url, method: &str, params: Option<Value>) -> Result<()> {
        let body = codec::encode_notification(method, params)?;
        self.diagnostics.out(format!("{} (notification)", method));

        if let Err(e) = self.transport.send(endpoint, body).await {
            self.diagnostics
                .error_with_hint(format!("{} failed: {}", method, e), e.hint());
            return Err(e);
        }
        Ok(())
    }

    /// Route a decoded envelope. Returns whether it completed a pending call.
    ///
    /// Responses for ids that are not pending are logged and dropped.
    pub fn dispatch(&self, envelope: RpcEnvelope, origin: &str) -> bool {
        let kind = envelope.kind();
        match envelope {
            RpcEnvelope::Response { id, result } => {
                match self.pending.complete(&id, Ok(result)) {
                    Some(call) => {
                        self.diagnostics
                            .inbound(format!("{} result (id {})", call.method, id));
                        true
                    }
                    None => {
                        self.drop_unmatched(kind, &id, origin);
                        false
                    }
                }
            }
            RpcEnvelope::ErrorResponse {
                id: Some(id),
                error,
            } => {
                let line = format!("error {} (id {}): {}", error.code, id, error.message);
                match self.pending.complete(&id, Err(error.into())) {
                    Some(call) => {
                        self.diagnostics.inbound(format!("{} {}", call.method, line));
                        true
                    }
                    None => {
                        self.drop_unmatched(kind, &id, origin);
                        false
                    }
                }
            }
            RpcEnvelope::ErrorResponse { id: None, error } => {
                self.diagnostics.error(format!(
                    "error without id from {}: {} {}",
                    origin, error.code, error.message
                ));
                false
            }
            RpcEnvelope::Notification { method, params } => {
                let detail = params.map(|p| format!(" {}", p)).unwrap_or_default();
                self.diagnostics
                    .inbound(format!("notification {}{}", method, detail));
                false
            }
            RpcEnvelope::Request { id, method, .. } => {
                self.diagnostics.inbound(format!(
                    "server request {} (id {}) not handled",
                    method, id
                ));
                false
            }
        }
    }

    /// Fail every outstanding call with `SessionClosed` and refuse new ones.
    pub fn close(&self) -> usize {
        self.closed.send_replace(true);
        self.pending.fail_all(McpError::SessionClosed)
    }

    /// Whether [`JsonRpcClient::close`] was called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn drop_unmatched(&self, kind: &str, id: &RequestId, origin: &str) {
        tracing::warn!(id = %id, origin, kind, "dropping response for unknown id");
        self.diagnostics
            .error(format!("unmatched {} id {} from {}, dropped", kind, id, origin));
    }

    fn record_failure(&self, method: &str, id: &RequestId, err: &McpError) {
        self.diagnostics
            .error_with_hint(format!("{} (id {}) failed: {}", method, id, err), err.hint());
    }
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("transport", &self.transport)
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .field("pending", &self.pending.len())
            .finish()
    }
}
