//! Diagnostic event log for one session.
//!
//! Append-only until the operator clears it. Every entry is also mirrored to
//! `tracing`, and live readers can subscribe to new entries.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::transport::FailureHint;

const BROADCAST_CAPACITY: usize = 256;

/// Direction of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent to the server.
    Out,
    /// Received from the server.
    In,
    /// Lifecycle information.
    Info,
    /// Failure.
    Error,
}

impl Direction {
    fn marker(&self) -> &'static str {
        match self {
            Self::Out => ">>",
            Self::In => "<<",
            Self::Info => "--",
            Self::Error => "!!",
        }
    }
}

/// One diagnostic log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<FailureHint>,
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.direction.marker(),
            self.text
        )?;
        if let Some(hint) = self.hint {
            write!(f, "\n   hint: {}", hint.remediation())?;
        }
        Ok(())
    }
}

/// Shared handle to a session's diagnostic log.
#[derive(Clone)]
pub struct DiagnosticLog {
    events: Arc<RwLock<Vec<DiagnosticEvent>>>,
    live: broadcast::Sender<DiagnosticEvent>,
}

impl DiagnosticLog {
    /// Create an empty log.
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            live,
        }
    }

    /// Record an outbound message.
    pub fn out(&self, text: impl Into<String>) {
        self.push(Direction::Out, text.into(), None);
    }

    /// Record an inbound message.
    pub fn inbound(&self, text: impl Into<String>) {
        self.push(Direction::In, text.into(), None);
    }

    /// Record lifecycle information.
    pub fn info(&self, text: impl Into<String>) {
        self.push(Direction::Info, text.into(), None);
    }

    /// Record a failure.
    pub fn error(&self, text: impl Into<String>) {
        self.push(Direction::Error, text.into(), None);
    }

    /// Record a failure with a remediation hint.
    pub fn error_with_hint(&self, text: impl Into<String>, hint: Option<FailureHint>) {
        self.push(Direction::Error, text.into(), hint);
    }

    /// All entries, newest first.
    pub fn snapshot(&self) -> Vec<DiagnosticEvent> {
        self.events.read().iter().rev().cloned().collect()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Receive entries as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.live.subscribe()
    }

    fn push(&self, direction: Direction, text: String, hint: Option<FailureHint>) {
        match direction {
            Direction::Out | Direction::In => {
                tracing::debug!(direction = direction.marker(), "{}", text)
            }
            Direction::Info => tracing::info!("{}", text),
            Direction::Error => match hint {
                Some(hint) => tracing::warn!(hint = ?hint, "{}", text),
                None => tracing::warn!("{}", text),
            },
        }

        let event = DiagnosticEvent {
            timestamp: Utc::now(),
            direction,
            text,
            hint,
        };
        self.events.write().push(event.clone());
        // No subscribers is fine.
        let _ = self.live.send(event);
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_newest_first() {
        let log = DiagnosticLog::new();
        log.out("first");
        log.inbound("second");
        log.info("third");

        let snapshot = log.snapshot();
        let texts: Vec<_> = snapshot.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second", "first"]);
        assert_eq!(snapshot[1].direction, Direction::In);
    }

    #[test]
    fn test_clear() {
        let log = DiagnosticLog::new();
        log.error("boom");
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let log = DiagnosticLog::new();
        let reader = log.clone();
        log.info("connected");
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_display_includes_hint() {
        let log = DiagnosticLog::new();
        log.error_with_hint("HTTP 400", Some(FailureHint::SessionIdRequired));
        let rendered = log.snapshot()[0].to_string();
        assert!(rendered.contains("!! HTTP 400"));
        assert!(rendered.contains("hint:"));
    }

    #[tokio::test]
    async fn test_subscribe_receives_new_events() {
        let log = DiagnosticLog::new();
        let mut rx = log.subscribe();
        log.out("initialize (id 1)");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.direction, Direction::Out);
        assert_eq!(event.text, "initialize (id 1)");
    }
}
