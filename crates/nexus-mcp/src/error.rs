//! Error types for MCP sessions.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::protocol::JsonRpcError;
use crate::transport::FailureHint;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
///
/// Cloneable so a single connection outcome can be handed to every caller
/// waiting on the same attempt.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    /// The channel failed before any JSON-RPC envelope was obtained.
    #[error("transport error: {message}")]
    Transport {
        /// What went wrong, including the response body when there was one.
        message: String,
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        /// Recognized failure signature, if any.
        hint: Option<FailureHint>,
    },

    /// The payload was not a well-formed JSON-RPC envelope.
    #[error("decode error: {0}")]
    Decode(String),

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Protocol {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<Value>,
    },

    /// The event stream ended or failed before announcing a call endpoint.
    #[error("no endpoint resolved: {reason}")]
    EndpointDiscoveryFailed {
        /// Why discovery did not complete.
        reason: String,
        /// Recognized failure signature, if any.
        hint: Option<FailureHint>,
    },

    /// The `initialize` call failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(Box<McpError>),

    /// The session was not established in time.
    #[error("session not established within {0:?}")]
    ConnectTimeout(Duration),

    /// The session was closed while the call was outstanding.
    #[error("session closed")]
    SessionClosed,

    /// A call was attempted outside the ready state.
    #[error("not connected - call connect() first")]
    NotConnected,

    /// Invalid URL, header or other caller-supplied setting.
    #[error("configuration error: {0}")]
    Config(String),
}

impl McpError {
    /// Create a transport error without status or hint.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            status: None,
            hint: None,
        }
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a protocol error from the parts of a JSON-RPC error object.
    pub fn protocol(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data,
        }
    }

    /// Create an endpoint discovery failure.
    pub fn discovery(reason: impl Into<String>, hint: Option<FailureHint>) -> Self {
        Self::EndpointDiscoveryFailed {
            reason: reason.into(),
            hint,
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the server rejected the call with a JSON-RPC error object.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Whether the channel failed before an envelope was obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether this is a "method not found" JSON-RPC error.
    pub fn is_method_not_found(&self) -> bool {
        match self {
            Self::Protocol { code, message, .. } => {
                *code == JsonRpcError::METHOD_NOT_FOUND || message.contains("Method not found")
            }
            _ => false,
        }
    }

    /// The remediation hint attached at the transport boundary, if any.
    pub fn hint(&self) -> Option<FailureHint> {
        match self {
            Self::Transport { hint, .. } | Self::EndpointDiscoveryFailed { hint, .. } => *hint,
            Self::HandshakeFailed(inner) => inner.hint(),
            _ => None,
        }
    }
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        Self::protocol(err.code, err.message, err.data)
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::transport("connection refused");
        assert!(err.to_string().contains("transport"));
        assert!(err.to_string().contains("connection refused"));

        let err = McpError::protocol(-32600, "Invalid Request", None);
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));

        let err = McpError::HandshakeFailed(Box::new(McpError::SessionClosed));
        assert_eq!(err.to_string(), "handshake failed: session closed");
    }

    #[test]
    fn test_method_not_found_detection() {
        assert!(McpError::protocol(-32601, "anything", None).is_method_not_found());
        assert!(McpError::protocol(-32000, "Method not found: tools/list", None).is_method_not_found());
        assert!(!McpError::protocol(-32602, "Invalid params", None).is_method_not_found());
        assert!(!McpError::transport("Method not found").is_method_not_found());
    }

    #[test]
    fn test_hint_passes_through_handshake_failure() {
        let inner = McpError::Transport {
            message: "HTTP 400".to_string(),
            status: Some(400),
            hint: Some(FailureHint::SessionIdRequired),
        };
        let err = McpError::HandshakeFailed(Box::new(inner));
        assert_eq!(err.hint(), Some(FailureHint::SessionIdRequired));
        assert_eq!(McpError::NotConnected.hint(), None);

        let err = McpError::discovery("stream closed", Some(FailureHint::StreamPathMismatch));
        assert_eq!(err.hint(), Some(FailureHint::StreamPathMismatch));
        assert_eq!(err.to_string(), "no endpoint resolved: stream closed");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Value>("invalid json").unwrap_err();
        let err: McpError = json_err.into();
        assert!(matches!(err, McpError::Decode(_)));
    }

    #[test]
    fn test_rpc_error_conversion() {
        let rpc = JsonRpcError {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        };
        let err: McpError = rpc.into();
        assert!(err.is_protocol());
        assert!(!err.is_transport());
    }
}
