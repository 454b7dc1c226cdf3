//! JSON-RPC 2.0 envelope encoding and decoding.
//!
//! Stateless. Empty HTTP bodies never reach [`decode`]; the transport turns
//! them into "no content" first.

use serde_json::{Map, Value};

use crate::error::{McpError, Result};
use crate::protocol::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest, RequestId,
};

/// A decoded JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcEnvelope {
    /// Server-to-client request.
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    /// Message with a method and no id.
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// Successful response.
    Response { id: RequestId, result: Value },
    /// Error response. The id is absent when the server could not read ours.
    ErrorResponse {
        id: Option<RequestId>,
        error: JsonRpcError,
    },
}

impl RpcEnvelope {
    /// The id a response refers to, if this is a response at all.
    pub fn response_id(&self) -> Option<&RequestId> {
        match self {
            Self::Response { id, .. } => Some(id),
            Self::ErrorResponse { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// Short label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Notification { .. } => "notification",
            Self::Response { .. } => "response",
            Self::ErrorResponse { .. } => "error",
        }
    }
}

/// Encode a request envelope.
pub fn encode_request(id: &RequestId, method: &str, params: Option<Value>) -> Result<Vec<u8>> {
    let request = JsonRpcRequest::new(id.clone(), method, params);
    Ok(serde_json::to_vec(&request)?)
}

/// Encode a notification envelope. There is no `id` field.
pub fn encode_notification(method: &str, params: Option<Value>) -> Result<Vec<u8>> {
    let notification = JsonRpcNotification::new(method, params);
    Ok(serde_json::to_vec(&notification)?)
}

/// Decode bytes into an envelope.
pub fn decode(bytes: &[u8]) -> Result<RpcEnvelope> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(McpError::decode("empty body"));
    }

    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut obj) = value else {
        return Err(McpError::decode("envelope is not a JSON object"));
    };

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(McpError::decode(format!(
                "unsupported jsonrpc version {:?}",
                other
            )));
        }
        None => return Err(McpError::decode("missing jsonrpc field")),
    }

    let id = take_id(&mut obj)?;

    if let Some(method) = obj.remove("method") {
        let Value::String(method) = method else {
            return Err(McpError::decode("method is not a string"));
        };
        let params = obj.remove("params");
        return Ok(match id {
            Some(id) => RpcEnvelope::Request { id, method, params },
            None => RpcEnvelope::Notification { method, params },
        });
    }

    if let Some(error) = obj.remove("error") {
        let error: JsonRpcError = serde_json::from_value(error)
            .map_err(|e| McpError::decode(format!("malformed error object: {}", e)))?;
        return Ok(RpcEnvelope::ErrorResponse { id, error });
    }

    if let Some(result) = obj.remove("result") {
        let id = id.ok_or_else(|| McpError::decode("response without id"))?;
        return Ok(RpcEnvelope::Response { id, result });
    }

    Err(McpError::decode("neither method, result nor error present"))
}

fn take_id(obj: &mut Map<String, Value>) -> Result<Option<RequestId>> {
    match obj.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or_else(|| McpError::decode(format!("id {} is not an integer", n))),
        Some(other) => Err(McpError::decode(format!("invalid id {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_request_sets_version() {
        let bytes = encode_request(&RequestId::Number(3), "tools/list", None).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}));
    }

    #[test]
    fn test_encode_notification_omits_id() {
        let bytes = encode_notification("notifications/initialized", None).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
    }

    #[test]
    fn test_decode_response() {
        let env = decode(br#"{"jsonrpc":"2.0","id":1,"result":{"value":42}}"#).unwrap();
        assert_eq!(
            env,
            RpcEnvelope::Response {
                id: RequestId::Number(1),
                result: json!({"value": 42}),
            }
        );
        assert_eq!(env.response_id(), Some(&RequestId::Number(1)));
    }

    #[test]
    fn test_decode_null_result_is_response() {
        let env = decode(br#"{"jsonrpc":"2.0","id":"a","result":null}"#).unwrap();
        assert!(matches!(env, RpcEnvelope::Response { result: Value::Null, .. }));
    }

    #[test]
    fn test_decode_error_response() {
        let env = decode(
            br#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        match env {
            RpcEnvelope::ErrorResponse { id, error } => {
                assert_eq!(id, Some(RequestId::Number(2)));
                assert_eq!(error.code, JsonRpcError::METHOD_NOT_FOUND);
            }
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_response_with_null_id() {
        let env =
            decode(br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#)
                .unwrap();
        assert!(matches!(env, RpcEnvelope::ErrorResponse { id: None, .. }));
    }

    #[test]
    fn test_decode_notification_and_request() {
        let env = decode(br#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"p":1}}"#)
            .unwrap();
        assert_eq!(env.kind(), "notification");

        let env = decode(br#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#).unwrap();
        assert!(matches!(env, RpcEnvelope::Request { ref method, .. } if method == "ping"));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode(b""), Err(McpError::Decode(_))));
        assert!(matches!(decode(b"  \n"), Err(McpError::Decode(_))));
        assert!(matches!(decode(b"not json"), Err(McpError::Decode(_))));
        assert!(matches!(decode(b"[1,2]"), Err(McpError::Decode(_))));
        assert!(matches!(decode(br#"{"id":1,"result":{}}"#), Err(McpError::Decode(_))));
        assert!(matches!(
            decode(br#"{"jsonrpc":"1.0","id":1,"result":{}}"#),
            Err(McpError::Decode(_))
        ));
        assert!(matches!(decode(br#"{"jsonrpc":"2.0","id":1}"#), Err(McpError::Decode(_))));
        assert!(matches!(decode(br#"{"jsonrpc":"2.0","result":{}}"#), Err(McpError::Decode(_))));
        assert!(matches!(
            decode(br#"{"jsonrpc":"2.0","id":1.5,"result":{}}"#),
            Err(McpError::Decode(_))
        ));
    }

    #[test]
    fn test_request_decodes_back() {
        let params = json!({"name": "echo", "arguments": {"x": 1}});
        let bytes = encode_request(&RequestId::Number(5), "tools/call", Some(params.clone())).unwrap();
        assert_eq!(
            decode(&bytes).unwrap(),
            RpcEnvelope::Request {
                id: RequestId::Number(5),
                method: "tools/call".to_string(),
                params: Some(params),
            }
        );
    }
}
