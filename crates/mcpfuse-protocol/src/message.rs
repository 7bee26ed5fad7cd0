//! Unified JSON-RPC 2.0 envelope.
//!
//! Unlike a split request/response/notification model, [`Message`] carries
//! every optional field on one struct. Transports receive frames (an SSE
//! `data:` payload, an HTTP response body) whose kind is not known until the
//! fields present are inspected — this is what [`Message::kind`] is for.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// A JSON-RPC request id: either a string or a number, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// Standard JSON-RPC 2.0 error codes (and the handful MCP defines on top).
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "json-rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorObject {}

fn is_2_0(v: &str) -> bool {
    v == "2.0"
}

/// How a [`Message`] classifies once its optional fields are inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has `method` and `id`: expects a response.
    Request,
    /// Has `method`, no `id`: fire-and-forget.
    Notification,
    /// Has `id` and exactly one of `result`/`error`.
    Response,
}

/// A single JSON-RPC 2.0 envelope: request, response, or notification,
/// distinguished only by which optional fields are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub jsonrpc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn error_response(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// Classifies this envelope by field presence. Returns
    /// [`ProtocolError::Unclassifiable`] for a frame that is none of the
    /// three (e.g. `id` with neither `result` nor `error` and no `method`).
    pub fn kind(&self) -> Result<MessageKind> {
        if !is_2_0(&self.jsonrpc) {
            return Err(ProtocolError::Malformed(format!(
                "unsupported jsonrpc version: {}",
                self.jsonrpc
            )));
        }
        match (&self.method, &self.id, &self.result, &self.error) {
            (Some(_), Some(_), _, _) => Ok(MessageKind::Request),
            (Some(_), None, _, _) => Ok(MessageKind::Notification),
            (None, Some(_), Some(_), None) => Ok(MessageKind::Response),
            (None, Some(_), None, Some(_)) => Ok(MessageKind::Response),
            _ => Err(ProtocolError::Unclassifiable),
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind(), Ok(MessageKind::Response))
    }

    /// For a response, turns `result`/`error` into a `Result`.
    pub fn into_result(self) -> std::result::Result<serde_json::Value, ErrorObject> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request() {
        let m = Message::request(RequestId::Number(1), "tools/list", None);
        assert_eq!(m.kind().unwrap(), MessageKind::Request);
    }

    #[test]
    fn classifies_notification() {
        let m = Message::notification("notifications/progress", None);
        assert_eq!(m.kind().unwrap(), MessageKind::Notification);
    }

    #[test]
    fn classifies_success_response() {
        let m = Message::success(RequestId::Number(1), json!({"tools": []}));
        assert_eq!(m.kind().unwrap(), MessageKind::Response);
        assert!(m.into_result().is_ok());
    }

    #[test]
    fn classifies_error_response() {
        let m = Message::error_response(RequestId::Number(1), ErrorObject::internal("boom"));
        assert_eq!(m.kind().unwrap(), MessageKind::Response);
        assert!(m.into_result().is_err());
    }

    #[test]
    fn rejects_empty_envelope() {
        let m = Message {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        };
        assert!(matches!(m.kind(), Err(ProtocolError::Unclassifiable)));
    }

    #[test]
    fn round_trips_through_json() {
        let m = Message::request(RequestId::String("abc".into()), "tools/call", Some(json!({"name": "x"})));
        let bytes = m.to_json().unwrap();
        let back = Message::from_json(&bytes).unwrap();
        assert_eq!(back.method.as_deref(), Some("tools/call"));
        assert_eq!(back.id, Some(RequestId::String("abc".into())));
    }
}
