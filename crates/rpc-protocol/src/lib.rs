//! JSON-RPC 2.0 framing: message types, the encoder, and the id generator.
//!
//! This crate is pure — no I/O, no sockets. It only turns typed messages
//! into bytes and bytes back into typed messages. Framing (the terminator
//! byte between messages on the wire) is a concern of `rpc-session`, not
//! of this crate.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Id
// ---------------------------------------------------------------------------

/// A JSON-RPC id. Any JSON value except null is legal on the wire; in
/// practice every implementation here uses an integer or a prefixed string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Str(String),
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Str(s)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// The frozen JSON-RPC 2.0 error codes. `-32000..=-32099` is reserved for
/// application errors and is not enumerated here.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// An `error` object as carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error() -> Self {
        RpcError::new(error_codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        RpcError::new(error_codes::INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        RpcError::new(error_codes::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        RpcError::new(error_codes::INVALID_PARAMS, "Invalid params")
    }

    pub fn internal_error() -> Self {
        RpcError::new(error_codes::INTERNAL_ERROR, "Internal error")
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded JSON-RPC 2.0 message. Which variant a payload decodes to is
/// determined structurally (presence of `id`, `method`, `result`, `error`),
/// not by a discriminant tag — JSON-RPC has no `kind` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Vec<Value>,
    },
    Notification {
        method: String,
        params: Vec<Value>,
    },
    Response {
        id: Id,
        result: Vec<Value>,
    },
    ErrorResponse {
        id: Id,
        error: RpcError,
    },
}

impl Message {
    /// The id carried by this message, if any. Notifications have none.
    pub fn id(&self) -> Option<&Id> {
        match self {
            Message::Request { id, .. } => Some(id),
            Message::Response { id, .. } => Some(id),
            Message::ErrorResponse { id, .. } => Some(id),
            Message::Notification { .. } => None,
        }
    }

    /// The method name, for requests and notifications only.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } => Some(method),
            Message::Notification { method, .. } => Some(method),
            Message::Response { .. } | Message::ErrorResponse { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Why a payload failed to decode. Both variants carry a recovered `id`
/// when one could be read from the malformed payload, so the session can
/// still produce a correlated error response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("parse error")]
    Parse { id: Option<Id> },
    #[error("invalid request")]
    InvalidRequest { id: Option<Id> },
}

impl DecodeError {
    pub fn id(&self) -> Option<&Id> {
        match self {
            DecodeError::Parse { id } | DecodeError::InvalidRequest { id } => id.as_ref(),
        }
    }

    pub fn as_rpc_error(&self) -> RpcError {
        match self {
            DecodeError::Parse { .. } => RpcError::parse_error(),
            DecodeError::InvalidRequest { .. } => RpcError::invalid_request(),
        }
    }
}

fn read_id(obj: &serde_json::Map<String, Value>) -> Option<Id> {
    match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_i64().map(Id::Number),
        Some(Value::String(s)) => Some(Id::Str(s.clone())),
        Some(_) => None,
    }
}

fn read_params(obj: &serde_json::Map<String, Value>) -> Vec<Value> {
    match obj.get("params") {
        Some(Value::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    }
}

/// Decode one framed JSON-RPC 2.0 payload (no terminator byte included).
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|_| DecodeError::Parse { id: None })?;
    let obj = value.as_object().ok_or(DecodeError::InvalidRequest { id: None })?;
    let id = read_id(obj);

    if let Some(method) = obj.get("method") {
        let Some(method) = method.as_str() else {
            return Err(DecodeError::InvalidRequest { id });
        };
        let params = read_params(obj);
        return Ok(match id {
            Some(id) => Message::Request {
                id,
                method: method.to_owned(),
                params,
            },
            None => Message::Notification {
                method: method.to_owned(),
                params,
            },
        });
    }

    let Some(id) = id else {
        return Err(DecodeError::InvalidRequest { id: None });
    };

    if let Some(error) = obj.get("error") {
        let error: RpcError =
            serde_json::from_value(error.clone()).map_err(|_| DecodeError::InvalidRequest { id: Some(id.clone()) })?;
        return Ok(Message::ErrorResponse { id, error });
    }

    match obj.get("result") {
        Some(Value::Array(result)) => Ok(Message::Response {
            id,
            result: result.clone(),
        }),
        Some(other) => Ok(Message::Response {
            id,
            result: vec![other.clone()],
        }),
        None => Err(DecodeError::InvalidRequest { id: Some(id) }),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RequestWire<'a> {
    jsonrpc: &'static str,
    id: &'a Id,
    method: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    params: &'a [Value],
}

#[derive(Serialize)]
struct NotificationWire<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    params: &'a [Value],
}

#[derive(Serialize)]
struct ResponseWire<'a> {
    jsonrpc: &'static str,
    id: &'a Id,
    result: &'a [Value],
}

#[derive(Serialize)]
struct ErrorWire<'a> {
    jsonrpc: &'static str,
    id: &'a Id,
    error: &'a RpcError,
}

/// Encode a request. `to_vec` on a fixed struct never fails in practice
/// (params are already-valid JSON values), so this returns the bytes directly.
pub fn request(id: &Id, method: &str, params: &[Value]) -> Vec<u8> {
    serde_json::to_vec(&RequestWire {
        jsonrpc: JSONRPC_VERSION,
        id,
        method,
        params,
    })
    .expect("request encodes to valid JSON")
}

pub fn notification(method: &str, params: &[Value]) -> Vec<u8> {
    serde_json::to_vec(&NotificationWire {
        jsonrpc: JSONRPC_VERSION,
        method,
        params,
    })
    .expect("notification encodes to valid JSON")
}

pub fn response(id: &Id, result: &[Value]) -> Vec<u8> {
    serde_json::to_vec(&ResponseWire {
        jsonrpc: JSONRPC_VERSION,
        id,
        result,
    })
    .expect("response encodes to valid JSON")
}

pub fn error(id: &Id, error: &RpcError) -> Vec<u8> {
    serde_json::to_vec(&ErrorWire {
        jsonrpc: JSONRPC_VERSION,
        id,
        error,
    })
    .expect("error response encodes to valid JSON")
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

/// Generates a monotonically increasing sequence of ids, unique within the
/// session that owns it. An optional prefix lets a peer tag ids from
/// distinct ephemeral sessions without risking collisions in logs.
pub struct IdGenerator {
    next: AtomicI64,
    prefix: Option<String>,
}

impl IdGenerator {
    pub fn new() -> Self {
        IdGenerator {
            next: AtomicI64::new(1),
            prefix: None,
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        IdGenerator {
            next: AtomicI64::new(1),
            prefix: Some(prefix.into()),
        }
    }

    /// Produce the next id and advance the sequence.
    pub fn next_id(&self) -> Id {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        match &self.prefix {
            Some(prefix) => Id::Str(format!("{prefix}{n}")),
            None => Id::Number(n),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        IdGenerator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generator_produces_monotonic_sequence() {
        let gen = IdGenerator::new();
        assert_eq!(gen.next_id(), Id::Number(1));
        assert_eq!(gen.next_id(), Id::Number(2));
        assert_eq!(gen.next_id(), Id::Number(3));
    }

    #[test]
    fn id_generator_with_prefix_produces_strings() {
        let gen = IdGenerator::with_prefix("peer-");
        assert_eq!(gen.next_id(), Id::Str("peer-1".to_owned()));
        assert_eq!(gen.next_id(), Id::Str("peer-2".to_owned()));
    }

    #[test]
    fn request_round_trips() {
        let id = Id::Number(7);
        let params = vec![Value::from("cmd"), Value::from("h")];
        let bytes = request(&id, "publish", &params);
        let msg = decode(&bytes).unwrap();
        assert_eq!(
            msg,
            Message::Request {
                id: Id::Number(7),
                method: "publish".to_owned(),
                params,
            }
        );
    }

    #[test]
    fn notification_round_trips_without_id() {
        let params = vec![Value::from("cmd")];
        let bytes = notification("subscribe", &params);
        let msg = decode(&bytes).unwrap();
        assert_eq!(
            msg,
            Message::Notification {
                method: "subscribe".to_owned(),
                params,
            }
        );
        assert!(msg.id().is_none());
    }

    #[test]
    fn notification_omits_params_key_when_empty() {
        let bytes = notification("ping", &[]);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.as_object().unwrap().get("params").is_none());
    }

    #[test]
    fn response_round_trips() {
        let id = Id::Str("locate-1".to_owned());
        let result = vec![Value::from(7000), Value::from("h")];
        let bytes = response(&id, &result);
        let msg = decode(&bytes).unwrap();
        assert_eq!(msg, Message::Response { id, result });
    }

    #[test]
    fn error_round_trips() {
        let id = Id::Number(3);
        let err = RpcError::method_not_found();
        let bytes = error(&id, &err);
        let msg = decode(&bytes).unwrap();
        assert_eq!(
            msg,
            Message::ErrorResponse {
                id,
                error: RpcError::method_not_found(),
            }
        );
    }

    #[test]
    fn decode_rejects_invalid_json_with_no_recoverable_id() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::Parse { id: None }));
    }

    #[test]
    fn decode_rejects_empty_payload() {
        let err = decode(b"").unwrap_err();
        assert!(matches!(err, DecodeError::Parse { id: None }));
    }

    #[test]
    fn decode_recovers_id_from_malformed_response() {
        // Has an id, but neither `result` nor `error` -- invalid shape.
        let err = decode(br#"{"jsonrpc":"2.0","id":9}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidRequest { id: Some(Id::Number(9)) }
        ));
    }

    #[test]
    fn decode_treats_missing_params_as_empty() {
        let msg = decode(br#"{"jsonrpc":"2.0","method":"subscribe"}"#).unwrap();
        assert_eq!(
            msg,
            Message::Notification {
                method: "subscribe".to_owned(),
                params: vec![],
            }
        );
    }

    #[test]
    fn decode_request_whose_method_equals_a_topic_name_is_still_a_request() {
        let msg = decode(br#"{"jsonrpc":"2.0","id":1,"method":"cmd","params":["h"]}"#).unwrap();
        assert!(matches!(msg, Message::Request { .. }));
    }
}
