//! Wire envelope and payloads of the `graphql-ws` subprotocol.
//!
//! Every frame is a single JSON object `{ id?, type, payload? }`. The payload
//! stays untyped in [`OperationMessage`] and is decoded per message type by
//! the connection actor.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Subprotocol name a client must request during the upgrade handshake.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Maximum size of an inbound frame, in bytes.
pub const DEFAULT_READ_LIMIT: usize = 4096;

/// Deadline applied to every outbound socket write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Message types of the protocol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    ConnectionInit,
    ConnectionAck,
    ConnectionError,
    ConnectionTerminate,
    KeepAlive,
    Start,
    Stop,
    Data,
    Error,
    Complete,
    /// Any type string outside the vocabulary, kept verbatim for logging.
    Unknown(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::ConnectionAck => "connection_ack",
            Self::ConnectionError => "connection_error",
            Self::ConnectionTerminate => "connection_terminate",
            Self::KeepAlive => "ka",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Data => "data",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "connection_init" => Self::ConnectionInit,
            "connection_ack" => Self::ConnectionAck,
            "connection_error" => Self::ConnectionError,
            "connection_terminate" => Self::ConnectionTerminate,
            "ka" => Self::KeepAlive,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "data" => Self::Data,
            "error" => Self::Error,
            "complete" => Self::Complete,
            _ => Self::Unknown(s),
        }
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Unknown(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Failure to turn an inbound frame into an [`OperationMessage`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame of {size} bytes exceeds read limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl OperationMessage {
    pub fn new(kind: MessageType) -> Self {
        Self {
            id: None,
            kind,
            payload: None,
        }
    }

    /// Decode a raw frame, enforcing the read limit before parsing.
    pub fn decode(frame: &[u8], limit: usize) -> Result<Self, ProtocolError> {
        if frame.len() > limit {
            return Err(ProtocolError::FrameTooLarge {
                size: frame.len(),
                limit,
            });
        }
        Ok(serde_json::from_slice(frame)?)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn connection_ack() -> Self {
        Self::new(MessageType::ConnectionAck)
    }

    pub fn connection_error(message: impl Into<String>) -> Self {
        Self {
            payload: Some(serde_json::Value::String(message.into())),
            ..Self::new(MessageType::ConnectionError)
        }
    }

    pub fn keep_alive() -> Self {
        Self::new(MessageType::KeepAlive)
    }

    /// Result data for one operation.
    pub fn data(operation_id: impl Into<String>, payload: &DataPayload) -> Self {
        Self {
            id: Some(operation_id.into()),
            payload: serde_json::to_value(payload).ok(),
            ..Self::new(MessageType::Data)
        }
    }

    /// Errors scoped to one operation.
    pub fn operation_errors(operation_id: impl Into<String>, errors: &[ErrorDescription]) -> Self {
        Self {
            id: Some(operation_id.into()),
            payload: serde_json::to_value(errors).ok(),
            ..Self::new(MessageType::Error)
        }
    }

    /// Error not tied to any operation; the payload is a plain string.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            payload: Some(serde_json::Value::String(message.into())),
            ..Self::new(MessageType::Error)
        }
    }

    /// Decode the payload into a type-specific shape. A missing payload
    /// decodes as JSON `null`.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone().unwrap_or(serde_json::Value::Null))
    }
}

impl fmt::Display for OperationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<invalid>"),
        }
    }
}

/// Payload of `connection_init`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InitPayload {
    #[serde(rename = "authToken", default)]
    pub auth_token: String,
}

/// Payload of `start`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    pub query: String,
    #[serde(default)]
    pub variables: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(rename = "operationName", default)]
    pub operation_name: Option<String>,
}

/// Payload of `data`. Both members serialize as `null` when absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPayload {
    pub data: serde_json::Value,
    pub errors: Option<Vec<ErrorDescription>>,
}

impl DataPayload {
    pub fn from_data(data: serde_json::Value) -> Self {
        Self { data, errors: None }
    }
}

/// Source position attached to an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// Client-facing error description, as carried in `error` and `data` frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
}

impl ErrorDescription {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
        }
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.locations.push(Location { line, column });
        self
    }
}

impl fmt::Display for ErrorDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
