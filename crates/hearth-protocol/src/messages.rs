//! Frame types exchanged over the socket.
//!
//! Every inbound frame carries a `type` tag. Frames are routed by shape:
//! handshake frames go to the auth exchange, `result` frames to the request
//! correlator, `event` frames to the event dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::HAError;
use crate::models::HAContext;

/// Any frame the backend may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result(ResultMessage),
    Event(EventMessage),
    Pong {
        #[serde(default)]
        id: Option<u64>,
    },
    /// Frame types this client has no use for.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether this frame belongs to the authentication exchange.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Self::AuthRequired { .. } | Self::AuthOk { .. } | Self::AuthInvalid { .. }
        )
    }
}

/// Answer to a command, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    pub id: u64,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
}

fn default_success() -> bool {
    true
}

impl ResultMessage {
    /// Settle into the value the caller waits for.
    pub fn into_result(self) -> Result<Value, HAError> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let error = self.error.unwrap_or_default();
        let code = if error.code.is_empty() { "unknown_error".to_string() } else { error.code };
        let message = if error.message.is_empty() {
            "Unknown error".to_string()
        } else {
            error.message
        };
        Err(HAError::Service { code, message })
    }
}

/// Error object inside a failed `result` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultError {
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Error codes are strings on current backends but numeric on old ones.
fn code_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Pushed event frame. The `id` echoes the subscription request but
/// routing uses `event.event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub event: HAEvent,
}

/// Body of a pushed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HAEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_fired: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HAContext>,
}

/// Build `{id, type, ...payload}`.
///
/// `id` and `type` always win over same-named payload keys. A payload that
/// is not a JSON object contributes nothing.
pub fn command_frame(id: u64, command: &str, payload: Option<Value>) -> Value {
    let mut frame = match payload {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    frame.insert("id".into(), Value::from(id));
    frame.insert("type".into(), Value::from(command));
    Value::Object(frame)
}
