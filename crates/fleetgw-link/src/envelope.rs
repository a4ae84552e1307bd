//! Control-plane envelope encoding and decoding.
//!
//! Every payload travels inside an outer session envelope:
//! `{"command": "message", "identifier": "...", "data": "<payload JSON>"}`,
//! where `identifier` names the subscribed channel. The subscribe handshake
//! is the same shape with `command: "subscribe"` and the session token.
//!
//! Inbound traffic is the mirror image: session-internal keepalives at the
//! top level, application messages under a `message` key.

use fleetgw_core::{Command, LogEvent, Measurement};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::LinkError;

/// Session-internal message types consumed silently.
const KEEPALIVE_TYPES: [&str; 3] = ["ping", "welcome", "confirm_subscription"];

/// Channel identifier as the session protocol encodes it: a JSON string
/// containing JSON.
fn channel_identifier(channel: &str) -> String {
    json!({ "channel": channel }).to_string()
}

/// The subscribe handshake frame, sent once per connection before anything
/// else.
pub fn subscribe_frame(channel: &str, token: &str) -> String {
    json!({
        "command": "subscribe",
        "identifier": channel_identifier(channel),
        "token": token,
    })
    .to_string()
}

/// Wrap an application payload in the outer session envelope.
pub fn wrap_message(channel: &str, payload: &Value) -> String {
    json!({
        "command": "message",
        "identifier": channel_identifier(channel),
        "data": payload.to_string(),
    })
    .to_string()
}

/// A decoded inbound control-plane message.
#[derive(Debug)]
pub enum InboundMessage {
    /// Session-internal keepalive/handshake traffic; consumed silently
    Keepalive,
    /// A command to dispatch to the vehicle
    Command(Command),
    /// A script execution request; explicitly unsupported
    Script,
    /// An error report from the control plane
    Error(String),
    /// Anything else; logged and ignored, never a crash
    Unknown {
        /// The unrecognized `type` tag
        message_type: String,
    },
}

/// Decode one line of inbound traffic.
///
/// Malformed JSON and envelopes with no usable content are protocol errors;
/// the caller logs and drops them without touching the connection.
pub fn parse_inbound(raw: &str) -> Result<InboundMessage, LinkError> {
    let outer: Value =
        serde_json::from_str(raw).map_err(|e| LinkError::Protocol(format!("bad JSON: {e}")))?;

    if let Some(kind) = outer.get("type").and_then(Value::as_str) {
        if KEEPALIVE_TYPES.contains(&kind) {
            return Ok(InboundMessage::Keepalive);
        }
    }

    // Application content arrives under a `message` key; tolerate bare
    // envelopes for test and direct-connect setups.
    let message = outer.get("message").unwrap_or(&outer);

    let message_type = message
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| LinkError::Protocol("envelope without a type tag".into()))?;

    match message_type {
        "command" => {
            let command = message
                .get("command")
                .cloned()
                .ok_or_else(|| LinkError::Protocol("command envelope without body".into()))?;
            let command: Command = serde_json::from_value(command)
                .map_err(|e| LinkError::Protocol(format!("malformed command: {e}")))?;
            Ok(InboundMessage::Command(command))
        }
        "script" => Ok(InboundMessage::Script),
        "error" => {
            let detail = message
                .get("error")
                .map(Value::to_string)
                .unwrap_or_else(|| "unspecified".to_string());
            Ok(InboundMessage::Error(detail))
        }
        other => Ok(InboundMessage::Unknown {
            message_type: other.to_string(),
        }),
    }
}

/// `command_status` body: the primary command-lifecycle encoding.
#[derive(Debug, Serialize)]
pub struct CommandStatus<'a> {
    /// `"adapter"` for gateway-originated updates, `"remote"` for acks that
    /// originated on the vehicle
    pub source: &'a str,
    /// Control-plane command id
    pub id: i64,
    /// Wire payload actually transmitted (transmitted status only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'a str>,
    /// Accumulated errors (failure statuses only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<&'a [String]>,
    /// Remote return code, 0 success / 1 failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Remote output (acks only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<&'a str>,
}

/// `command_update` body: the alternate lifecycle encoding.
///
/// The recognized field set is fixed; senders construct this struct, so an
/// unknown field cannot be emitted, and inbound copies with extra fields
/// fail deserialization with a logged error.
#[derive(Debug, Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandUpdate {
    /// Control-plane command id
    pub id: i64,
    /// Lifecycle state, e.g. `"complete"` or `"failed"`
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_1_current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_1_max: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_2_current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_2_max: Option<u64>,
}

/// Build the `measurements` payload.
pub fn measurements_payload(measurements: &[Measurement]) -> Value {
    json!({
        "type": "measurements",
        "measurements": measurements,
    })
}

/// Build a `command_status` payload.
pub fn command_status_payload(status: &CommandStatus<'_>) -> Value {
    json!({
        "type": "command_status",
        "command_status": status,
    })
}

/// Build a `command_update` payload.
pub fn command_update_payload(update: &CommandUpdate) -> Value {
    json!({
        "type": "command_update",
        "command": update,
    })
}

/// Build the `log_messages` payload.
pub fn log_messages_payload(events: &[LogEvent]) -> Value {
    json!({
        "type": "log_messages",
        "log_messages": events,
    })
}
