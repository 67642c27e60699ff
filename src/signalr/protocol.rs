//! JSON hub protocol framing.
//!
//! Every frame is a JSON object terminated by the ASCII record separator
//! (`0x1E`). A single WebSocket text message may carry several frames.
//!
//! | `type` | Frame        | Direction        |
//! |--------|--------------|------------------|
//! | 1      | Invocation   | both             |
//! | 3      | Completion   | server → client  |
//! | 6      | Ping         | both             |
//! | 7      | Close        | both             |
//!
//! Stream frames (2, 4, 5) are never requested and are surfaced as
//! [`HubMessage::Other`].

// Rust guideline compliant 2026-02

use serde::Deserialize;
use serde_json::{json, Value};

/// Terminator appended to every frame.
pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// A decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// The server invoked a client-side method (an event push).
    Invocation {
        /// Set when the server expects a completion, which the bridge never does.
        invocation_id: Option<String>,
        /// Event name.
        target: String,
        /// Event arguments.
        arguments: Vec<Value>,
    },
    /// Result of a client-initiated remote call.
    Completion {
        /// Id of the call being completed.
        invocation_id: String,
        /// Return value, if any.
        result: Option<Value>,
        /// Error message if the call failed.
        error: Option<String>,
    },
    /// Keep-alive.
    Ping,
    /// The server is closing the connection.
    Close {
        /// Reason reported by the server.
        error: Option<String>,
        /// Whether the server allows the client to reconnect.
        allow_reconnect: bool,
    },
    /// Any frame type the bridge does not act on.
    Other(u8),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: Option<String>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    result: Option<Value>,
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

/// The handshake request sent right after the WebSocket upgrade.
#[must_use]
pub fn handshake_request() -> String {
    terminate(&json!({ "protocol": "json", "version": 1 }))
}

/// Interprets the handshake response frame.
///
/// An empty object means success; an `error` field carries the refusal.
pub fn parse_handshake_response(frame: &str) -> Result<(), String> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| format!("malformed handshake response: {e}"))?;
    match value.get("error").and_then(Value::as_str) {
        Some(error) => Err(error.to_string()),
        None => Ok(()),
    }
}

/// Splits a text message into its non-empty frames.
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR).filter(|frame| !frame.trim().is_empty())
}

/// Decodes a single frame (without its separator).
pub fn parse_message(frame: &str) -> Result<HubMessage, String> {
    let raw: RawMessage =
        serde_json::from_str(frame).map_err(|e| format!("malformed hub frame: {e}"))?;

    match raw.kind {
        INVOCATION => Ok(HubMessage::Invocation {
            invocation_id: raw.invocation_id,
            target: raw.target.ok_or("invocation frame without target")?,
            arguments: raw.arguments,
        }),
        COMPLETION => Ok(HubMessage::Completion {
            invocation_id: raw.invocation_id.ok_or("completion frame without invocationId")?,
            result: raw.result,
            error: raw.error,
        }),
        PING => Ok(HubMessage::Ping),
        CLOSE => Ok(HubMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect,
        }),
        other => Ok(HubMessage::Other(other)),
    }
}

/// Encodes a client-initiated remote call.
#[must_use]
pub fn encode_invocation(invocation_id: &str, target: &str, arguments: &[Value]) -> String {
    terminate(&json!({
        "type": INVOCATION,
        "invocationId": invocation_id,
        "target": target,
        "arguments": arguments,
    }))
}

/// Encodes a keep-alive frame.
#[must_use]
pub fn encode_ping() -> String {
    terminate(&json!({ "type": PING }))
}

/// Encodes a client close frame.
#[must_use]
pub fn encode_close() -> String {
    terminate(&json!({ "type": CLOSE }))
}

fn terminate(value: &Value) -> String {
    let mut frame = value.to_string();
    frame.push(RECORD_SEPARATOR);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_request_is_terminated() {
        let request = handshake_request();
        assert!(request.ends_with(RECORD_SEPARATOR));
        let body: Value = serde_json::from_str(request.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(body["protocol"], "json");
        assert_eq!(body["version"], 1);
    }

    #[test]
    fn test_handshake_response() {
        assert!(parse_handshake_response("{}").is_ok());
        assert_eq!(
            parse_handshake_response(r#"{"error":"Requested protocol 'xml' is not available."}"#),
            Err("Requested protocol 'xml' is not available.".to_string())
        );
        assert!(parse_handshake_response("not json").is_err());
    }

    #[test]
    fn test_split_frames_handles_batches() {
        let text = "{}\u{1e}{\"type\":6}\u{1e}";
        let frames: Vec<_> = split_frames(text).collect();
        assert_eq!(frames, vec!["{}", "{\"type\":6}"]);
    }

    #[test]
    fn test_parse_event_invocation() {
        let frame = r#"{"type":1,"target":"GatewayQuote","arguments":["CON.F.US.ENQ.M25",{"lastPrice":18000.25}]}"#;
        let msg = parse_message(frame).unwrap();
        assert_eq!(
            msg,
            HubMessage::Invocation {
                invocation_id: None,
                target: "GatewayQuote".to_string(),
                arguments: vec![json!("CON.F.US.ENQ.M25"), json!({"lastPrice": 18000.25})],
            }
        );
    }

    #[test]
    fn test_parse_completion_with_error() {
        let msg = parse_message(r#"{"type":3,"invocationId":"7","error":"Unauthorized"}"#).unwrap();
        assert_eq!(
            msg,
            HubMessage::Completion {
                invocation_id: "7".to_string(),
                result: None,
                error: Some("Unauthorized".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_close_and_ping() {
        assert_eq!(parse_message(r#"{"type":6}"#).unwrap(), HubMessage::Ping);
        assert_eq!(
            parse_message(r#"{"type":7,"error":"Server timeout","allowReconnect":true}"#).unwrap(),
            HubMessage::Close {
                error: Some("Server timeout".to_string()),
                allow_reconnect: true,
            }
        );
        assert_eq!(parse_message(r#"{"type":2,"invocationId":"1","item":1}"#).unwrap(), HubMessage::Other(2));
    }

    #[test]
    fn test_parse_rejects_incomplete_frames() {
        assert!(parse_message(r#"{"type":1,"arguments":[]}"#).is_err());
        assert!(parse_message(r#"{"type":3}"#).is_err());
        assert!(parse_message("[]").is_err());
    }

    #[test]
    fn test_encode_invocation() {
        let frame = encode_invocation("3", "SubscribeOrders", &[json!(12345)]);
        let body: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(body["type"], 1);
        assert_eq!(body["invocationId"], "3");
        assert_eq!(body["target"], "SubscribeOrders");
        assert_eq!(body["arguments"], json!([12345]));
    }
}
