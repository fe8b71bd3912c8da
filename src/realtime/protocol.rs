//! JSON hub protocol framing.
//!
//! Every message is a JSON object terminated by the ASCII record separator.
//! A connection opens with a handshake request from the client and an empty
//! object (or an `error`) from the server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChannelError;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// One decoded hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Stream items and cancellations, which this client never requests.
    Other(u8),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingInvocation<'a> {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: &'a str,
    target: &'a str,
    arguments: &'a [Value],
}

#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Opening frame sent by the client.
pub fn handshake_request() -> String {
    format!(r#"{{"protocol":"json","version":1}}{RECORD_SEPARATOR}"#)
}

/// Checks the server's handshake reply.
pub fn parse_handshake_response(frame: &str) -> Result<(), ChannelError> {
    let resp: HandshakeResponse =
        serde_json::from_str(frame).map_err(|e| ChannelError::Handshake(e.to_string()))?;
    match resp.error {
        Some(error) => Err(ChannelError::Handshake(error)),
        None => Ok(()),
    }
}

/// Splits a websocket text payload into individual frames.
pub fn split_frames(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
}

pub fn parse_message(frame: &str) -> Result<HubMessage, ChannelError> {
    let raw: RawMessage =
        serde_json::from_str(frame).map_err(|e| ChannelError::Protocol(e.to_string()))?;

    Ok(match raw.kind {
        INVOCATION => HubMessage::Invocation {
            invocation_id: raw.invocation_id,
            target: raw
                .target
                .ok_or_else(|| ChannelError::Protocol("invocation without target".to_string()))?,
            arguments: raw.arguments,
        },
        COMPLETION => HubMessage::Completion {
            invocation_id: raw
                .invocation_id
                .ok_or_else(|| ChannelError::Protocol("completion without id".to_string()))?,
            result: raw.result,
            error: raw.error,
        },
        PING => HubMessage::Ping,
        CLOSE => HubMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect,
        },
        other => HubMessage::Other(other),
    })
}

/// Encodes a blocking invocation expecting a completion with `invocation_id`.
pub fn invocation(
    invocation_id: &str,
    target: &str,
    arguments: &[Value],
) -> Result<String, ChannelError> {
    let body = serde_json::to_string(&OutgoingInvocation {
        kind: INVOCATION,
        invocation_id,
        target,
        arguments,
    })
    .map_err(|e| ChannelError::Protocol(e.to_string()))?;
    Ok(format!("{body}{RECORD_SEPARATOR}"))
}

pub fn ping() -> String {
    format!(r#"{{"type":{PING}}}{RECORD_SEPARATOR}"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handshake_frames() {
        assert_eq!(handshake_request(), "{\"protocol\":\"json\",\"version\":1}\u{1e}");
        assert!(parse_handshake_response("{}").is_ok());
        assert_eq!(
            parse_handshake_response(r#"{"error":"unsupported protocol"}"#),
            Err(ChannelError::Handshake("unsupported protocol".to_string()))
        );
    }

    #[test]
    fn splits_batched_payloads() {
        let payload = "{\"type\":6}\u{1e}{\"type\":6}\u{1e}";
        assert_eq!(split_frames(payload).count(), 2);
    }

    #[test]
    fn parses_invocations_and_completions() {
        let frame = r#"{"type":1,"target":"ReceiveStatusChange","arguments":[12,"Closed"]}"#;
        let msg = parse_message(frame).unwrap();
        assert_eq!(
            msg,
            HubMessage::Invocation {
                invocation_id: None,
                target: "ReceiveStatusChange".to_string(),
                arguments: vec![json!(12), json!("Closed")],
            }
        );

        let done = parse_message(r#"{"type":3,"invocationId":"1","result":null}"#).unwrap();
        assert!(matches!(done, HubMessage::Completion { error: None, .. }));

        let close = parse_message(r#"{"type":7,"error":"bye","allowReconnect":true}"#).unwrap();
        assert_eq!(
            close,
            HubMessage::Close {
                error: Some("bye".to_string()),
                allow_reconnect: true
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_message("not json").is_err());
        assert!(parse_message(r#"{"type":1}"#).is_err());
    }

    #[test]
    fn encodes_invocations() {
        let frame = invocation("7", "JoinGroup", &[json!("E1001")]).unwrap();
        let body = frame.trim_end_matches(RECORD_SEPARATOR);
        let value: Value = serde_json::from_str(body).unwrap();

        assert_eq!(
            value,
            json!({ "type": 1, "invocationId": "7", "target": "JoinGroup", "arguments": ["E1001"] })
        );
    }
}
