//! Wire frames exchanged over a chat connection.
//!
//! Inbound text is parsed in two steps: first into a loose `RawFrame` that
//! tolerates missing fields, then into the tagged `ClientFrame` the router
//! matches on. Each step maps its failure to the client-facing error text.

use mingle_common::UserId;
use serde::{Deserialize, Serialize};

pub const CHAT_MESSAGE: &str = "chat_message";
pub const READ_RECEIPT: &str = "read_receipt";

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A frame written to a client. Chat messages and read receipts are broadcast
/// to the room; errors go only to the connection that caused them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ChatMessage {
        message: String,
        sender: UserId,
        receiver: UserId,
    },
    ReadReceipt {
        sender: UserId,
        receiver: UserId,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// `message` is untrimmed and may be absent; the router validates it.
    ChatMessage {
        sender: UserId,
        receiver: UserId,
        message: Option<String>,
    },
    ReadReceipt {
        sender: UserId,
        receiver: UserId,
    },
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|_| FrameError::InvalidJson)?;
        // Derived `Deserialize` would also read a struct from a JSON array.
        if !value.is_object() {
            return Err(FrameError::InvalidShape);
        }
        let raw: RawFrame = serde_json::from_value(value).map_err(|_| FrameError::InvalidShape)?;
        raw.try_into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid message format: Expected JSON")]
    InvalidJson,
    #[error("Invalid message format")]
    InvalidShape,
    #[error("Missing required fields: sender and receiver")]
    MissingParticipants,
    #[error("Invalid user id")]
    InvalidUserId,
    #[error("Unknown frame type: {0}")]
    UnknownType(String),
}

/// User ids arrive as JSON numbers or as numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserRef {
    Id(i64),
    Text(String),
}

impl UserRef {
    fn resolve(self) -> Result<UserId, FrameError> {
        match self {
            Self::Id(id) => Ok(id),
            Self::Text(s) => s.trim().parse().map_err(|_| FrameError::InvalidUserId),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    sender: Option<serde_json::Value>,
    #[serde(default)]
    receiver: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

fn user_id(value: Option<serde_json::Value>) -> Result<Option<UserId>, FrameError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value::<UserRef>(v)
            .map_err(|_| FrameError::InvalidUserId)?
            .resolve()
            .map(Some),
    }
}

impl TryFrom<RawFrame> for ClientFrame {
    type Error = FrameError;

    fn try_from(raw: RawFrame) -> Result<Self, FrameError> {
        let (sender, receiver) = match (user_id(raw.sender)?, user_id(raw.receiver)?) {
            (Some(sender), Some(receiver)) => (sender, receiver),
            _ => return Err(FrameError::MissingParticipants),
        };

        // A frame without a tag is a chat message.
        match raw.kind.as_deref().unwrap_or(CHAT_MESSAGE) {
            CHAT_MESSAGE => Ok(Self::ChatMessage {
                sender,
                receiver,
                message: raw.message,
            }),
            READ_RECEIPT => Ok(Self::ReadReceipt { sender, receiver }),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_frame_defaults_to_chat_message() {
        let frame = ClientFrame::parse(r#"{"sender":1,"receiver":2,"message":"hi"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::ChatMessage {
                sender: 1,
                receiver: 2,
                message: Some("hi".into())
            }
        );
    }

    #[test]
    fn read_receipt_ignores_message_field() {
        let frame =
            ClientFrame::parse(r#"{"type":"read_receipt","sender":"2","receiver":1,"message":"x"}"#)
                .unwrap();
        assert_eq!(frame, ClientFrame::ReadReceipt { sender: 2, receiver: 1 });
    }

    #[test]
    fn chat_message_without_content_still_parses() {
        let frame = ClientFrame::parse(r#"{"type":"chat_message","sender":1,"receiver":2}"#).unwrap();
        assert!(matches!(frame, ClientFrame::ChatMessage { message: None, .. }));
    }

    #[test]
    fn parse_failures_map_to_client_text() {
        let cases = [
            ("not json", "Invalid message format: Expected JSON"),
            ("[1,2]", "Invalid message format"),
            (r#"["read_receipt", 2, 1]"#, "Invalid message format"),
            (r#"["chat_message", 1, 2, "hi"]"#, "Invalid message format"),
            ("42", "Invalid message format"),
            (r#"{"sender":1,"receiver":2,"message":5}"#, "Invalid message format"),
            (r#"{"sender":1,"message":"hi"}"#, "Missing required fields: sender and receiver"),
            (r#"{"sender":null,"receiver":2}"#, "Missing required fields: sender and receiver"),
            (r#"{"sender":"abc","receiver":2}"#, "Invalid user id"),
            (r#"{"sender":1.5,"receiver":2}"#, "Invalid user id"),
            (r#"{"type":"typing","sender":1,"receiver":2}"#, "Unknown frame type: typing"),
        ];
        for (input, expected) in cases {
            let err = ClientFrame::parse(input).unwrap_err();
            assert_eq!(err.to_string(), expected, "input: {input}");
        }
    }

    #[test]
    fn missing_participants_reported_before_unknown_type() {
        let err = ClientFrame::parse(r#"{"type":"bogus","receiver":2}"#).unwrap_err();
        assert_eq!(err, FrameError::MissingParticipants);
    }

    #[test]
    fn server_frames_serialize_with_type_tag() {
        let chat = ServerFrame::ChatMessage {
            message: "hi".into(),
            sender: 1,
            receiver: 2,
        };
        assert_eq!(
            serde_json::to_value(&chat).unwrap(),
            json!({"type": "chat_message", "message": "hi", "sender": 1, "receiver": 2})
        );

        let receipt = ServerFrame::ReadReceipt { sender: 2, receiver: 1 };
        assert_eq!(
            serde_json::to_value(&receipt).unwrap(),
            json!({"type": "read_receipt", "sender": 2, "receiver": 1})
        );

        assert_eq!(
            serde_json::to_value(ServerFrame::error("nope")).unwrap(),
            json!({"type": "error", "message": "nope"})
        );
    }
}
