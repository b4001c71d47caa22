//! Wire shapes for the WebSocket protocol. All frames are text JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agentlens_types::SessionBatch;

/// Client → server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe { session_id: String },
    Unsubscribe,
}

/// Error codes carried on `error` frames. All are non-fatal; the connection
/// stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessage,
    UnknownSession,
}

/// Server-pushed lifecycle events, broadcast to every connected client
/// regardless of subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    #[serde(rename = "session:started")]
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        session_id: String,
        project_id: String,
        cwd: String,
        started_at: DateTime<Utc>,
    },
    #[serde(rename = "session:stopped")]
    #[serde(rename_all = "camelCase")]
    SessionStopped {
        session_id: String,
        reason: StopReason,
        stopped_at: DateTime<Utc>,
    },
    #[serde(rename = "session:error")]
    #[serde(rename_all = "camelCase")]
    SessionError {
        session_id: String,
        error: String,
        occurred_at: DateTime<Utc>,
    },
    #[serde(rename = "session:activity")]
    #[serde(rename_all = "camelCase")]
    SessionActivity {
        session_id: String,
        updated_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    User,
    Completed,
    Errored,
}

#[derive(Serialize)]
struct ErrorFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    code: ErrorCode,
    message: &'a str,
}

#[derive(Serialize)]
struct MessagesFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    #[serde(flatten)]
    batch: &'a SessionBatch,
}

pub(crate) fn error_frame(code: ErrorCode, message: &str) -> String {
    serde_json::to_string(&ErrorFrame {
        frame_type: "error",
        code,
        message,
    })
    .unwrap_or_else(|_| r#"{"type":"error","code":"INVALID_MESSAGE","message":""}"#.to_string())
}

/// The relay frame for one batch. Serialized once per batch; every
/// subscriber receives the identical string.
pub(crate) fn messages_frame(batch: &SessionBatch) -> String {
    serde_json::to_string(&MessagesFrame {
        frame_type: "messages",
        batch,
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_types::{ByteRange, Malformed, ParsedMessage};

    #[test]
    fn subscribe_frame_parses() {
        let frame: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","sessionId":"abc"}"#).unwrap();
        match frame {
            ClientMessage::Subscribe { session_id } => assert_eq!(session_id, "abc"),
            other => panic!("expected subscribe, got {:?}", other),
        }
    }

    #[test]
    fn error_frame_carries_screaming_code() {
        let frame = error_frame(ErrorCode::UnknownSession, "no such session");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "UNKNOWN_SESSION");
    }

    #[test]
    fn messages_frame_flattens_the_batch() {
        let batch = SessionBatch {
            session_id: "s-1".to_string(),
            messages: vec![ParsedMessage::Malformed(Malformed {
                raw: "x".to_string(),
                error: "Invalid JSON: x".to_string(),
                line_index: 0,
            })],
            byte_range: ByteRange { start: 0, end: 2 },
        };
        let value: serde_json::Value = serde_json::from_str(&messages_frame(&batch)).unwrap();
        assert_eq!(value["type"], "messages");
        assert_eq!(value["sessionId"], "s-1");
        assert_eq!(value["byteRange"]["end"], 2);
        assert_eq!(value["messages"][0]["kind"], "malformed");
    }

    #[test]
    fn lifecycle_event_tags_use_colon_names() {
        let event = LifecycleEvent::SessionStopped {
            session_id: "s-1".to_string(),
            reason: StopReason::Completed,
            stopped_at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session:stopped");
        assert_eq!(value["reason"], "completed");
    }
}
