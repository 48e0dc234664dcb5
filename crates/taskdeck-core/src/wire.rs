use crate::run::{RunId, RunMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024;

const KIND_CONNECTED: &str = "connected";
const KIND_PONG: &str = "pong";
const KIND_PING: &str = "ping";

/// One JSON object received on the task-execution channel.
///
/// Every field is optional on the wire; the backend sends `connected` and
/// `pong` frames without an agent, and agent log frames without a `type` for
/// lifecycle purposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Connected,
    Pong,
}

impl ChannelMessage {
    pub fn event(agent: &str, kind: &str, content: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            agent: Some(agent.to_string()),
            content: Some(content.to_string()),
            ..Self::default()
        }
    }

    pub fn connected() -> Self {
        Self {
            kind: Some(KIND_CONNECTED.to_string()),
            message: Some("WebSocket connected".to_string()),
            ..Self::default()
        }
    }

    pub fn pong() -> Self {
        Self {
            kind: Some(KIND_PONG.to_string()),
            ..Self::default()
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<RunId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn sentinel(&self) -> Option<Sentinel> {
        match self.kind.as_deref() {
            Some(KIND_CONNECTED) => Some(Sentinel::Connected),
            Some(KIND_PONG) => Some(Sentinel::Pong),
            _ => None,
        }
    }

    pub fn is_pong(&self) -> bool {
        self.sentinel() == Some(Sentinel::Pong)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("message exceeds max size: {size} > {max}")]
    Oversized { size: usize, max: usize },
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message decode failed: {0}")]
    Decode(String),
}

pub fn decode_message(text: &str, max_bytes: usize) -> Result<ChannelMessage, WireError> {
    let raw = text.trim_end_matches(['\r', '\n']);
    if raw.len() > max_bytes {
        return Err(WireError::Oversized {
            size: raw.len(),
            max: max_bytes,
        });
    }
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| WireError::Decode(err.to_string()))?;
    if !value.is_object() {
        return Err(WireError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|err| WireError::Decode(err.to_string()))
}

pub fn encode_ping() -> String {
    format!("{{\"type\":\"{KIND_PING}\"}}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRequest {
    pub task: String,
    pub model: String,
    pub mode: RunMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchResponse {
    pub task_id: RunId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_agent_event_with_numeric_task_id() {
        let msg = decode_message(
            r#"{"task_id": 12, "agent": "coder", "type": "command", "content": "writing app.py", "timestamp": "2026-01-01T00:00:00"}"#,
            DEFAULT_MAX_MESSAGE_BYTES,
        )
        .unwrap();
        assert_eq!(msg.task_id, Some(RunId::from(12)));
        assert_eq!(msg.agent.as_deref(), Some("coder"));
        assert_eq!(msg.kind.as_deref(), Some("command"));
        assert_eq!(msg.sentinel(), None);
    }

    #[test]
    fn classifies_lifecycle_sentinels() {
        let connected =
            decode_message(r#"{"type":"connected","message":"WebSocket connected"}"#, 1024)
                .unwrap();
        let pong = decode_message("{\"type\":\"pong\"}\n", 1024).unwrap();
        assert_eq!(connected.sentinel(), Some(Sentinel::Connected));
        assert!(pong.is_pong());
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            decode_message("{not json", 1024),
            Err(WireError::Decode(_))
        ));
        assert_eq!(decode_message("[1,2]", 1024), Err(WireError::NotAnObject));
        assert!(matches!(
            decode_message(r#"{"content": 5}"#, 1024),
            Err(WireError::Decode(_))
        ));
        let oversized = format!("{{\"content\":\"{}\"}}", "x".repeat(64));
        assert!(matches!(
            decode_message(&oversized, 16),
            Err(WireError::Oversized { max: 16, .. })
        ));
    }

    #[test]
    fn dispatch_request_uses_wire_mode_names() {
        let request = DispatchRequest {
            task: "Create a Python Flask REST API".to_string(),
            model: "llama3".to_string(),
            mode: RunMode::TestOnly,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["mode"], "test");
        let response: DispatchResponse =
            serde_json::from_str(r#"{"task_id": 12, "status": "started"}"#).unwrap();
        assert_eq!(response.task_id.as_str(), "12");
        assert_eq!(encode_ping(), r#"{"type":"ping"}"#);
    }
}
