use std::collections::HashMap;

use forge_store::{IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QueueItemKind {
    MessageAppend,
    NextPromptOverride,
    Pause,
    SteerMessage,
    StopGraceful,
    KillNow,
}

impl std::fmt::Display for QueueItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueItemKind::MessageAppend => "message-append",
            QueueItemKind::NextPromptOverride => "next-prompt-override",
            QueueItemKind::Pause => "pause",
            QueueItemKind::SteerMessage => "steer-message",
            QueueItemKind::StopGraceful => "stop-graceful",
            QueueItemKind::KillNow => "kill-now",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    #[default]
    Pending,
    Dispatched,
    Completed,
    Failed,
}

/// Kind-specific payload bodies, matching the JSON schemas in the wire
/// contract. Kept as an enum (rather than a bare `serde_json::Value`) so
/// planner/resolver code gets exhaustiveness checking. Internally tagged on
/// `payload_kind` for storage: `Stop{reason}` and `Kill{reason}` have
/// identical shape, so an untagged representation can't tell them apart on
/// the round trip through the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "payload_kind")]
pub enum QueuePayload {
    Message { text: String },
    PromptOverride { prompt: String, is_path: bool },
    Pause { duration_seconds: u64 },
    Steer { message: String },
    Stop { reason: String },
    Kill { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopQueueItem {
    pub id: String,
    pub loop_id: String,
    pub created_at: i64,
    pub kind: QueueItemKind,
    pub payload: QueuePayload,
    pub status: QueueItemStatus,
    pub error: Option<String>,
}

impl LoopQueueItem {
    pub fn new(id: String, loop_id: String, created_at: i64, kind: QueueItemKind, payload: QueuePayload) -> Self {
        Self {
            id,
            loop_id,
            created_at,
            kind,
            payload,
            status: QueueItemStatus::Pending,
            error: None,
        }
    }
}

impl Record for LoopQueueItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "loop_queue_items"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("loop_id".to_string(), IndexValue::String(self.loop_id.clone()));
        fields.insert(
            "status".to_string(),
            IndexValue::String(format!("{:?}", self.status)),
        );
        fields.insert("created_at".to_string(), IndexValue::Int(self.created_at));
        fields
    }
}
