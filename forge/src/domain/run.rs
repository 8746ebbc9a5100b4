use std::collections::HashMap;

use forge_store::{IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptSourceKind {
    Base,
    Override,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Error,
    Killed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Killed => "killed",
        };
        write!(f, "{s}")
    }
}

/// Output tails are bounded so a runaway child can't blow up the store row.
pub const OUTPUT_TAIL_MAX_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopRun {
    pub id: String,
    pub loop_id: String,
    pub profile_id: String,
    pub prompt_source: PromptSourceKind,
    pub prompt_override: bool,
    pub prompt_path: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub output_tail: String,
}

impl LoopRun {
    pub fn new(
        id: String,
        loop_id: String,
        profile_id: String,
        prompt_source: PromptSourceKind,
        prompt_override: bool,
        prompt_path: Option<String>,
        started_at: i64,
    ) -> Self {
        Self {
            id,
            loop_id,
            profile_id,
            prompt_source,
            prompt_override,
            prompt_path,
            started_at,
            finished_at: None,
            status: RunStatus::Running,
            exit_code: None,
            output_tail: String::new(),
        }
    }

    pub fn finish(&mut self, finished_at: i64, status: RunStatus, exit_code: Option<i32>, tail: &str) {
        self.finished_at = Some(finished_at);
        self.status = status;
        self.exit_code = exit_code;
        self.output_tail = bound_tail(tail);
    }

    pub fn is_running(&self) -> bool {
        self.finished_at.is_none() && matches!(self.status, RunStatus::Running)
    }
}

fn bound_tail(tail: &str) -> String {
    if tail.len() <= OUTPUT_TAIL_MAX_BYTES {
        return tail.to_string();
    }
    let start = tail.len() - OUTPUT_TAIL_MAX_BYTES;
    let mut boundary = start;
    while boundary < tail.len() && !tail.is_char_boundary(boundary) {
        boundary += 1;
    }
    tail[boundary..].to_string()
}

impl Record for LoopRun {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.finished_at.unwrap_or(self.started_at)
    }

    fn collection_name() -> &'static str {
        "loop_runs"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("loop_id".to_string(), IndexValue::String(self.loop_id.clone()));
        fields.insert(
            "profile_id".to_string(),
            IndexValue::String(self.profile_id.clone()),
        );
        fields.insert(
            "status".to_string(),
            IndexValue::String(self.status.to_string()),
        );
        fields
    }
}
