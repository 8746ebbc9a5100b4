use std::collections::HashMap;

use forge_store::{IndexValue, Record};
use serde::{Deserialize, Serialize};

/// Where a loop's base prompt comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    Inline(String),
    Path(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopBinding {
    Pinned(String),
    Pool(String),
    Default,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Stopped,
    Running,
    Sleeping,
    Waiting,
    Error,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopState::Stopped => "stopped",
            LoopState::Running => "running",
            LoopState::Sleeping => "sleeping",
            LoopState::Waiting => "waiting",
            LoopState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Reserved metadata keys called out by the data model: pid, started_at,
/// iteration_count, wait_until. Modeled as a struct rather than a loose map
/// so the Runner can't typo a key, while still round-tripping as an opaque
/// JSON object on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoopMetadata {
    pub pid: Option<u32>,
    pub started_at: Option<i64>,
    pub iteration_count: u32,
    pub wait_until: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub repo_path: String,
    pub prompt: Option<PromptSource>,
    pub interval_seconds: u64,
    pub max_iterations: Option<u32>,
    pub max_runtime_seconds: Option<u64>,
    pub binding: LoopBinding,
    pub state: LoopState,
    pub last_run_at: Option<i64>,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
    pub log_path: Option<String>,
    pub ledger_path: Option<String>,
    pub metadata: LoopMetadata,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Loop {
    pub fn new(id: String, short_id: String, name: String, repo_path: String, now: i64) -> Self {
        Self {
            id,
            short_id,
            name,
            repo_path,
            prompt: None,
            interval_seconds: 0,
            max_iterations: None,
            max_runtime_seconds: None,
            binding: LoopBinding::Default,
            state: LoopState::Stopped,
            last_run_at: None,
            last_exit_code: None,
            last_error: None,
            log_path: None,
            ledger_path: None,
            metadata: LoopMetadata::default(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Filesystem-safe slug: lowercase name, `[^a-z0-9]` folded to `-`,
    /// collapsed and trimmed, falling back to the loop id if that yields
    /// nothing usable.
    pub fn slug(&self) -> String {
        let mut out = String::new();
        let mut last_was_dash = false;
        for ch in self.name.to_lowercase().chars() {
            if ch.is_ascii_alphanumeric() {
                out.push(ch);
                last_was_dash = false;
            } else if !last_was_dash {
                out.push('-');
                last_was_dash = true;
            }
        }
        let trimmed = out.trim_matches('-').to_string();
        if trimmed.is_empty() {
            self.id.clone()
        } else {
            trimmed
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, LoopState::Stopped | LoopState::Error)
    }
}

impl Record for Loop {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "loops"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), IndexValue::String(self.name.clone()));
        fields.insert(
            "state".to_string(),
            IndexValue::String(self.state.to_string()),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_folds_non_alnum() {
        let l = Loop::new("id1".into(), "sh1".into(), "My Loop! v2".into(), "/tmp".into(), 0);
        assert_eq!(l.slug(), "my-loop-v2");
    }

    #[test]
    fn slug_falls_back_to_id_when_empty() {
        let l = Loop::new("id1".into(), "sh1".into(), "!!!".into(), "/tmp".into(), 0);
        assert_eq!(l.slug(), "id1");
    }

    #[test]
    fn is_terminal_for_stopped_and_error_only() {
        let mut l = Loop::new("id1".into(), "sh1".into(), "x".into(), "/tmp".into(), 0);
        assert!(l.is_terminal());
        l.state = LoopState::Running;
        assert!(!l.is_terminal());
        l.state = LoopState::Error;
        assert!(l.is_terminal());
    }
}
