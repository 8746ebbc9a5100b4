use std::collections::HashMap;

use forge_store::{IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Path,
    Env,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub harness_kind: String,
    pub prompt_mode: PromptMode,
    pub command_template: String,
    pub env_overrides: HashMap<String, String>,
    pub max_concurrency: u32,
    pub cooldown_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Profile {
    pub fn new(id: String, name: String, harness_kind: String, command_template: String, now: i64) -> Self {
        Self {
            id,
            name,
            harness_kind,
            prompt_mode: PromptMode::Path,
            command_template,
            env_overrides: HashMap::new(),
            max_concurrency: 0,
            cooldown_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self, now: i64, running_count: u32) -> bool {
        let cooldown_ok = self.cooldown_until.map(|until| until <= now).unwrap_or(true);
        let capacity_ok = self.max_concurrency == 0 || running_count < self.max_concurrency;
        cooldown_ok && capacity_ok
    }
}

impl Record for Profile {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "profiles"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), IndexValue::String(self.name.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_when_no_cooldown_and_under_capacity() {
        let p = Profile::new("p1".into(), "n".into(), "shell".into(), "echo".into(), 0);
        assert!(p.is_available(100, 0));
    }

    #[test]
    fn unavailable_when_cooldown_in_future() {
        let mut p = Profile::new("p1".into(), "n".into(), "shell".into(), "echo".into(), 0);
        p.cooldown_until = Some(200);
        assert!(!p.is_available(100, 0));
        assert!(p.is_available(200, 0));
    }

    #[test]
    fn unavailable_when_at_capacity() {
        let mut p = Profile::new("p1".into(), "n".into(), "shell".into(), "echo".into(), 0);
        p.max_concurrency = 1;
        assert!(p.is_available(100, 0));
        assert!(!p.is_available(100, 1));
    }

    #[test]
    fn unbounded_capacity_when_zero() {
        let p = Profile::new("p1".into(), "n".into(), "shell".into(), "echo".into(), 0);
        assert!(p.is_available(100, 1_000_000));
    }
}
