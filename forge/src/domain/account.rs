use std::collections::HashMap;

use forge_store::{IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub provider: String,
    pub profile_name: String,
    /// Credential reference string; resolved lazily via the `env:`/`$`/
    /// `${}`/`file:`/literal grammar, never stored resolved.
    pub credential_ref: String,
    pub cooldown_until: Option<i64>,
    pub rate_limit_count: u64,
    pub total_requests: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    pub fn new(id: String, provider: String, profile_name: String, credential_ref: String, now: i64) -> Self {
        Self {
            id,
            provider,
            profile_name,
            credential_ref,
            cooldown_until: None,
            rate_limit_count: 0,
            total_requests: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self, now: i64) -> bool {
        self.cooldown_until.map(|until| until <= now).unwrap_or(true)
    }
}

impl Record for Account {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "accounts"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("provider".to_string(), IndexValue::String(self.provider.clone()));
        fields.insert(
            "profile_name".to_string(),
            IndexValue::String(self.profile_name.clone()),
        );
        fields
    }
}
