use std::collections::HashMap;

use forge_store::{IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolMember {
    pub profile_id: String,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub members: Vec<PoolMember>,
    /// Index of the last profile selected, persisted across selections so
    /// round-robin survives a restart.
    pub last_index: i64,
    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Pool {
    pub fn new(id: String, name: String, now: i64) -> Self {
        Self {
            id,
            name,
            members: Vec::new(),
            last_index: -1,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_member(&mut self, profile_id: String) {
        let position = self.members.len() as u32;
        self.members.push(PoolMember { profile_id, position });
    }

    /// Ordered member list sorted by position.
    pub fn ordered_members(&self) -> Vec<&PoolMember> {
        let mut members: Vec<&PoolMember> = self.members.iter().collect();
        members.sort_by_key(|m| m.position);
        members
    }
}

impl Record for Pool {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "pools"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), IndexValue::String(self.name.clone()));
        fields.insert("is_default".to_string(), IndexValue::Bool(self.is_default));
        fields
    }
}
