use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Loop,
    Profile,
    Pool,
    Account,
    Run,
    QueueItem,
}

/// One of the eleven event kinds the Runner and Account service must emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "loop.state_changed")]
    LoopStateChanged { loop_id: String, from: String, to: String },
    #[serde(rename = "loop.iteration_started")]
    LoopIterationStarted { loop_id: String, run_id: String, iteration: u32 },
    #[serde(rename = "loop.iteration_finished")]
    LoopIterationFinished {
        loop_id: String,
        run_id: String,
        iteration: u32,
        status: String,
        exit_code: Option<i32>,
    },
    #[serde(rename = "loop.interrupted")]
    LoopInterrupted { loop_id: String, run_id: String, reason: String },
    #[serde(rename = "loop.paused")]
    LoopPaused { loop_id: String, duration_seconds: u64 },
    #[serde(rename = "loop.resumed")]
    LoopResumed { loop_id: String },
    #[serde(rename = "loop.stopped")]
    LoopStopped { loop_id: String, reason: String },
    #[serde(rename = "queue.consumed")]
    QueueConsumed { loop_id: String, item_id: String, kind: String },
    #[serde(rename = "account.rate_limit_detected")]
    AccountRateLimitDetected { account_id: String, cooldown_until: i64 },
    #[serde(rename = "account.cooldown_ended")]
    AccountCooldownEnded { account_id: String },
    #[serde(rename = "account.rotated")]
    AccountRotated {
        agent_id: String,
        old_id: String,
        new_id: String,
        reason: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::LoopStateChanged { .. } => "loop.state_changed",
            EventPayload::LoopIterationStarted { .. } => "loop.iteration_started",
            EventPayload::LoopIterationFinished { .. } => "loop.iteration_finished",
            EventPayload::LoopInterrupted { .. } => "loop.interrupted",
            EventPayload::LoopPaused { .. } => "loop.paused",
            EventPayload::LoopResumed { .. } => "loop.resumed",
            EventPayload::LoopStopped { .. } => "loop.stopped",
            EventPayload::QueueConsumed { .. } => "queue.consumed",
            EventPayload::AccountRateLimitDetected { .. } => "account.rate_limit_detected",
            EventPayload::AccountCooldownEnded { .. } => "account.cooldown_ended",
            EventPayload::AccountRotated { .. } => "account.rotated",
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EventPayload::LoopStateChanged { .. }
            | EventPayload::LoopIterationStarted { .. }
            | EventPayload::LoopIterationFinished { .. }
            | EventPayload::LoopInterrupted { .. }
            | EventPayload::LoopPaused { .. }
            | EventPayload::LoopResumed { .. }
            | EventPayload::LoopStopped { .. } => EntityType::Loop,
            EventPayload::QueueConsumed { .. } => EntityType::QueueItem,
            EventPayload::AccountRateLimitDetected { .. }
            | EventPayload::AccountCooldownEnded { .. }
            | EventPayload::AccountRotated { .. } => EntityType::Account,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            EventPayload::LoopStateChanged { loop_id, .. }
            | EventPayload::LoopIterationStarted { loop_id, .. }
            | EventPayload::LoopIterationFinished { loop_id, .. }
            | EventPayload::LoopInterrupted { loop_id, .. }
            | EventPayload::LoopPaused { loop_id, .. }
            | EventPayload::LoopResumed { loop_id }
            | EventPayload::LoopStopped { loop_id, .. }
            | EventPayload::QueueConsumed { loop_id, .. } => loop_id,
            EventPayload::AccountRateLimitDetected { account_id, .. }
            | EventPayload::AccountCooldownEnded { account_id } => account_id,
            EventPayload::AccountRotated { new_id, .. } => new_id,
        }
    }
}

/// The envelope every subscriber receives: `{id, timestamp, type, entity_type,
/// entity_id, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub timestamp: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: String, timestamp: i64, payload: EventPayload) -> Self {
        let entity_type = payload.entity_type();
        let entity_id = payload.entity_id().to_string();
        Self {
            id,
            timestamp,
            entity_type,
            entity_id,
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_payload_variant() {
        let ev = Event::new(
            "e1".into(),
            0,
            EventPayload::LoopStopped {
                loop_id: "l1".into(),
                reason: "cap".into(),
            },
        );
        assert_eq!(ev.event_type(), "loop.stopped");
        assert_eq!(ev.entity_id, "l1");
        assert_eq!(ev.entity_type, EntityType::Loop);
    }

    #[test]
    fn rotated_entity_id_is_new_account() {
        let ev = Event::new(
            "e1".into(),
            0,
            EventPayload::AccountRotated {
                agent_id: "a-1".into(),
                old_id: "old".into(),
                new_id: "new".into(),
                reason: "cooldown".into(),
            },
        );
        assert_eq!(ev.entity_id, "new");
    }

    #[test]
    fn serializes_with_tagged_type_field() {
        let ev = EventPayload::LoopResumed { loop_id: "l1".into() };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "loop.resumed");
    }
}
