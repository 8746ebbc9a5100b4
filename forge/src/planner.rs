//! Pure reduction of pending queue items into a single per-iteration [`Plan`].
//!
//! `fold` never touches a clock, a repository, or the filesystem — every
//! input is passed in, which is what makes the reduction rules property-
//! testable without a runtime.

use crate::domain::{LoopQueueItem, QueueItemKind, QueuePayload};

#[derive(Debug, Clone)]
pub struct PlannedMessage {
    pub text: String,
    pub source: MessageSource,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    Queue,
    Steer,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub messages: Vec<PlannedMessage>,
    pub override_prompt: Option<(String, bool)>,
    pub stop_requested: bool,
    pub kill_requested: bool,
    pub pause_duration: Option<u64>,
    pub pause_before_run: bool,
    pub consume_ids: Vec<String>,
    pub pause_ids: Vec<String>,
    pub stop_ids: Vec<String>,
    pub kill_ids: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.override_prompt.is_none()
            && !self.stop_requested
            && !self.kill_requested
            && self.pause_duration.is_none()
            && self.consume_ids.is_empty()
    }
}

/// A steer message carried over from the previous iteration's interrupt,
/// folded in as if it were queued before any pending item.
#[derive(Debug, Clone)]
pub struct CarriedSteer {
    pub text: String,
    pub created_at: i64,
}

/// Fold pending items (already sorted by ascending creation timestamp) plus
/// any carried-over steer text into a single Plan.
///
/// Reduction rules: message-append and pre-iteration steer-message both
/// append to `messages`; next-prompt-override takes only the first
/// occurrence; pause/stop-graceful/kill-now each terminate the scan (pause
/// is a barrier so nothing queued after it leaks into this iteration).
pub fn fold(carried_steer: &[CarriedSteer], pending: &[LoopQueueItem]) -> Plan {
    let mut plan = Plan::default();

    for steer in carried_steer {
        plan.messages.push(PlannedMessage {
            text: steer.text.clone(),
            source: MessageSource::Steer,
            created_at: steer.created_at,
        });
    }

    for item in pending {
        match item.kind {
            QueueItemKind::MessageAppend => {
                if let QueuePayload::Message { text } = &item.payload {
                    plan.messages.push(PlannedMessage {
                        text: text.clone(),
                        source: MessageSource::Queue,
                        created_at: item.created_at,
                    });
                }
                plan.consume_ids.push(item.id.clone());
            }
            QueueItemKind::SteerMessage => {
                if let QueuePayload::Steer { message } = &item.payload {
                    plan.messages.push(PlannedMessage {
                        text: message.clone(),
                        source: MessageSource::Steer,
                        created_at: item.created_at,
                    });
                }
                plan.consume_ids.push(item.id.clone());
            }
            QueueItemKind::NextPromptOverride => {
                if plan.override_prompt.is_none() {
                    if let QueuePayload::PromptOverride { prompt, is_path } = &item.payload {
                        plan.override_prompt = Some((prompt.clone(), *is_path));
                        plan.consume_ids.push(item.id.clone());
                    }
                }
            }
            QueueItemKind::Pause => {
                if let QueuePayload::Pause { duration_seconds } = &item.payload {
                    plan.pause_duration = Some(*duration_seconds);
                }
                plan.pause_before_run = plan.override_prompt.is_none() && plan.messages.is_empty();
                plan.pause_ids.push(item.id.clone());
                break;
            }
            QueueItemKind::StopGraceful => {
                plan.stop_requested = true;
                plan.stop_ids.push(item.id.clone());
                break;
            }
            QueueItemKind::KillNow => {
                plan.kill_requested = true;
                plan.kill_ids.push(item.id.clone());
                break;
            }
        }
    }

    apply_kill_supersedes_stop(&mut plan, pending);
    plan
}

/// §9 "graceful stop vs kill races": a kill-now item supersedes a
/// graceful stop even when the kill was enqueued strictly after the stop
/// and so was never reached by the barrier scan above. The barrier scan
/// stops at the first stop/kill/pause in creation order; this pass looks
/// past that point specifically for a still-pending kill.
fn apply_kill_supersedes_stop(plan: &mut Plan, pending: &[LoopQueueItem]) {
    if !plan.stop_requested || plan.kill_requested {
        return;
    }
    if let Some(kill_item) = pending.iter().find(|i| matches!(i.kind, QueueItemKind::KillNow)) {
        plan.kill_requested = true;
        plan.kill_ids.push(kill_item.id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, created_at: i64, kind: QueueItemKind, payload: QueuePayload) -> LoopQueueItem {
        LoopQueueItem::new(id.into(), "loop1".into(), created_at, kind, payload)
    }

    #[test]
    fn empty_queue_and_no_steer_yields_empty_plan() {
        let plan = fold(&[], &[]);
        assert!(plan.is_empty());
    }

    #[test]
    fn message_and_override_are_both_consumed() {
        let items = vec![
            item(
                "1",
                1,
                QueueItemKind::NextPromptOverride,
                QueuePayload::PromptOverride {
                    prompt: "ovr".into(),
                    is_path: false,
                },
            ),
            item("2", 2, QueueItemKind::MessageAppend, QueuePayload::Message { text: "hello".into() }),
        ];
        let plan = fold(&[], &items);
        assert_eq!(plan.override_prompt, Some(("ovr".to_string(), false)));
        assert_eq!(plan.messages.len(), 1);
        assert_eq!(plan.messages[0].text, "hello");
        assert_eq!(plan.consume_ids, vec!["1", "2"]);
    }

    #[test]
    fn second_override_is_ignored() {
        let items = vec![
            item(
                "1",
                1,
                QueueItemKind::NextPromptOverride,
                QueuePayload::PromptOverride {
                    prompt: "first".into(),
                    is_path: false,
                },
            ),
            item(
                "2",
                2,
                QueueItemKind::NextPromptOverride,
                QueuePayload::PromptOverride {
                    prompt: "second".into(),
                    is_path: false,
                },
            ),
        ];
        let plan = fold(&[], &items);
        assert_eq!(plan.override_prompt, Some(("first".to_string(), false)));
        assert_eq!(plan.consume_ids, vec!["1"]);
    }

    #[test]
    fn pause_is_a_barrier() {
        let items = vec![
            item("1", 1, QueueItemKind::Pause, QueuePayload::Pause { duration_seconds: 30 }),
            item("2", 2, QueueItemKind::MessageAppend, QueuePayload::Message { text: "after pause".into() }),
        ];
        let plan = fold(&[], &items);
        assert_eq!(plan.pause_duration, Some(30));
        assert!(plan.messages.is_empty());
        assert_eq!(plan.pause_ids, vec!["1"]);
        assert!(plan.consume_ids.is_empty());
    }

    #[test]
    fn pause_before_run_true_when_nothing_precedes_it() {
        let items = vec![item("1", 1, QueueItemKind::Pause, QueuePayload::Pause { duration_seconds: 5 })];
        let plan = fold(&[], &items);
        assert!(plan.pause_before_run);
    }

    #[test]
    fn pause_before_run_false_when_messages_precede_it() {
        let items = vec![
            item("1", 1, QueueItemKind::MessageAppend, QueuePayload::Message { text: "hi".into() }),
            item("2", 2, QueueItemKind::Pause, QueuePayload::Pause { duration_seconds: 5 }),
        ];
        let plan = fold(&[], &items);
        assert!(!plan.pause_before_run);
    }

    #[test]
    fn stop_terminates_scan() {
        let items = vec![
            item("1", 1, QueueItemKind::StopGraceful, QueuePayload::Stop { reason: "done".into() }),
            item("2", 2, QueueItemKind::MessageAppend, QueuePayload::Message { text: "ignored".into() }),
        ];
        let plan = fold(&[], &items);
        assert!(plan.stop_requested);
        assert_eq!(plan.stop_ids, vec!["1"]);
        assert!(plan.messages.is_empty());
    }

    #[test]
    fn kill_terminates_scan() {
        let items = vec![item(
            "1",
            1,
            QueueItemKind::KillNow,
            QueuePayload::Kill { reason: "panic".into() },
        )];
        let plan = fold(&[], &items);
        assert!(plan.kill_requested);
        assert_eq!(plan.kill_ids, vec!["1"]);
    }

    #[test]
    fn kill_supersedes_an_earlier_stop() {
        let items = vec![
            item("1", 1, QueueItemKind::StopGraceful, QueuePayload::Stop { reason: "first".into() }),
            item("2", 2, QueueItemKind::KillNow, QueuePayload::Kill { reason: "second".into() }),
        ];
        let plan = fold(&[], &items);
        assert!(plan.stop_requested);
        assert!(plan.kill_requested);
        assert_eq!(plan.stop_ids, vec!["1"]);
        assert_eq!(plan.kill_ids, vec!["2"]);
    }

    #[test]
    fn carried_steer_precedes_queue_messages() {
        let carried = vec![CarriedSteer {
            text: "focus on X".into(),
            created_at: 0,
        }];
        let items = vec![item(
            "1",
            1,
            QueueItemKind::MessageAppend,
            QueuePayload::Message { text: "hello".into() },
        )];
        let plan = fold(&carried, &items);
        assert_eq!(plan.messages.len(), 2);
        assert_eq!(plan.messages[0].text, "focus on X");
        assert_eq!(plan.messages[0].source, MessageSource::Steer);
        assert_eq!(plan.messages[1].text, "hello");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum ItemSpec {
        Message,
        Override,
        Pause,
        Stop,
        Kill,
    }

    fn item_spec() -> impl Strategy<Value = ItemSpec> {
        prop_oneof![
            Just(ItemSpec::Message),
            Just(ItemSpec::Override),
            Just(ItemSpec::Pause),
            Just(ItemSpec::Stop),
            Just(ItemSpec::Kill),
        ]
    }

    fn to_item(i: usize, spec: &ItemSpec) -> LoopQueueItem {
        let id = i.to_string();
        match spec {
            ItemSpec::Message => LoopQueueItem::new(
                id,
                "loop1".into(),
                i as i64,
                QueueItemKind::MessageAppend,
                QueuePayload::Message { text: format!("m{i}") },
            ),
            ItemSpec::Override => LoopQueueItem::new(
                id,
                "loop1".into(),
                i as i64,
                QueueItemKind::NextPromptOverride,
                QueuePayload::PromptOverride {
                    prompt: format!("o{i}"),
                    is_path: false,
                },
            ),
            ItemSpec::Pause => LoopQueueItem::new(
                id,
                "loop1".into(),
                i as i64,
                QueueItemKind::Pause,
                QueuePayload::Pause { duration_seconds: 1 },
            ),
            ItemSpec::Stop => LoopQueueItem::new(
                id,
                "loop1".into(),
                i as i64,
                QueueItemKind::StopGraceful,
                QueuePayload::Stop { reason: "r".into() },
            ),
            ItemSpec::Kill => LoopQueueItem::new(
                id,
                "loop1".into(),
                i as i64,
                QueueItemKind::KillNow,
                QueuePayload::Kill { reason: "r".into() },
            ),
        }
    }

    proptest! {
        #[test]
        fn no_item_after_a_barrier_contributes(specs in prop::collection::vec(item_spec(), 0..12)) {
            let items: Vec<LoopQueueItem> = specs.iter().enumerate().map(|(i, s)| to_item(i, s)).collect();
            let plan = fold(&[], &items);

            let barrier_index = items.iter().position(|it| {
                matches!(it.kind, QueueItemKind::Pause | QueueItemKind::StopGraceful | QueueItemKind::KillNow)
            });

            if let Some(idx) = barrier_index {
                // every consumed id must have an index <= idx
                for consumed in &plan.consume_ids {
                    let consumed_idx: usize = consumed.parse().unwrap();
                    prop_assert!(consumed_idx <= idx);
                }
            }
        }

        #[test]
        fn at_most_one_override_wins(specs in prop::collection::vec(item_spec(), 0..12)) {
            let items: Vec<LoopQueueItem> = specs.iter().enumerate().map(|(i, s)| to_item(i, s)).collect();
            let plan = fold(&[], &items);
            let first_override = items.iter().position(|it| matches!(it.kind, QueueItemKind::NextPromptOverride));
            match (plan.override_prompt, first_override) {
                (Some((prompt, _)), Some(idx)) => {
                    prop_assert_eq!(prompt, format!("o{idx}"));
                }
                (None, first) => {
                    // only acceptable if no override precedes a barrier, or there is none at all
                    if let Some(idx) = first {
                        let barrier_before = items[..idx].iter().any(|it| {
                            matches!(it.kind, QueueItemKind::Pause | QueueItemKind::StopGraceful | QueueItemKind::KillNow)
                        });
                        prop_assert!(barrier_before);
                    }
                }
                (Some(_), None) => prop_assert!(false, "override present in plan but not in source items"),
            }
        }
    }
}
