//! Interrupt Watcher (§4.6): polls for steer/kill items queued mid-iteration.
//!
//! `watch` runs as one branch of a `tokio::select!` against the child
//! process future in the Runner; when the child wins the race first, the
//! watcher's future is simply dropped, which is its cancellation.

use std::time::Duration;

use tracing::debug;

use crate::domain::{QueueItemKind, QueueItemStatus};
use crate::error::AppResult;
use crate::repo::LoopQueueRepo;

#[derive(Debug, Clone)]
pub enum InterruptResult {
    KillOnly { reason: String },
    Steer { message: String },
}

/// Poll forever until a qualifying item appears. `iteration_start` is the
/// iteration's start timestamp; only items created strictly after it count.
pub async fn watch(
    queue: &dyn LoopQueueRepo,
    loop_id: &str,
    iteration_start: i64,
    poll_interval: Duration,
) -> AppResult<InterruptResult> {
    loop {
        if let Some(result) = poll_once(queue, loop_id, iteration_start)? {
            return Ok(result);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Single poll pass, split out so the Runner's test suite can drive it
/// without a real sleep loop.
pub fn poll_once(queue: &dyn LoopQueueRepo, loop_id: &str, iteration_start: i64) -> AppResult<Option<InterruptResult>> {
    let items = queue.list(loop_id)?;
    let hit = items.into_iter().find(|item| {
        item.status == QueueItemStatus::Pending
            && matches!(item.kind, QueueItemKind::SteerMessage | QueueItemKind::KillNow)
            && item.created_at > iteration_start
    });

    let Some(item) = hit else {
        return Ok(None);
    };

    // Best-effort: the planner will also consume this item; a failure here
    // is logged, not fatal.
    if let Err(err) = queue.update_status(&item.id, QueueItemStatus::Completed, None) {
        debug!(item_id = %item.id, error = %err, "failed to mark interrupt item completed");
    }

    let result = match item.kind {
        QueueItemKind::KillNow => {
            let reason = match item.payload {
                crate::domain::QueuePayload::Kill { reason } => reason,
                _ => String::new(),
            };
            InterruptResult::KillOnly { reason }
        }
        QueueItemKind::SteerMessage => {
            let message = match item.payload {
                crate::domain::QueuePayload::Steer { message } => message,
                _ => String::new(),
            };
            InterruptResult::Steer { message }
        }
        _ => unreachable!("filtered above"),
    };
    Ok(Some(result))
}
