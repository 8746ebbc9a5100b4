//! End-to-end tests for the Loop Runner state machine, driving real child
//! processes through `ShellCommandHarness` against in-memory SQLite repos.
//! These cover the concrete scenarios laid out for the Runner: override +
//! message consumed together, graceful stop before any run, max-iterations
//! halting without an extra sleep, and a steer interrupting an in-flight
//! child and carrying context into the next iteration.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use forge::clock::{Clock, SystemClock};
use forge::domain::{
    Loop, LoopBinding, LoopQueueItem, LoopState, Profile, PromptMode, PromptSource, QueueItemKind, QueuePayload,
    RunStatus,
};
use forge::events::EventBus;
use forge::harness::ShellCommandHarness;
use forge::repo::{
    LoopQueueRepo, LoopRepo, LoopRunRepo, ProfileRepo, SqliteLoopQueueRepo, SqliteLoopRepo, SqliteLoopRunRepo,
    SqlitePoolRepo, SqliteProfileRepo,
};
use forge::runner::{LoopRunner, StopReason};
use tempfile::tempdir;
use tokio::sync::watch;

struct Harness {
    loops: Arc<SqliteLoopRepo>,
    queue: Arc<SqliteLoopQueueRepo>,
    runs: Arc<SqliteLoopRunRepo>,
    profiles: Arc<SqliteProfileRepo>,
    pools: Arc<SqlitePoolRepo>,
    data_dir: tempfile::TempDir,
    repo_dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            loops: Arc::new(SqliteLoopRepo::open_in_memory().unwrap()),
            queue: Arc::new(SqliteLoopQueueRepo::open_in_memory().unwrap()),
            runs: Arc::new(SqliteLoopRunRepo::open_in_memory().unwrap()),
            profiles: Arc::new(SqliteProfileRepo::open_in_memory().unwrap()),
            pools: Arc::new(SqlitePoolRepo::open_in_memory().unwrap()),
            data_dir: tempdir().unwrap(),
            repo_dir: tempdir().unwrap(),
        }
    }

    fn runner(&self) -> LoopRunner {
        let bus = EventBus::with_default_capacity();
        LoopRunner::new(
            self.loops.clone(),
            self.queue.clone(),
            self.runs.clone(),
            self.profiles.clone(),
            self.pools.clone(),
            Arc::new(SystemClock),
            bus.emitter(),
            Arc::new(ShellCommandHarness),
            self.data_dir.path().to_path_buf(),
        )
        .with_interrupt_poll_interval(Duration::from_millis(30))
    }

    fn make_loop(&self, command_template: &str) -> Loop {
        let mut profile = Profile::new("p1".into(), "p1".into(), "shell".into(), command_template.into(), 0);
        profile.prompt_mode = PromptMode::Path;
        self.profiles.create(&profile).unwrap();

        let mut l = Loop::new(
            "l1".into(),
            "l1".into(),
            "demo-loop".into(),
            self.repo_dir.path().to_str().unwrap().into(),
            0,
        );
        l.prompt = Some(PromptSource::Inline("base prompt".into()));
        l.binding = LoopBinding::Pinned("p1".into());
        self.loops.create(&l).unwrap();
        l
    }

    fn enqueue(&self, created_at: i64, kind: QueueItemKind, payload: QueuePayload) {
        let id = format!("q-{created_at}-{kind}");
        self.queue.enqueue(&LoopQueueItem::new(id, "l1".into(), created_at, kind, payload)).unwrap();
    }
}

#[tokio::test]
async fn override_and_message_consumed_together() {
    let h = Harness::new();
    let output = h.data_dir.path().join("captured.md");
    h.make_loop(&format!("cat {{{{prompt_path}}}} > {}", output.display()));

    h.enqueue(
        1,
        QueueItemKind::NextPromptOverride,
        QueuePayload::PromptOverride {
            prompt: "ovr".into(),
            is_path: false,
        },
    );
    h.enqueue(2, QueueItemKind::MessageAppend, QueuePayload::Message { text: "hello".into() });

    let (_tx, rx) = watch::channel(false);
    let reason = h.runner().run_once("l1", rx).await.unwrap();
    assert_eq!(reason, StopReason::RunOnceComplete);

    let captured = fs::read_to_string(&output).unwrap();
    assert!(captured.contains("ovr"));
    assert!(captured.contains("hello"));

    let items = h.queue.list("l1").unwrap();
    assert!(items.iter().all(|i| i.status == forge::domain::QueueItemStatus::Completed));

    let runs = h.runs.list_by_loop("l1").unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].prompt_source, forge::domain::PromptSourceKind::Override);
    assert!(runs[0].prompt_override);
}

#[tokio::test]
async fn graceful_stop_before_any_run() {
    let h = Harness::new();
    h.make_loop("true");
    h.enqueue(1, QueueItemKind::StopGraceful, QueuePayload::Stop { reason: "test".into() });

    let (_tx, rx) = watch::channel(false);
    let reason = h.runner().run_once("l1", rx).await.unwrap();
    assert_eq!(reason, StopReason::PlanStop);

    assert!(h.runs.list_by_loop("l1").unwrap().is_empty());
    let items = h.queue.list("l1").unwrap();
    assert_eq!(items[0].status, forge::domain::QueueItemStatus::Completed);

    let loop_def = h.loops.get("l1").unwrap().unwrap();
    assert_eq!(loop_def.state, LoopState::Stopped);
}

#[tokio::test]
async fn max_iterations_halts_without_extra_sleep() {
    let h = Harness::new();
    let mut l = h.make_loop("true");
    l.max_iterations = Some(2);
    l.interval_seconds = 0;
    h.loops.update(&l).unwrap();

    let (_tx, rx) = watch::channel(false);
    let started = std::time::Instant::now();
    let reason = h.runner().run_continuous("l1", rx).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(reason, StopReason::MaxIterations);
    assert!(elapsed < Duration::from_secs(2), "should not have slept after the cap, took {elapsed:?}");

    let runs = h.runs.list_by_loop("l1").unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));

    let loop_def = h.loops.get("l1").unwrap().unwrap();
    assert_eq!(loop_def.state, LoopState::Stopped);
    assert_eq!(loop_def.metadata.iteration_count, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn steer_carries_context_into_next_iteration() {
    let h = Harness::new();
    let output = h.data_dir.path().join("captured.md");
    let mut l = h.make_loop(&format!("sleep 2 && cat {{{{prompt_path}}}} > {}", output.display()));
    l.max_iterations = Some(2);
    l.interval_seconds = 0;
    h.loops.update(&l).unwrap();

    let queue = h.queue.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        queue
            .enqueue(&LoopQueueItem::new(
                "steer-1".into(),
                "l1".into(),
                forge::clock::SystemClock.now() + 1,
                QueueItemKind::SteerMessage,
                QueuePayload::Steer { message: "focus on X".into() },
            ))
            .unwrap();
    });

    let (_tx, rx) = watch::channel(false);
    let reason = tokio::time::timeout(Duration::from_secs(10), h.runner().run_continuous("l1", rx))
        .await
        .expect("runner should finish well within the timeout")
        .unwrap();
    assert_eq!(reason, StopReason::MaxIterations);

    // The second iteration's materialized prompt carries the steer text and
    // an interrupt-context appendix from the cancelled first iteration.
    let captured = fs::read_to_string(&output).unwrap();
    assert!(captured.contains("focus on X"));
    assert!(captured.contains("Interrupted during run"));

    let runs = h.runs.list_by_loop("l1").unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].status, RunStatus::Killed);
    assert_eq!(runs[1].status, RunStatus::Success);
}
