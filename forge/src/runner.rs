//! Loop Runner (§4.1): the per-loop iteration state machine. Couples prompt
//! resolution, queue consumption, profile selection, child-process
//! supervision with interruption, ledger writing, and loop termination.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{Loop, LoopRun, LoopState, Profile, QueueItemStatus, RunStatus};
use crate::error::{AppError, AppResult};
use crate::events::{EventEmitter, EventPayload};
use crate::harness::{BuildExecution, StdinSource};
use crate::interrupt::{self, InterruptResult};
use crate::ledger;
use crate::planner::{self, CarriedSteer, Plan};
use crate::prompt;
use crate::repo::{LoopQueueRepo, LoopRepo, LoopRunRepo, PoolRepo, ProfileRepo};
use crate::selector::{Selector, SelectionOutcome};

/// Why `run_continuous`/`run_once` returned normally rather than erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    MaxIterations,
    MaxRuntime,
    PlanStop,
    PlanKill,
    RunOnceComplete,
}

pub struct LoopRunner {
    loops: Arc<dyn LoopRepo>,
    queue: Arc<dyn LoopQueueRepo>,
    runs: Arc<dyn LoopRunRepo>,
    profiles: Arc<dyn ProfileRepo>,
    pools: Arc<dyn PoolRepo>,
    clock: Arc<dyn Clock>,
    events: EventEmitter,
    harness: Arc<dyn BuildExecution>,
    data_dir: PathBuf,
    interrupt_poll_interval: Duration,
    default_wait_interval_seconds: u64,
}

impl LoopRunner {
    pub fn new(
        loops: Arc<dyn LoopRepo>,
        queue: Arc<dyn LoopQueueRepo>,
        runs: Arc<dyn LoopRunRepo>,
        profiles: Arc<dyn ProfileRepo>,
        pools: Arc<dyn PoolRepo>,
        clock: Arc<dyn Clock>,
        events: EventEmitter,
        harness: Arc<dyn BuildExecution>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            loops,
            queue,
            runs,
            profiles,
            pools,
            clock,
            events,
            harness,
            data_dir,
            interrupt_poll_interval: Duration::from_secs(1),
            default_wait_interval_seconds: 60,
        }
    }

    pub fn with_interrupt_poll_interval(mut self, interval: Duration) -> Self {
        self.interrupt_poll_interval = interval;
        self
    }

    pub fn with_default_wait_interval_seconds(mut self, seconds: u64) -> Self {
        self.default_wait_interval_seconds = seconds;
        self
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Execute exactly one iteration then return, per `run_once`.
    pub async fn run_once(&self, loop_id: &str, cancel: watch::Receiver<bool>) -> AppResult<StopReason> {
        self.enter(loop_id)?;
        let mut carried: Vec<CarriedSteer> = Vec::new();
        let mut cancel = cancel;
        if let Some(reason) = self.precheck(loop_id)? {
            self.terminate(loop_id, reason.clone())?;
            return Ok(reason);
        }
        let outcome = self.run_single_iteration(loop_id, &mut carried, &mut cancel).await?;
        match outcome {
            IterationOutcome::Stopped(reason) | IterationOutcome::Killed(reason) => {
                self.terminate(loop_id, reason.clone())?;
                Ok(reason)
            }
            IterationOutcome::Continue { .. } => {
                self.terminate(loop_id, StopReason::RunOnceComplete)?;
                Ok(StopReason::RunOnceComplete)
            }
        }
    }

    /// Drive iterations until stop/kill/cap/cancellation.
    pub async fn run_continuous(&self, loop_id: &str, mut cancel: watch::Receiver<bool>) -> AppResult<StopReason> {
        self.enter(loop_id)?;
        let mut carried: Vec<CarriedSteer> = Vec::new();

        loop {
            if *cancel.borrow() {
                self.terminate(loop_id, StopReason::Cancelled)?;
                return Ok(StopReason::Cancelled);
            }

            if let Some(reason) = self.precheck(loop_id)? {
                self.terminate(loop_id, reason.clone())?;
                return Ok(reason);
            }

            let outcome = self.run_single_iteration(loop_id, &mut carried, &mut cancel).await?;
            match outcome {
                IterationOutcome::Stopped(reason) | IterationOutcome::Killed(reason) => {
                    self.terminate(loop_id, reason.clone())?;
                    return Ok(reason);
                }
                IterationOutcome::Continue { skip_sleep } => {
                    if skip_sleep {
                        continue;
                    }
                    let loop_def = self.require_loop(loop_id)?;
                    if loop_def.interval_seconds > 0 {
                        self.sleep_cancellable(loop_def.interval_seconds, &mut cancel).await;
                    }
                }
            }
        }
    }

    fn require_loop(&self, loop_id: &str) -> AppResult<Loop> {
        self.loops.get(loop_id)?.ok_or_else(|| AppError::NotFound(loop_id.to_string()))
    }

    /// Step 1: Enter.
    fn enter(&self, loop_id: &str) -> AppResult<()> {
        let mut loop_def = self.require_loop(loop_id)?;
        let now = self.now();
        std::fs::create_dir_all(self.data_dir.join("logs").join("loops"))?;
        loop_def.metadata.pid = Some(std::process::id());
        loop_def.metadata.started_at = Some(now);
        let from = loop_def.state.to_string();
        loop_def.state = LoopState::Running;
        loop_def.log_path = Some(
            self.data_dir
                .join("logs")
                .join("loops")
                .join(format!("{}.log", loop_def.slug()))
                .display()
                .to_string(),
        );
        loop_def.updated_at = now;
        self.loops.update(&loop_def)?;
        self.events.emit(
            EventPayload::LoopStateChanged {
                loop_id: loop_id.to_string(),
                from,
                to: LoopState::Running.to_string(),
            },
            now,
        );
        debug!(loop_id, "entered run");
        Ok(())
    }

    /// Step 2: Precheck. Returns `Some(reason)` when the loop must terminate
    /// before scheduling another iteration.
    fn precheck(&self, loop_id: &str) -> AppResult<Option<StopReason>> {
        let loop_def = self.require_loop(loop_id)?;
        if let Some(max_iterations) = loop_def.max_iterations {
            if max_iterations > 0 && loop_def.metadata.iteration_count >= max_iterations {
                return Ok(Some(StopReason::MaxIterations));
            }
        }
        if let Some(max_runtime) = loop_def.max_runtime_seconds {
            if max_runtime > 0 {
                let started = loop_def.metadata.started_at.unwrap_or(self.now());
                if self.now() - started >= max_runtime as i64 {
                    return Ok(Some(StopReason::MaxRuntime));
                }
            }
        }
        Ok(None)
    }

    async fn run_single_iteration(
        &self,
        loop_id: &str,
        carried: &mut Vec<CarriedSteer>,
        cancel: &mut watch::Receiver<bool>,
    ) -> AppResult<IterationOutcome> {
        // Step 3: Plan.
        let pending = self.queue.list(loop_id)?;
        let pending: Vec<_> = pending.into_iter().filter(|i| i.status == QueueItemStatus::Pending).collect();
        let plan = planner::fold(carried, &pending);
        carried.clear();

        if plan.kill_requested || plan.stop_requested {
            self.consume(loop_id, &plan)?;
            let reason = if plan.kill_requested { StopReason::PlanKill } else { StopReason::PlanStop };
            return Ok(if plan.kill_requested {
                IterationOutcome::Killed(reason)
            } else {
                IterationOutcome::Stopped(reason)
            });
        }

        if let Some(duration) = plan.pause_duration {
            if plan.pause_before_run {
                self.set_state(loop_id, LoopState::Sleeping)?;
                self.events.emit(
                    EventPayload::LoopPaused {
                        loop_id: loop_id.to_string(),
                        duration_seconds: duration,
                    },
                    self.now(),
                );
                self.sleep_cancellable(duration, cancel).await;
                self.events.emit(
                    EventPayload::LoopResumed {
                        loop_id: loop_id.to_string(),
                    },
                    self.now(),
                );
                for id in &plan.pause_ids {
                    self.queue.update_status(id, QueueItemStatus::Completed, None)?;
                }
                if let Some(reason) = self.precheck(loop_id)? {
                    return Ok(IterationOutcome::Stopped(reason));
                }
                return Ok(IterationOutcome::Continue { skip_sleep: true });
            }
        }

        // Step 4: Select profile.
        let loop_def = self.require_loop(loop_id)?;
        let selection = {
            let selector = Selector {
                profiles: self.profiles.as_ref(),
                pools: self.pools.as_ref(),
                runs: self.runs.as_ref(),
                clock: self.clock.as_ref(),
                default_wait_interval_seconds: self.default_wait_interval_seconds,
            };
            selector.select(&loop_def.binding)
        };

        let profile = match selection {
            Ok(SelectionOutcome::Selected(profile)) => profile,
            Ok(SelectionOutcome::Unavailable { wait_until }) => {
                self.set_waiting(loop_id, wait_until)?;
                let wait_seconds = (wait_until - self.now()).max(0) as u64;
                self.sleep_cancellable(wait_seconds.max(1), cancel).await;
                return Ok(IterationOutcome::Continue { skip_sleep: true });
            }
            Err(err @ AppError::PinnedProfileUnavailable(_)) => {
                self.fatal(loop_id, &err.to_string())?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        // Step 5: Resolve prompt.
        let resolved = prompt::resolve(&loop_def, plan.override_prompt.as_ref(), &plan.messages)?;
        let run_id = Uuid::now_v7().to_string();
        let iteration_start = self.now();

        // §4.5: materialize a fresh file only when the content isn't already
        // sitting on disk untouched. An override, an inline base, or any
        // appended operator messages all mean the content differs from
        // whatever file it may have started as. A file-sourced base with no
        // messages reuses its existing path instead of rewriting a copy.
        let prompt_path = if profile.prompt_mode == crate::domain::PromptMode::Path {
            let needs_materialize = resolved.is_override || resolved.base_was_inline || !plan.messages.is_empty();
            if needs_materialize {
                Some(prompt::materialize(&self.data_dir, &loop_def.id, &run_id, &resolved.content)?)
            } else {
                match &resolved.existing_path {
                    Some(path) => Some(path.clone()),
                    None => Some(prompt::materialize(&self.data_dir, &loop_def.id, &run_id, &resolved.content)?),
                }
            }
        } else {
            None
        };

        // Step 6: Create run row.
        let mut run = LoopRun::new(
            run_id.clone(),
            loop_id.to_string(),
            profile.id.clone(),
            resolved.source,
            resolved.is_override,
            prompt_path.as_ref().map(|p| p.display().to_string()),
            iteration_start,
        );
        self.runs.create(&run)?;
        self.events.emit(
            EventPayload::LoopIterationStarted {
                loop_id: loop_id.to_string(),
                run_id: run_id.clone(),
                iteration: loop_def.metadata.iteration_count + 1,
            },
            iteration_start,
        );

        // Step 7: Execute with interruption.
        let exec_outcome = self
            .execute_with_interruption(&loop_def, &profile, prompt_path.as_deref(), &resolved.content, &run_id, iteration_start)
            .await?;

        // Step 8: Finalize run.
        let finished_at = self.now();
        let (status, exit_code, tail, interrupt_hit) = match &exec_outcome {
            ExecOutcome::Exited { code, tail } => {
                let status = if *code == Some(0) { RunStatus::Success } else { RunStatus::Error };
                (status, *code, tail.clone(), None)
            }
            ExecOutcome::Interrupted { result, tail } => (RunStatus::Killed, None, tail.clone(), Some(result.clone())),
        };
        run.finish(finished_at, status, exit_code, &tail);
        self.runs.finish(&run_id, finished_at, status, exit_code, &tail)?;

        self.events.emit(
            EventPayload::LoopIterationFinished {
                loop_id: loop_id.to_string(),
                run_id: run_id.clone(),
                iteration: loop_def.metadata.iteration_count + 1,
                status: status.to_string(),
                exit_code,
            },
            finished_at,
        );

        // Step 9: Update loop.
        let mut loop_def = self.require_loop(loop_id)?;
        loop_def.last_run_at = Some(finished_at);
        loop_def.last_exit_code = exit_code;
        loop_def.last_error = match &interrupt_hit {
            Some(InterruptResult::KillOnly { reason }) => Some(format!("killed: {reason}")),
            Some(InterruptResult::Steer { .. }) => None,
            None if exit_code != Some(0) => Some("non-zero exit".to_string()),
            None => None,
        };
        loop_def.metadata.iteration_count += 1;
        loop_def.state = LoopState::Sleeping;
        loop_def.updated_at = finished_at;
        self.loops.update(&loop_def)?;
        self.consume(loop_id, &plan)?;

        // Step 10: Ledger.
        ledger::append(&loop_def.repo_path, &loop_def.slug(), &profile.name, &run)?;

        // Step 11: Post-run control.
        if let Some(InterruptResult::KillOnly { reason }) = &interrupt_hit {
            self.events.emit(
                EventPayload::LoopInterrupted {
                    loop_id: loop_id.to_string(),
                    run_id: run_id.clone(),
                    reason: reason.clone(),
                },
                finished_at,
            );
            return Ok(IterationOutcome::Killed(StopReason::PlanKill));
        }

        if let Some(InterruptResult::Steer { message }) = &interrupt_hit {
            self.events.emit(
                EventPayload::LoopInterrupted {
                    loop_id: loop_id.to_string(),
                    run_id: run_id.clone(),
                    reason: "steer".to_string(),
                },
                finished_at,
            );
            let context = format!(
                "Interrupted during run {run_id}.\n\nRecent output:\n{}",
                truncate_tail(&run.output_tail, 2000)
            );
            carried.push(CarriedSteer {
                text: format!("{message}\n\n---\n{context}"),
                created_at: finished_at,
            });

            // Re-check queue for stop/kill queued while finalizing.
            let fresh = self.queue.list(loop_id)?;
            let fresh: Vec<_> = fresh.into_iter().filter(|i| i.status == QueueItemStatus::Pending).collect();
            let replan = planner::fold(&[], &fresh);
            if replan.kill_requested || replan.stop_requested {
                self.consume(loop_id, &replan)?;
                return Ok(if replan.kill_requested {
                    IterationOutcome::Killed(StopReason::PlanKill)
                } else {
                    IterationOutcome::Stopped(StopReason::PlanStop)
                });
            }
            return Ok(IterationOutcome::Continue { skip_sleep: true });
        }

        // Step 12: Pause-after.
        if let Some(duration) = plan.pause_duration {
            if !plan.pause_before_run {
                self.sleep_cancellable(duration, cancel).await;
                self.events.emit(
                    EventPayload::LoopResumed {
                        loop_id: loop_id.to_string(),
                    },
                    self.now(),
                );
                for id in &plan.pause_ids {
                    self.queue.update_status(id, QueueItemStatus::Completed, None)?;
                }
                return Ok(IterationOutcome::Continue { skip_sleep: true });
            }
        }

        Ok(IterationOutcome::Continue { skip_sleep: false })
    }

    async fn execute_with_interruption(
        &self,
        loop_def: &Loop,
        profile: &Profile,
        prompt_path: Option<&std::path::Path>,
        prompt_content: &str,
        run_id: &str,
        iteration_start: i64,
    ) -> AppResult<ExecOutcome> {
        let prompt_path_str = prompt_path.map(|p| p.display().to_string());
        let spec = self
            .harness
            .build(&loop_def.repo_path, profile, prompt_path_str.as_deref(), prompt_content)?;

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .env("FORGE_LOOP_ID", &loop_def.id)
            .env("FORGE_LOOP_NAME", &loop_def.name)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if spec.stdin_source == StdinSource::PromptContent {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }
        for (k, v) in &spec.env {
            command.env(k, v);
        }
        if profile.prompt_mode == crate::domain::PromptMode::Env {
            command.env("FORGE_PROMPT_CONTENT", prompt_content);
        }
        if !spec.env.contains_key("FMAIL_AGENT") {
            command.env("FMAIL_AGENT", &loop_def.name);
        }

        let mut child = command.spawn().map_err(AppError::Io)?;

        if spec.stdin_source == StdinSource::PromptContent {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(prompt_content.as_bytes()).await;
            }
        }

        let child_fut = child.wait_with_output();
        let watcher_fut = interrupt::watch(self.queue.as_ref(), &loop_def.id, iteration_start, self.interrupt_poll_interval);

        tokio::select! {
            result = child_fut => {
                let output = result.map_err(AppError::Io)?;
                let mut tail = String::from_utf8_lossy(&output.stdout).to_string();
                tail.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(ExecOutcome::Exited { code: output.status.code(), tail: truncate_tail(&tail, crate::domain::OUTPUT_TAIL_MAX_BYTES) })
            }
            result = watcher_fut => {
                let interrupt_result = result?;
                if let Err(err) = kill_process_group(&mut child) {
                    warn!(run_id, error = %err, "failed to signal interrupted child");
                }
                let _ = child.wait().await;
                Ok(ExecOutcome::Interrupted { result: interrupt_result, tail: String::new() })
            }
        }
    }

    fn consume(&self, loop_id: &str, plan: &Plan) -> AppResult<()> {
        for id in plan
            .consume_ids
            .iter()
            .chain(plan.pause_ids.iter())
            .chain(plan.stop_ids.iter())
            .chain(plan.kill_ids.iter())
        {
            if let Err(err) = self.queue.update_status(id, QueueItemStatus::Completed, None) {
                warn!(item_id = %id, error = %err, "failed to mark queue item completed");
            } else {
                self.events.emit(
                    EventPayload::QueueConsumed {
                        loop_id: loop_id.to_string(),
                        item_id: id.clone(),
                        kind: String::new(),
                    },
                    self.now(),
                );
            }
        }
        Ok(())
    }

    fn set_state(&self, loop_id: &str, state: LoopState) -> AppResult<()> {
        let mut loop_def = self.require_loop(loop_id)?;
        loop_def.state = state;
        loop_def.updated_at = self.now();
        self.loops.update(&loop_def)
    }

    fn set_waiting(&self, loop_id: &str, wait_until: i64) -> AppResult<()> {
        let mut loop_def = self.require_loop(loop_id)?;
        loop_def.state = LoopState::Waiting;
        loop_def.metadata.wait_until = Some(wait_until);
        loop_def.updated_at = self.now();
        self.loops.update(&loop_def)
    }

    fn fatal(&self, loop_id: &str, message: &str) -> AppResult<()> {
        let mut loop_def = self.require_loop(loop_id)?;
        loop_def.state = LoopState::Error;
        loop_def.last_error = Some(message.to_string());
        loop_def.updated_at = self.now();
        self.loops.update(&loop_def)
    }

    fn terminate(&self, loop_id: &str, reason: StopReason) -> AppResult<()> {
        let mut loop_def = self.require_loop(loop_id)?;
        let from = loop_def.state.to_string();
        loop_def.state = LoopState::Stopped;
        loop_def.updated_at = self.now();
        self.loops.update(&loop_def)?;
        self.events.emit(
            EventPayload::LoopStateChanged {
                loop_id: loop_id.to_string(),
                from,
                to: LoopState::Stopped.to_string(),
            },
            self.now(),
        );
        self.events.emit(
            EventPayload::LoopStopped {
                loop_id: loop_id.to_string(),
                reason: format!("{reason:?}"),
            },
            self.now(),
        );
        info!(loop_id, ?reason, "loop terminated");
        Ok(())
    }

    async fn sleep_cancellable(&self, seconds: u64, cancel: &mut watch::Receiver<bool>) {
        if seconds == 0 {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
            _ = cancel.changed() => {}
        }
    }
}

enum ExecOutcome {
    Exited { code: Option<i32>, tail: String },
    Interrupted { result: InterruptResult, tail: String },
}

enum IterationOutcome {
    Continue { skip_sleep: bool },
    Stopped(StopReason),
    Killed(StopReason),
}

fn truncate_tail(tail: &str, max_bytes: usize) -> String {
    if tail.len() <= max_bytes {
        return tail.to_string();
    }
    let start = tail.len() - max_bytes;
    let mut boundary = start;
    while boundary < tail.len() && !tail.is_char_boundary(boundary) {
        boundary += 1;
    }
    tail[boundary..].to_string()
}

#[cfg(unix)]
fn kill_process_group(child: &mut tokio::process::Child) -> AppResult<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGINT);
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_child: &mut tokio::process::Child) -> AppResult<()> {
    Ok(())
}
