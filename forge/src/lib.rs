//! forge - a supervisor for long-running prompt loops.
//!
//! A loop is a durable, named, resumable unit of work: its own prompt,
//! pacing, profile/pool binding, ledger, and queue of operator commands.
//! This crate is the control plane — it spawns, monitors, paces,
//! interrupts, and retires agent iterations, routes operator commands, and
//! persists observable state so a front-end can render a live fleet view.
//!
//! Module map, roughly leaves-first:
//! - [`clock`]: the `Clock` trait so time is parameterized for tests.
//! - [`error`]: the shared `AppError`/`AppResult`.
//! - [`domain`]: persisted entities (`Loop`, `LoopQueueItem`, `LoopRun`,
//!   `Profile`, `Pool`, `Account`) and their `Record` impls.
//! - [`repo`]: repository traits plus the SQLite-backed implementations.
//! - [`events`]: the event bus and its wire-shaped payloads.
//! - [`harness`]: the `BuildExecution` adapter boundary and the shell-command
//!   harness.
//! - [`accounts`]: cooldown, rotation, and credential resolution.
//! - [`selector`]: availability-aware profile/pool selection.
//! - [`planner`]: the pure queue-item-to-`Plan` reduction.
//! - [`prompt`]: base/override prompt resolution and materialization.
//! - [`interrupt`]: mid-iteration steer/kill detection.
//! - [`ledger`]: per-iteration markdown ledger appends.
//! - [`runner`]: the Loop Runner state machine that ties the above together.
//! - [`config`]: YAML config loading and idempotent store seeding.

pub mod accounts;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod harness;
pub mod interrupt;
pub mod ledger;
pub mod planner;
pub mod prompt;
pub mod repo;
pub mod runner;
pub mod selector;

pub use error::{AppError, AppResult};
pub use runner::{LoopRunner, StopReason};
