//! Entities that make up the supervision data model: [`Loop`], its queued
//! operator commands, its executed [`LoopRun`]s, and the [`Profile`]/[`Pool`]/
//! [`Account`] bindings that select what runs them.

mod account;
mod loop_def;
mod pool;
mod profile;
mod queue_item;
mod run;

pub use account::Account;
pub use loop_def::{Loop, LoopBinding, LoopMetadata, LoopState, PromptSource};
pub use pool::{Pool, PoolMember};
pub use profile::{Profile, PromptMode};
pub use queue_item::{QueueItemKind, QueueItemStatus, QueuePayload, LoopQueueItem};
pub use run::{LoopRun, PromptSourceKind, RunStatus};

pub use forge_store::{Filter, FilterOp, IndexValue, Record};
