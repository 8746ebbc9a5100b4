//! Repository traits the core consumes as abstract capability sets, plus
//! one concrete SQLite-backed implementation of each (§10.4).

mod sqlite;

use crate::domain::{Account, Loop, LoopQueueItem, LoopRun, Pool, Profile, QueueItemStatus};
use crate::error::AppError;

pub use sqlite::{
    SqliteAccountRepo, SqliteLoopQueueRepo, SqliteLoopRepo, SqliteLoopRunRepo, SqlitePoolRepo, SqliteProfileRepo,
};

pub trait LoopRepo: Send + Sync {
    fn create(&self, item: &Loop) -> Result<(), AppError>;
    fn get(&self, id: &str) -> Result<Option<Loop>, AppError>;
    fn list(&self) -> Result<Vec<Loop>, AppError>;
    fn update(&self, item: &Loop) -> Result<(), AppError>;
    fn delete(&self, id: &str) -> Result<(), AppError>;
}

pub trait LoopQueueRepo: Send + Sync {
    fn enqueue(&self, item: &LoopQueueItem) -> Result<(), AppError>;
    fn list(&self, loop_id: &str) -> Result<Vec<LoopQueueItem>, AppError>;
    fn update_status(&self, item_id: &str, status: QueueItemStatus, error: Option<String>) -> Result<(), AppError>;
    fn delete(&self, item_id: &str) -> Result<(), AppError>;
}

pub trait LoopRunRepo: Send + Sync {
    fn create(&self, run: &LoopRun) -> Result<(), AppError>;
    fn finish(
        &self,
        run_id: &str,
        finished_at: i64,
        status: crate::domain::RunStatus,
        exit_code: Option<i32>,
        tail: &str,
    ) -> Result<(), AppError>;
    fn list_by_loop(&self, loop_id: &str) -> Result<Vec<LoopRun>, AppError>;
    fn count_by_loop(&self, loop_id: &str) -> Result<usize, AppError>;
    fn count_running_by_profile(&self, profile_id: &str) -> Result<usize, AppError>;
}

pub trait ProfileRepo: Send + Sync {
    fn create(&self, profile: &Profile) -> Result<(), AppError>;
    fn get(&self, id: &str) -> Result<Option<Profile>, AppError>;
    fn list(&self) -> Result<Vec<Profile>, AppError>;
    fn update(&self, profile: &Profile) -> Result<(), AppError>;
    fn delete(&self, id: &str) -> Result<(), AppError>;
}

pub trait PoolRepo: Send + Sync {
    fn create(&self, pool: &Pool) -> Result<(), AppError>;
    fn get(&self, id: &str) -> Result<Option<Pool>, AppError>;
    fn list(&self) -> Result<Vec<Pool>, AppError>;
    fn update(&self, pool: &Pool) -> Result<(), AppError>;
    fn delete(&self, id: &str) -> Result<(), AppError>;
}

pub trait AccountRepo: Send + Sync {
    fn create(&self, account: &Account) -> Result<(), AppError>;
    fn get(&self, id: &str) -> Result<Option<Account>, AppError>;
    fn list(&self) -> Result<Vec<Account>, AppError>;
    fn update(&self, account: &Account) -> Result<(), AppError>;
    fn delete(&self, id: &str) -> Result<(), AppError>;
    fn list_by_provider(&self, provider: &str) -> Result<Vec<Account>, AppError>;
}
