use std::path::Path;
use std::sync::Arc;

use forge_store::{Filter, FilterOp, Store};

use crate::domain::{Account, Loop, LoopQueueItem, LoopRun, Pool, Profile, QueueItemStatus, RunStatus};
use crate::error::{AppError, AppResult};

use super::{AccountRepo, LoopQueueRepo, LoopRepo, LoopRunRepo, PoolRepo, ProfileRepo};

pub struct SqliteLoopRepo {
    store: Arc<Store<Loop>>,
}

impl SqliteLoopRepo {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open(path)?),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open_in_memory()?),
        })
    }
}

impl LoopRepo for SqliteLoopRepo {
    fn create(&self, item: &Loop) -> AppResult<()> {
        Ok(self.store.put(item)?)
    }

    fn get(&self, id: &str) -> AppResult<Option<Loop>> {
        Ok(self.store.get(id)?)
    }

    fn list(&self) -> AppResult<Vec<Loop>> {
        Ok(self.store.list_all()?)
    }

    fn update(&self, item: &Loop) -> AppResult<()> {
        Ok(self.store.put(item)?)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        Ok(self.store.delete(id)?)
    }
}

pub struct SqliteLoopQueueRepo {
    store: Arc<Store<LoopQueueItem>>,
}

impl SqliteLoopQueueRepo {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open(path)?),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open_in_memory()?),
        })
    }
}

impl LoopQueueRepo for SqliteLoopQueueRepo {
    fn enqueue(&self, item: &LoopQueueItem) -> AppResult<()> {
        Ok(self.store.put(item)?)
    }

    fn list(&self, loop_id: &str) -> AppResult<Vec<LoopQueueItem>> {
        let mut items = self.store.list(&[Filter::eq("loop_id", loop_id)])?;
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    fn update_status(&self, item_id: &str, status: QueueItemStatus, error: Option<String>) -> AppResult<()> {
        let mut item = self
            .store
            .get(item_id)?
            .ok_or_else(|| AppError::NotFound(item_id.to_string()))?;
        item.status = status;
        item.error = error;
        Ok(self.store.put(&item)?)
    }

    fn delete(&self, item_id: &str) -> AppResult<()> {
        Ok(self.store.delete(item_id)?)
    }
}

pub struct SqliteLoopRunRepo {
    store: Arc<Store<LoopRun>>,
}

impl SqliteLoopRunRepo {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open(path)?),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open_in_memory()?),
        })
    }
}

impl LoopRunRepo for SqliteLoopRunRepo {
    fn create(&self, run: &LoopRun) -> AppResult<()> {
        Ok(self.store.put(run)?)
    }

    fn finish(
        &self,
        run_id: &str,
        finished_at: i64,
        status: RunStatus,
        exit_code: Option<i32>,
        tail: &str,
    ) -> AppResult<()> {
        let mut run = self
            .store
            .get(run_id)?
            .ok_or_else(|| AppError::NotFound(run_id.to_string()))?;
        run.finish(finished_at, status, exit_code, tail);
        Ok(self.store.put(&run)?)
    }

    fn list_by_loop(&self, loop_id: &str) -> AppResult<Vec<LoopRun>> {
        Ok(self.store.list(&[Filter::eq("loop_id", loop_id)])?)
    }

    fn count_by_loop(&self, loop_id: &str) -> AppResult<usize> {
        Ok(self.store.count(&[Filter::eq("loop_id", loop_id)])?)
    }

    fn count_running_by_profile(&self, profile_id: &str) -> AppResult<usize> {
        Ok(self.store.count(&[
            Filter::eq("profile_id", profile_id),
            Filter::eq("status", "running"),
        ])?)
    }
}

pub struct SqliteProfileRepo {
    store: Arc<Store<Profile>>,
}

impl SqliteProfileRepo {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open(path)?),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open_in_memory()?),
        })
    }
}

impl ProfileRepo for SqliteProfileRepo {
    fn create(&self, profile: &Profile) -> AppResult<()> {
        Ok(self.store.put(profile)?)
    }

    fn get(&self, id: &str) -> AppResult<Option<Profile>> {
        Ok(self.store.get(id)?)
    }

    fn list(&self) -> AppResult<Vec<Profile>> {
        Ok(self.store.list_all()?)
    }

    fn update(&self, profile: &Profile) -> AppResult<()> {
        Ok(self.store.put(profile)?)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        Ok(self.store.delete(id)?)
    }
}

pub struct SqlitePoolRepo {
    store: Arc<Store<Pool>>,
}

impl SqlitePoolRepo {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open(path)?),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open_in_memory()?),
        })
    }
}

impl PoolRepo for SqlitePoolRepo {
    fn create(&self, pool: &Pool) -> AppResult<()> {
        Ok(self.store.put(pool)?)
    }

    fn get(&self, id: &str) -> AppResult<Option<Pool>> {
        Ok(self.store.get(id)?)
    }

    fn list(&self) -> AppResult<Vec<Pool>> {
        Ok(self.store.list_all()?)
    }

    fn update(&self, pool: &Pool) -> AppResult<()> {
        Ok(self.store.put(pool)?)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        Ok(self.store.delete(id)?)
    }
}

pub struct SqliteAccountRepo {
    store: Arc<Store<Account>>,
}

impl SqliteAccountRepo {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open(path)?),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self {
            store: Arc::new(Store::open_in_memory()?),
        })
    }
}

impl AccountRepo for SqliteAccountRepo {
    fn create(&self, account: &Account) -> AppResult<()> {
        Ok(self.store.put(account)?)
    }

    fn get(&self, id: &str) -> AppResult<Option<Account>> {
        Ok(self.store.get(id)?)
    }

    fn list(&self) -> AppResult<Vec<Account>> {
        Ok(self.store.list_all()?)
    }

    fn update(&self, account: &Account) -> AppResult<()> {
        Ok(self.store.put(account)?)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        Ok(self.store.delete(id)?)
    }

    fn list_by_provider(&self, provider: &str) -> AppResult<Vec<Account>> {
        Ok(self.store.list(&[Filter::new("provider", FilterOp::Eq, provider)])?)
    }
}
