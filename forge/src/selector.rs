//! Profile/Pool Selector (§4.3): availability-aware pinned lookup, or
//! round-robin scan over a pool with persisted `last_index`.

use tracing::debug;

use crate::clock::Clock;
use crate::domain::{LoopBinding, Profile};
use crate::error::{AppError, AppResult};
use crate::repo::{LoopRunRepo, PoolRepo, ProfileRepo};

#[derive(Debug, Clone)]
pub enum SelectionOutcome {
    Selected(Profile),
    Unavailable { wait_until: i64 },
}

pub struct Selector<'a> {
    pub profiles: &'a dyn ProfileRepo,
    pub pools: &'a dyn PoolRepo,
    pub runs: &'a dyn LoopRunRepo,
    pub clock: &'a dyn Clock,
    pub default_wait_interval_seconds: u64,
}

impl<'a> Selector<'a> {
    fn running_count(&self, profile_id: &str) -> AppResult<u32> {
        Ok(self.runs.count_running_by_profile(profile_id)? as u32)
    }

    /// Select a profile for `binding`. Returns a hard error for a pinned
    /// profile that is over capacity or on cooldown — the core never waits
    /// on a single profile that may stay unavailable indefinitely.
    pub fn select(&self, binding: &LoopBinding) -> AppResult<SelectionOutcome> {
        match binding {
            LoopBinding::Pinned(profile_id) => self.select_pinned(profile_id),
            LoopBinding::Pool(pool_id) => self.select_from_pool(pool_id),
            LoopBinding::Default => {
                let pool = self
                    .pools
                    .list()?
                    .into_iter()
                    .find(|p| p.is_default)
                    .ok_or_else(|| AppError::Validation("no default pool configured".to_string()))?;
                self.select_from_pool(&pool.id)
            }
        }
    }

    fn select_pinned(&self, profile_id: &str) -> AppResult<SelectionOutcome> {
        let profile = self
            .profiles
            .get(profile_id)?
            .ok_or_else(|| AppError::NotFound(profile_id.to_string()))?;
        let now = self.clock.now();
        let running = self.running_count(&profile.id)?;
        if profile.is_available(now, running) {
            Ok(SelectionOutcome::Selected(profile))
        } else {
            Err(AppError::PinnedProfileUnavailable(profile.name))
        }
    }

    fn select_from_pool(&self, pool_id: &str) -> AppResult<SelectionOutcome> {
        let mut pool = self.pools.get(pool_id)?.ok_or_else(|| AppError::NotFound(pool_id.to_string()))?;
        let members = pool.ordered_members();
        if members.is_empty() {
            return Err(AppError::Validation(format!("pool {pool_id} has no members")));
        }
        let n = members.len();
        let now = self.clock.now();
        let start = ((pool.last_index + 1).rem_euclid(n as i64)) as usize;

        let mut earliest_cooldown: Option<i64> = None;
        let mut selected: Option<(usize, Profile)> = None;

        for step in 0..n {
            let idx = (start + step) % n;
            let profile_id = &members[idx].profile_id;
            let Some(profile) = self.profiles.get(profile_id)? else {
                continue;
            };
            let running = self.running_count(&profile.id)?;
            if profile.is_available(now, running) {
                selected = Some((idx, profile));
                break;
            }
            if let Some(until) = profile.cooldown_until {
                earliest_cooldown = Some(earliest_cooldown.map_or(until, |e: i64| e.min(until)));
            }
        }

        match selected {
            Some((idx, profile)) => {
                pool.last_index = idx as i64;
                self.pools.update(&pool)?;
                debug!(pool_id, profile_id = %profile.id, idx, "selected pool member");
                Ok(SelectionOutcome::Selected(profile))
            }
            None => {
                let wait_until = earliest_cooldown.unwrap_or(now + self.default_wait_interval_seconds as i64);
                Ok(SelectionOutcome::Unavailable { wait_until })
            }
        }
    }
}
