//! Account Cooldown & Rotation (§4.4): credential account selection, rate
//! limit backoff, and rotation under contention.

use std::env;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::Account;
use crate::error::{AppError, AppResult};
use crate::events::{EventEmitter, EventPayload};
use crate::repo::AccountRepo;

pub struct AccountService<'a> {
    pub accounts: &'a dyn AccountRepo,
    pub clock: &'a dyn Clock,
    pub events: EventEmitter,
}

impl<'a> AccountService<'a> {
    /// Available account for `provider`, tie-broken alphabetically by
    /// profile name.
    pub fn get_next_available(&self, provider: &str) -> AppResult<Option<Account>> {
        let now = self.clock.now();
        let mut candidates: Vec<Account> = self
            .accounts
            .list_by_provider(provider)?
            .into_iter()
            .filter(|a| a.is_available(now))
            .collect();
        candidates.sort_by(|a, b| a.profile_name.cmp(&b.profile_name));
        Ok(candidates.into_iter().next())
    }

    pub fn set_cooldown(&self, id: &str, duration_seconds: i64) -> AppResult<Account> {
        let mut account = self.accounts.get(id)?.ok_or_else(|| AppError::NotFound(id.to_string()))?;
        let now = self.clock.now();
        let until = now + duration_seconds;
        account.cooldown_until = Some(until);
        account.rate_limit_count += 1;
        account.updated_at = now;
        self.accounts.update(&account)?;
        self.events.emit(
            EventPayload::AccountRateLimitDetected {
                account_id: account.id.clone(),
                cooldown_until: until,
            },
            now,
        );
        info!(account_id = %account.id, until, "account cooldown set");
        Ok(account)
    }

    /// Rotate away from `current_id` to another available account of the
    /// same provider, publishing exactly one `account.rotated` event.
    pub fn rotate_for_agent(&self, current_id: &str, agent_id: &str, reason: &str) -> AppResult<Account> {
        let current = self
            .accounts
            .get(current_id)?
            .ok_or_else(|| AppError::NotFound(current_id.to_string()))?;
        let now = self.clock.now();
        let target = self
            .accounts
            .list_by_provider(&current.provider)?
            .into_iter()
            .filter(|a| a.id != current.id && a.is_available(now))
            .min_by(|a, b| a.profile_name.cmp(&b.profile_name))
            .ok_or_else(|| AppError::Validation(format!("no available account to rotate to for provider {}", current.provider)))?;

        self.events.emit(
            EventPayload::AccountRotated {
                agent_id: agent_id.to_string(),
                old_id: current.id.clone(),
                new_id: target.id.clone(),
                reason: reason.to_string(),
            },
            now,
        );
        debug!(old_id = %current.id, new_id = %target.id, "account rotated");
        Ok(target)
    }

    /// Clear every expired cooldown; returns the count cleared. Idempotent:
    /// calling twice with no intervening clock change clears nothing the
    /// second time.
    pub fn sweep_expired(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut cleared = 0;
        for mut account in self.accounts.list()? {
            if let Some(until) = account.cooldown_until {
                if until <= now {
                    account.cooldown_until = None;
                    account.updated_at = now;
                    self.accounts.update(&account)?;
                    self.events.emit(
                        EventPayload::AccountCooldownEnded {
                            account_id: account.id.clone(),
                        },
                        now,
                    );
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }
}

/// Resolve a credential reference string: `env:VAR` / `$VAR` / `${VAR}` read
/// the environment; `file:PATH` reads and trims a file; anything else is
/// taken literally.
pub fn resolve_credential(reference: &str) -> AppResult<String> {
    if let Some(var) = reference.strip_prefix("env:") {
        return read_env(var);
    }
    if let Some(var) = reference.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        return read_env(var);
    }
    if let Some(var) = reference.strip_prefix('$') {
        return read_env(var);
    }
    if let Some(path) = reference.strip_prefix("file:") {
        let contents = std::fs::read_to_string(path)?;
        return Ok(contents.trim_end().to_string());
    }
    Ok(reference.to_string())
}

fn read_env(var: &str) -> AppResult<String> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Validation(format!("credential env var {var} is unset or empty"))),
    }
}
