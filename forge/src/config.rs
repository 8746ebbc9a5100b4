//! Minimal YAML configuration (§10.5): the set of Profiles, Pools, and
//! Accounts to seed into the store at startup, plus global defaults. Loop
//! definitions are not part of static config — they're created at runtime
//! via the CLI/repository, since they're the system's mutable, operator-
//! driven entities.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{Account, Pool, Profile, PromptMode};
use crate::error::{AppError, AppResult};
use crate::repo::{AccountRepo, PoolRepo, ProfileRepo};

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_poll_interval")]
    pub interrupt_poll_interval_seconds: u64,
    #[serde(default = "default_wait_interval")]
    pub default_wait_interval_seconds: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_poll_interval() -> u64 {
    1
}

fn default_wait_interval() -> u64 {
    60
}

fn default_data_dir() -> String {
    "~/.forge".to_string()
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            interrupt_poll_interval_seconds: default_poll_interval(),
            default_wait_interval_seconds: default_wait_interval(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub harness_kind: String,
    #[serde(default)]
    pub prompt_mode: PromptModeConfig,
    pub command_template: String,
    #[serde(default)]
    pub env_overrides: HashMap<String, String>,
    #[serde(default)]
    pub max_concurrency: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptModeConfig {
    #[default]
    Path,
    Env,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub provider: String,
    pub profile_name: String,
    pub credential_ref: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ForgeConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

pub fn load(path: impl AsRef<Path>) -> AppResult<ForgeConfig> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| AppError::Validation(format!("invalid config: {e}")))
}

/// Seed profiles/pools/accounts into the store. Idempotent by name: an
/// existing record with the same name is left untouched rather than
/// duplicated, so re-running `forge` against the same config is safe.
pub fn seed(
    config: &ForgeConfig,
    profiles: &dyn ProfileRepo,
    pools: &dyn PoolRepo,
    accounts: &dyn AccountRepo,
    now: i64,
) -> AppResult<()> {
    let mut name_to_id: HashMap<String, String> = profiles
        .list()?
        .into_iter()
        .map(|p| (p.name.clone(), p.id))
        .collect();

    for profile_cfg in &config.profiles {
        if name_to_id.contains_key(&profile_cfg.name) {
            continue;
        }
        let id = Uuid::now_v7().to_string();
        let mut profile = Profile::new(
            id.clone(),
            profile_cfg.name.clone(),
            profile_cfg.harness_kind.clone(),
            profile_cfg.command_template.clone(),
            now,
        );
        profile.prompt_mode = match profile_cfg.prompt_mode {
            PromptModeConfig::Path => PromptMode::Path,
            PromptModeConfig::Env => PromptMode::Env,
        };
        profile.env_overrides = profile_cfg.env_overrides.clone();
        profile.max_concurrency = profile_cfg.max_concurrency;
        profiles.create(&profile)?;
        name_to_id.insert(profile_cfg.name.clone(), id);
    }

    let existing_pool_names: Vec<String> = pools.list()?.into_iter().map(|p| p.name).collect();
    for pool_cfg in &config.pools {
        if existing_pool_names.contains(&pool_cfg.name) {
            continue;
        }
        let mut pool = Pool::new(Uuid::now_v7().to_string(), pool_cfg.name.clone(), now);
        pool.is_default = pool_cfg.is_default;
        for member_name in &pool_cfg.members {
            let profile_id = name_to_id
                .get(member_name)
                .ok_or_else(|| AppError::Validation(format!("pool {} references unknown profile {member_name}", pool_cfg.name)))?;
            pool.add_member(profile_id.clone());
        }
        pools.create(&pool)?;
    }

    let existing_accounts: Vec<(String, String)> = accounts
        .list()?
        .into_iter()
        .map(|a| (a.provider, a.profile_name))
        .collect();
    for account_cfg in &config.accounts {
        let key = (account_cfg.provider.clone(), account_cfg.profile_name.clone());
        if existing_accounts.contains(&key) {
            continue;
        }
        let account = Account::new(
            Uuid::now_v7().to_string(),
            account_cfg.provider.clone(),
            account_cfg.profile_name.clone(),
            account_cfg.credential_ref.clone(),
            now,
        );
        accounts.create(&account)?;
    }

    Ok(())
}
