//! forge - CLI entry point (§10.7).
//!
//! Exposes the minimal operator surface needed to drive and observe the
//! core: create loops, push control-queue items, seed profiles/pools/
//! accounts from a YAML config, and run the supervisor. Explicitly not a
//! TUI — that front-end is out of scope for this crate.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use forge::clock::{Clock, SystemClock};
use forge::config;
use forge::domain::{
    Account, Loop, LoopBinding, LoopQueueItem, Pool, Profile, PromptSource, QueueItemKind, QueuePayload,
};
use forge::events::EventBus;
use forge::harness::ShellCommandHarness;
use forge::repo::{
    AccountRepo, LoopQueueRepo, LoopRepo, PoolRepo, ProfileRepo, SqliteAccountRepo, SqliteLoopQueueRepo,
    SqliteLoopRepo, SqliteLoopRunRepo, SqlitePoolRepo, SqliteProfileRepo,
};
use forge::runner::LoopRunner;

#[derive(Parser, Debug)]
#[command(name = "forge", about = "Supervises long-running prompt loops against a local repository")]
struct Cli {
    /// Directory holding the SQLite store, logs, ledgers, and materialized prompts.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// YAML config (profiles/pools/accounts/defaults) to seed at startup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, list, and run loops.
    Loop {
        #[command(subcommand)]
        command: LoopCommand,
    },
    /// Push an operator command onto a loop's control queue.
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Register a harness profile.
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Manage profile pools.
    Pool {
        #[command(subcommand)]
        command: PoolCommand,
    },
    /// Register a credentialed account.
    Account {
        #[command(subcommand)]
        command: AccountCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LoopCommand {
    Create {
        name: String,
        repo_path: String,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        prompt_path: Option<String>,
        #[arg(long, default_value_t = 0)]
        interval_seconds: u64,
        #[arg(long)]
        max_iterations: Option<u32>,
        #[arg(long)]
        max_runtime_seconds: Option<u64>,
        #[arg(long, conflicts_with = "pool")]
        profile: Option<String>,
        #[arg(long, conflicts_with = "profile")]
        pool: Option<String>,
    },
    List,
    Run {
        loop_id: String,
        /// Run exactly one iteration then return (default).
        #[arg(long)]
        once: bool,
        /// Drive iterations continuously until stop/kill/cap/Ctrl-C.
        #[arg(long, conflicts_with = "once")]
        continuous: bool,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    Push {
        loop_id: String,
        #[command(subcommand)]
        kind: QueuePushKind,
    },
}

#[derive(Subcommand, Debug)]
enum QueuePushKind {
    Message {
        text: String,
    },
    PromptOverride {
        prompt: String,
        #[arg(long)]
        is_path: bool,
    },
    Pause {
        duration_seconds: u64,
    },
    Steer {
        message: String,
    },
    Stop {
        #[arg(default_value = "operator requested stop")]
        reason: String,
    },
    Kill {
        #[arg(default_value = "operator requested kill")]
        reason: String,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Add {
        name: String,
        harness_kind: String,
        command_template: String,
        #[arg(long, default_value_t = 0)]
        max_concurrency: u32,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum PoolCommand {
    Create {
        name: String,
        #[arg(long)]
        is_default: bool,
    },
    AddMember {
        pool_name: String,
        profile_name: String,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Add {
        provider: String,
        profile_name: String,
        credential_ref: String,
    },
}

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("forge")
        .join("logs");
    fs::create_dir_all(&log_dir).context("failed to create log directory")?;
    let log_file = fs::File::create(log_dir.join("forge.log")).context("failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
    Ok(())
}

fn resolve_data_dir(cli_dir: Option<PathBuf>, cfg: Option<&config::ForgeConfig>) -> PathBuf {
    if let Some(dir) = cli_dir {
        return dir;
    }
    if let Some(cfg) = cfg {
        return expand_tilde(&cfg.defaults.data_dir);
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".forge")
}

/// Minimal `~`-prefix expansion; full path expansion lives outside the core
/// (§1's out-of-scope "configuration loading and path expansion").
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(rest),
        None => PathBuf::from(path),
    }
}

struct Stores {
    loops: Arc<SqliteLoopRepo>,
    queue: Arc<SqliteLoopQueueRepo>,
    runs: Arc<SqliteLoopRunRepo>,
    profiles: Arc<SqliteProfileRepo>,
    pools: Arc<SqlitePoolRepo>,
    accounts: Arc<SqliteAccountRepo>,
}

fn open_stores(data_dir: &std::path::Path) -> Result<Stores> {
    fs::create_dir_all(data_dir).context("failed to create data directory")?;
    let db_path = data_dir.join("forge.db");
    Ok(Stores {
        loops: Arc::new(SqliteLoopRepo::open(&db_path).context("opening loop store")?),
        queue: Arc::new(SqliteLoopQueueRepo::open(&db_path).context("opening queue store")?),
        runs: Arc::new(SqliteLoopRunRepo::open(&db_path).context("opening run store")?),
        profiles: Arc::new(SqliteProfileRepo::open(&db_path).context("opening profile store")?),
        pools: Arc::new(SqlitePoolRepo::open(&db_path).context("opening pool store")?),
        accounts: Arc::new(SqliteAccountRepo::open(&db_path).context("opening account store")?),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging().context("failed to set up logging")?;

    let cfg = match &cli.config {
        Some(config_path) => Some(config::load(config_path).context("loading config")?),
        None => None,
    };

    let data_dir = resolve_data_dir(cli.data_dir.clone(), cfg.as_ref());
    let stores = open_stores(&data_dir)?;
    let clock = SystemClock;
    let now = clock.now();

    if let Some(cfg) = &cfg {
        config::seed(cfg, stores.profiles.as_ref(), stores.pools.as_ref(), stores.accounts.as_ref(), now)
            .context("seeding config into store")?;
        info!(path = %cli.config.as_ref().unwrap().display(), "config seeded");
    }
    let defaults = cfg.map(|c| c.defaults).unwrap_or_default();

    match cli.command {
        Command::Loop { command } => cmd_loop(command, &stores, &data_dir, &defaults, now).await,
        Command::Queue { command } => cmd_queue(command, &stores, now),
        Command::Profile { command } => cmd_profile(command, &stores, now),
        Command::Pool { command } => cmd_pool(command, &stores, now),
        Command::Account { command } => cmd_account(command, &stores, now),
    }
}

async fn cmd_loop(
    command: LoopCommand,
    stores: &Stores,
    data_dir: &std::path::Path,
    defaults: &config::Defaults,
    now: i64,
) -> Result<()> {
    match command {
        LoopCommand::Create {
            name,
            repo_path,
            prompt,
            prompt_path,
            interval_seconds,
            max_iterations,
            max_runtime_seconds,
            profile,
            pool,
        } => {
            let id = Uuid::now_v7().to_string();
            let short_id = id.chars().take(8).collect::<String>();
            let mut item = Loop::new(id.clone(), short_id, name.clone(), repo_path, now);
            item.prompt = match (prompt, prompt_path) {
                (Some(text), _) => Some(PromptSource::Inline(text)),
                (None, Some(path)) => Some(PromptSource::Path(path)),
                (None, None) => None,
            };
            item.interval_seconds = interval_seconds;
            item.max_iterations = max_iterations;
            item.max_runtime_seconds = max_runtime_seconds;
            item.binding = match (profile, pool) {
                (Some(profile_id), _) => LoopBinding::Pinned(profile_id),
                (None, Some(pool_id)) => LoopBinding::Pool(pool_id),
                (None, None) => LoopBinding::Default,
            };
            stores.loops.create(&item).context("creating loop")?;
            println!("created loop {id} ({name})");
            Ok(())
        }
        LoopCommand::List => {
            for item in stores.loops.list().context("listing loops")? {
                println!("{}\t{}\t{}\t{}", item.id, item.name, item.state, item.repo_path);
            }
            Ok(())
        }
        LoopCommand::Run { loop_id, continuous, .. } => {
            let bus = EventBus::with_default_capacity();
            let harness = Arc::new(ShellCommandHarness);
            let runner = LoopRunner::new(
                stores.loops.clone(),
                stores.queue.clone(),
                stores.runs.clone(),
                stores.profiles.clone(),
                stores.pools.clone(),
                Arc::new(SystemClock),
                bus.emitter(),
                harness,
                data_dir.to_path_buf(),
            )
            .with_interrupt_poll_interval(std::time::Duration::from_secs(defaults.interrupt_poll_interval_seconds))
            .with_default_wait_interval_seconds(defaults.default_wait_interval_seconds);

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = cancel_tx.send(true);
                }
            });

            let reason = if continuous {
                runner.run_continuous(&loop_id, cancel_rx).await
            } else {
                runner.run_once(&loop_id, cancel_rx).await
            }
            .context("running loop")?;
            println!("loop {loop_id} stopped: {reason:?}");
            Ok(())
        }
    }
}

fn cmd_queue(command: QueueCommand, stores: &Stores, now: i64) -> Result<()> {
    let QueueCommand::Push { loop_id, kind } = command;
    let (item_kind, payload) = match kind {
        QueuePushKind::Message { text } => (QueueItemKind::MessageAppend, QueuePayload::Message { text }),
        QueuePushKind::PromptOverride { prompt, is_path } => (
            QueueItemKind::NextPromptOverride,
            QueuePayload::PromptOverride { prompt, is_path },
        ),
        QueuePushKind::Pause { duration_seconds } => {
            (QueueItemKind::Pause, QueuePayload::Pause { duration_seconds })
        }
        QueuePushKind::Steer { message } => (QueueItemKind::SteerMessage, QueuePayload::Steer { message }),
        QueuePushKind::Stop { reason } => (QueueItemKind::StopGraceful, QueuePayload::Stop { reason }),
        QueuePushKind::Kill { reason } => (QueueItemKind::KillNow, QueuePayload::Kill { reason }),
    };
    let id = Uuid::now_v7().to_string();
    let item = LoopQueueItem::new(id.clone(), loop_id, now, item_kind, payload);
    stores.queue.enqueue(&item).context("enqueuing queue item")?;
    println!("enqueued {id}");
    Ok(())
}

fn cmd_profile(command: ProfileCommand, stores: &Stores, now: i64) -> Result<()> {
    match command {
        ProfileCommand::Add { name, harness_kind, command_template, max_concurrency } => {
            let id = Uuid::now_v7().to_string();
            let mut profile = Profile::new(id.clone(), name.clone(), harness_kind, command_template, now);
            profile.max_concurrency = max_concurrency;
            stores.profiles.create(&profile).context("creating profile")?;
            println!("created profile {id} ({name})");
            Ok(())
        }
        ProfileCommand::List => {
            for profile in stores.profiles.list().context("listing profiles")? {
                println!("{}\t{}\t{}", profile.id, profile.name, profile.harness_kind);
            }
            Ok(())
        }
    }
}

fn cmd_pool(command: PoolCommand, stores: &Stores, now: i64) -> Result<()> {
    match command {
        PoolCommand::Create { name, is_default } => {
            let id = Uuid::now_v7().to_string();
            let mut pool = Pool::new(id.clone(), name.clone(), now);
            pool.is_default = is_default;
            stores.pools.create(&pool).context("creating pool")?;
            println!("created pool {id} ({name})");
            Ok(())
        }
        PoolCommand::AddMember { pool_name, profile_name } => {
            let mut pool = stores
                .pools
                .list()
                .context("listing pools")?
                .into_iter()
                .find(|p| p.name == pool_name)
                .ok_or_else(|| eyre::eyre!("no such pool: {pool_name}"))?;
            let profile = stores
                .profiles
                .list()
                .context("listing profiles")?
                .into_iter()
                .find(|p| p.name == profile_name)
                .ok_or_else(|| eyre::eyre!("no such profile: {profile_name}"))?;
            pool.add_member(profile.id);
            stores.pools.update(&pool).context("updating pool")?;
            println!("added {profile_name} to {pool_name}");
            Ok(())
        }
    }
}

fn cmd_account(command: AccountCommand, stores: &Stores, now: i64) -> Result<()> {
    let AccountCommand::Add { provider, profile_name, credential_ref } = command;
    let id = Uuid::now_v7().to_string();
    let account = Account::new(id.clone(), provider, profile_name, credential_ref, now);
    stores.accounts.create(&account).context("creating account")?;
    println!("created account {id}");
    Ok(())
}
