//! Ledger Writer: appends a human-readable markdown record per iteration to
//! `<repo_path>/.forge/ledgers/<slug>.md`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};

use crate::domain::LoopRun;
use crate::error::AppResult;

pub fn ledger_path(repo_path: &str, slug: &str) -> PathBuf {
    Path::new(repo_path).join(".forge").join("ledgers").join(format!("{slug}.md"))
}

/// Append one run's section to the ledger, creating the directory and file
/// as needed. Directories are created mode 0755, idempotently.
pub fn append(repo_path: &str, slug: &str, profile_name: &str, run: &LoopRun) -> AppResult<PathBuf> {
    let path = ledger_path(repo_path, slug);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o755))?;
        }
    }

    let timestamp = Utc
        .timestamp_opt(run.finished_at.unwrap_or(run.started_at), 0)
        .single()
        .unwrap_or_else(Utc::now);

    let mut section = String::new();
    section.push_str(&format!("## Run {} ({})\n\n", run.id, timestamp.to_rfc3339()));
    section.push_str(&format!("- profile: {profile_name}\n"));
    section.push_str(&format!("- status: {}\n", run.status));
    if let Some(code) = run.exit_code {
        section.push_str(&format!("- exit_code: {code}\n"));
    }
    section.push_str("\n```\n");
    section.push_str(&run.output_tail);
    section.push_str("\n```\n\n");

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(section.as_bytes())?;
    Ok(path)
}
