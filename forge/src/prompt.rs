//! Prompt Resolver (§4.5): base prompt resolution order, operator-message
//! appendix, and path materialization for `prompt_mode = path` profiles.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};

use crate::domain::{Loop, PromptSource, PromptSourceKind};
use crate::error::{AppError, AppResult};
use crate::planner::PlannedMessage;

pub struct ResolvedPrompt {
    pub content: String,
    pub source: PromptSourceKind,
    pub is_override: bool,
    /// True when the base prompt (no override in play) came from the
    /// loop's inline `prompt` field rather than a file on disk.
    pub base_was_inline: bool,
    /// The on-disk path the base content was read from, when it came from
    /// a file. `None` for inline bases and for overrides.
    pub existing_path: Option<PathBuf>,
}

/// Resolve the base prompt per the fixed order: inline message, explicit
/// file path, `PROMPT.md`, `.forge/prompts/default.md`, else error.
pub fn resolve_base(loop_def: &Loop) -> AppResult<String> {
    Ok(resolve_base_with_path(loop_def)?.0)
}

/// Same resolution order as [`resolve_base`], but also returns the file
/// path the content was read from (`None` for the inline case) so callers
/// can reuse that path instead of re-materializing identical content.
fn resolve_base_with_path(loop_def: &Loop) -> AppResult<(String, Option<PathBuf>)> {
    match &loop_def.prompt {
        Some(PromptSource::Inline(text)) if !text.trim().is_empty() => Ok((text.clone(), None)),
        Some(PromptSource::Path(path)) => {
            let full = repo_relative_path(&loop_def.repo_path, path);
            let content = fs::read_to_string(&full)?;
            Ok((content, Some(full)))
        }
        _ => {
            let repo = Path::new(&loop_def.repo_path);
            let prompt_md = repo.join("PROMPT.md");
            if prompt_md.exists() {
                let content = fs::read_to_string(&prompt_md)?;
                return Ok((content, Some(prompt_md)));
            }
            let default_md = repo.join(".forge/prompts/default.md");
            if default_md.exists() {
                let content = fs::read_to_string(&default_md)?;
                return Ok((content, Some(default_md)));
            }
            Err(AppError::Validation(format!(
                "no prompt source resolved for loop {}",
                loop_def.id
            )))
        }
    }
}

fn repo_relative_path(repo_path: &str, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        Path::new(repo_path).join(candidate)
    }
}

fn read_repo_relative(repo_path: &str, path: &str) -> AppResult<String> {
    Ok(fs::read_to_string(repo_relative_path(repo_path, path))?)
}

/// Resolve the full iteration prompt: base (or override if the plan
/// supplied one) plus an appendix section per queued operator message.
pub fn resolve(
    loop_def: &Loop,
    override_prompt: Option<&(String, bool)>,
    messages: &[PlannedMessage],
) -> AppResult<ResolvedPrompt> {
    let (mut content, source, is_override, base_was_inline, existing_path) = match override_prompt {
        Some((prompt, is_path)) => {
            let resolved = if *is_path {
                read_repo_relative(&loop_def.repo_path, prompt)?
            } else {
                prompt.clone()
            };
            (resolved, PromptSourceKind::Override, true, false, None)
        }
        None => {
            let (base_content, path) = resolve_base_with_path(loop_def)?;
            let base_was_inline = path.is_none();
            (base_content, PromptSourceKind::Base, false, base_was_inline, path)
        }
    };

    content = content.trim_end_matches('\n').to_string();
    for message in messages {
        let timestamp = Utc
            .timestamp_opt(message.created_at, 0)
            .single()
            .unwrap_or_else(Utc::now);
        content.push_str(&format!(
            "\n\n## Operator Message ({})\n\n{}",
            timestamp.to_rfc3339(),
            message.text.trim()
        ));
    }

    Ok(ResolvedPrompt {
        content,
        source,
        is_override,
        base_was_inline,
        existing_path,
    })
}

/// Write the materialized prompt to `<data_dir>/prompts/<loop_id>/run-<run_id>.md`
/// (0644) and return its path. Only called when the profile's prompt mode
/// is `path` and the content isn't already a bare file the harness can read.
pub fn materialize(data_dir: &Path, loop_id: &str, run_id: &str, content: &str) -> AppResult<PathBuf> {
    let dir = data_dir.join("prompts").join(loop_id);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("run-{run_id}.md"));
    fs::write(&path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
    }
    Ok(path)
}
