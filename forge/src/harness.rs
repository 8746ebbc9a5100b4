//! The sole interface the core has to a concrete coding-agent process: a
//! `BuildExecution` hook that turns a profile and a resolved prompt into a
//! spawnable [`ChildSpec`]. `ShellCommandHarness` is the one concrete
//! adapter this crate ships (§1, §6); provider-specific adapters are out of
//! scope.

use std::collections::HashMap;

use crate::domain::Profile;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    None,
    PromptContent,
}

#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: String,
    pub env: HashMap<String, String>,
    pub stdin_source: StdinSource,
}

pub trait BuildExecution: Send + Sync {
    fn build(
        &self,
        repo_path: &str,
        profile: &Profile,
        prompt_path: Option<&str>,
        prompt_content: &str,
    ) -> AppResult<ChildSpec>;
}

/// Substitutes `{{prompt_path}}` / `{{prompt_content}}` into the profile's
/// command template via simple string replacement (not a templating engine
/// — see the crate's notes on why Handlebars is overkill here) and runs the
/// result through `/bin/sh -c`.
pub struct ShellCommandHarness;

impl BuildExecution for ShellCommandHarness {
    fn build(
        &self,
        repo_path: &str,
        profile: &Profile,
        prompt_path: Option<&str>,
        prompt_content: &str,
    ) -> AppResult<ChildSpec> {
        let mut rendered = profile.command_template.clone();
        rendered = rendered.replace("{{prompt_path}}", prompt_path.unwrap_or_default());
        rendered = rendered.replace("{{prompt_content}}", prompt_content);

        let stdin_source = if prompt_path.is_none() {
            StdinSource::PromptContent
        } else {
            StdinSource::None
        };

        Ok(ChildSpec {
            command: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), rendered],
            working_dir: repo_path.to_string(),
            env: profile.env_overrides.clone(),
            stdin_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(template: &str) -> Profile {
        Profile::new("p1".into(), "p1".into(), "shell".into(), template.into(), 0)
    }

    #[test]
    fn substitutes_prompt_path_placeholder() {
        let harness = ShellCommandHarness;
        let spec = harness
            .build("/repo", &profile("agent --file {{prompt_path}}"), Some("/tmp/p.md"), "")
            .unwrap();
        assert_eq!(spec.args[1], "agent --file /tmp/p.md");
        assert_eq!(spec.stdin_source, StdinSource::None);
    }

    #[test]
    fn substitutes_prompt_content_and_uses_stdin_when_no_path() {
        let harness = ShellCommandHarness;
        let spec = harness
            .build("/repo", &profile("agent --text '{{prompt_content}}'"), None, "hello")
            .unwrap();
        assert_eq!(spec.args[1], "agent --text 'hello'");
        assert_eq!(spec.stdin_source, StdinSource::PromptContent);
    }

    #[test]
    fn carries_working_dir_and_env() {
        let harness = ShellCommandHarness;
        let mut p = profile("agent");
        p.env_overrides.insert("FOO".into(), "bar".into());
        let spec = harness.build("/repo", &p, None, "").unwrap();
        assert_eq!(spec.working_dir, "/repo");
        assert_eq!(spec.env.get("FOO"), Some(&"bar".to_string()));
    }
}
