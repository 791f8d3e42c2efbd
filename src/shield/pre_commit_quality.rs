//! Inspects the staged file set before `git commit` runs.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{git_invocations, git_output};
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{file_name, static_regex};

/// Output-only directory: generated reports never belong in history.
const OUTPUT_DIR: &str = "claudedocs/";

const SECRET_FILE_PATTERN: &str =
    r"^(\.env|\.env\..+|credentials\.json|secrets\.json|.+\.pem|.+\.key|id_rsa.*)$";
const ABSOLUTE_HOME_PATTERN: &str = r"(/home/[A-Za-z0-9._-]+/|/Users/[A-Za-z0-9._-]+/|[A-Za-z]:\\Users\\)";

static SECRET_FILE_RE: OnceLock<Regex> = OnceLock::new();
static ABSOLUTE_HOME_RE: OnceLock<Regex> = OnceLock::new();

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    if input.tool_name() != Some("Bash") {
        return Ok(PolicyDecision::allow());
    }
    let Some(command) = input.command() else {
        return Ok(PolicyDecision::allow());
    };
    if !git_invocations(command).iter().any(|g| g.subcommand == "commit") {
        return Ok(PolicyDecision::allow());
    }

    let project_root = config.project_root_for(input);
    let Some(listing) = git_output(&project_root, &["diff", "--cached", "--name-only"]) else {
        tracing::debug!(root = %project_root.display(), "no staged file list; skipping");
        return Ok(PolicyDecision::allow());
    };
    let staged: Vec<&str> = listing.lines().filter(|l| !l.trim().is_empty()).collect();
    Ok(check_staged(&project_root, &staged))
}

/// Verdict for a staged file list, relative to `project_root`.
pub fn check_staged(project_root: &Path, staged: &[&str]) -> PolicyDecision {
    let secret_re = static_regex(&SECRET_FILE_RE, SECRET_FILE_PATTERN);
    let secrets: Vec<&str> = staged
        .iter()
        .copied()
        .filter(|p| {
            let name = file_name(p);
            !name.ends_with(".example") && secret_re.is_match(name)
        })
        .collect();
    let outputs: Vec<&str> = staged
        .iter()
        .copied()
        .filter(|p| p.starts_with(OUTPUT_DIR) || p.contains(&format!("/{}", OUTPUT_DIR)))
        .collect();

    if !secrets.is_empty() || !outputs.is_empty() {
        let mut problems = Vec::new();
        if !secrets.is_empty() {
            problems.push(format!("secret files staged: {}", secrets.join(", ")));
        }
        if !outputs.is_empty() {
            problems.push(format!(
                "generated claudedocs/ output staged: {}",
                outputs.join(", ")
            ));
        }
        return PolicyDecision::deny(format!(
            "Pre-commit check failed: {}. Unstage these files (git restore --staged <file>) before committing.",
            problems.join("; ")
        ));
    }

    let mut warnings = Vec::new();
    let home_re = static_regex(&ABSOLUTE_HOME_RE, ABSOLUTE_HOME_PATTERN);
    for path in staged {
        let Ok(content) = fs::read_to_string(project_root.join(path)) else {
            continue;
        };
        if file_name(path) == "SKILL.md" && !content.contains("Version History") {
            warnings.push(format!(
                "Pre-commit: {} has no `Version History` section; record the change there",
                path
            ));
        }
        let in_memory = path.starts_with("memory/") || path.contains("/memory/");
        if in_memory && home_re.is_match(&content) {
            warnings.push(format!(
                "Pre-commit: {} contains an absolute path; memory files must use project-relative paths",
                path
            ));
        }
    }
    PolicyDecision::warn_if_any(&warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;
    use crate::shield::test_support::{init_repo, stage_file};
    use serde_json::json;
    use tempfile::TempDir;

    fn commit_in(dir: &Path) -> PolicyDecision {
        let config = Config::new("/plugin", dir);
        let input = HookInput::parse(
            &json!({
                "tool_name": "Bash",
                "tool_input": {"command": "git commit -m \"feat: add feature\""},
                "cwd": dir,
            })
            .to_string(),
        )
        .unwrap();
        handle(&config, &input).unwrap()
    }

    fn check(files: &[(&str, &str)]) -> PolicyDecision {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let names: Vec<&str> = files.iter().map(|(p, _)| *p).collect();
        check_staged(dir.path(), &names)
    }

    #[test]
    fn safe_files_allowed() {
        assert_eq!(check(&[("src/app.py", "print('hello')")]), PolicyDecision::allow());
        assert_eq!(check(&[]), PolicyDecision::allow());
    }

    #[test]
    fn secret_files_denied() {
        for name in [".env", ".env.local", "credentials.json", "secrets.json", "cert.pem", "server.key", "id_rsa", "config/.env"] {
            let d = check(&[(name, "x")]);
            assert!(d.is_deny(), "{}", name);
            let reason = d.reason.unwrap();
            assert!(reason.contains("Pre-commit"));
            assert!(reason.contains(name));
        }
        assert!(!check(&[(".env.example", "X=")]).is_deny());
    }

    #[test]
    fn claudedocs_denied() {
        let d = check(&[("claudedocs/analysis.md", "# Analysis Output")]);
        assert!(d.is_deny());
        assert!(d.reason.unwrap().contains("claudedocs"));
    }

    #[test]
    fn skill_without_version_history_warns() {
        let d = check(&[("skills/test-skill/SKILL.md", "# Test Skill\nSome content.")]);
        assert_eq!(d.decision, Decision::Warn);
        assert!(d.additional_context.unwrap().contains("Version History"));

        let d = check(&[(
            "skills/test-skill/SKILL.md",
            "# Test Skill\nSome content.\n\n## Version History\n- v1.0.0: Initial",
        )]);
        assert_eq!(d, PolicyDecision::allow());
    }

    #[test]
    fn memory_absolute_paths_warn() {
        let d = check(&[(
            "memory/projects/test/project_overview.md",
            "# Project\nFiles at /home/user/project/src\n",
        )]);
        assert_eq!(d.decision, Decision::Warn);
        assert!(d.additional_context.unwrap().contains("absolute path"));

        let d = check(&[("memory/projects/test/project_overview.md", "# Project\nFiles at src/main.py\n")]);
        assert_eq!(d, PolicyDecision::allow());
    }

    #[test]
    fn non_commit_commands_ignored() {
        let config = Config::new("/plugin", "/project");
        for cmd in ["git push origin develop", "git status", "echo hello"] {
            let input = HookInput::parse(
                &json!({"tool_name": "Bash", "tool_input": {"command": cmd}}).to_string(),
            )
            .unwrap();
            assert_eq!(handle(&config, &input).unwrap(), PolicyDecision::allow());
        }
    }

    #[test]
    fn outside_repository_allows() {
        let dir = TempDir::new().unwrap();
        assert_eq!(commit_in(dir.path()), PolicyDecision::allow());
    }

    #[test]
    fn staged_env_in_repository_denied() {
        let dir = TempDir::new().unwrap();
        if !init_repo(dir.path()) {
            return;
        }
        assert_eq!(commit_in(dir.path()), PolicyDecision::allow());
        stage_file(dir.path(), ".env", "SECRET_KEY=abc123");
        let d = commit_in(dir.path());
        assert!(d.is_deny());
        assert!(d.reason.unwrap().contains(".env"));
    }
}
