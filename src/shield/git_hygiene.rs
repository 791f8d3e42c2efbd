//! Source control guard: no force pushes, no direct pushes to protected
//! branches, no skipped hooks, conventional commit subjects, and no secrets
//! in the staged diff.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{GitInvocation, git_invocations, git_output};
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::static_regex;

const STAGED_SECRET_PATTERN: &str = r"\b(AKIA|ASIA)[0-9A-Z]{16}\b|\bgh[pousr]_[A-Za-z0-9]{36,}|\bgithub_pat_[A-Za-z0-9_]{22,}|-----BEGIN ([A-Z]+ )?PRIVATE KEY-----";
static STAGED_SECRET_RE: OnceLock<Regex> = OnceLock::new();

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    if input.tool_name() != Some("Bash") {
        return Ok(PolicyDecision::allow());
    }
    let Some(command) = input.command() else {
        return Ok(PolicyDecision::allow());
    };

    let project_root = config.project_root_for(input);
    for git in git_invocations(command) {
        let verdict = match git.subcommand.as_str() {
            "push" => check_push(&git, &config.protected_branches),
            "commit" => check_commit(&git, &config.commit_pattern)
                .or_else(|| scan_staged_diff(&project_root)),
            _ => None,
        };
        if let Some(decision) = verdict {
            return Ok(decision);
        }
    }
    Ok(PolicyDecision::allow())
}

fn check_push(git: &GitInvocation, protected: &[String]) -> Option<PolicyDecision> {
    let is_force = |arg: &str| {
        arg == "--force"
            || arg.starts_with("--force-with-lease")
            || arg == "--force-if-includes"
            || (arg.starts_with('-') && !arg.starts_with("--") && arg.contains('f'))
    };
    if let Some(flag) = git.args.iter().find(|a| is_force(a)) {
        return Some(PolicyDecision::deny(format!(
            "Git hygiene: force push (`{}`) rewrites shared history and is blocked",
            flag
        )));
    }

    // First positional is the remote, the rest are refspecs.
    let refspecs = git.args.iter().filter(|a| !a.starts_with('-')).skip(1);
    for spec in refspecs {
        if let Some(stripped) = spec.strip_prefix('+') {
            return Some(PolicyDecision::deny(format!(
                "Git hygiene: forced refspec `+{}` is a force push and is blocked",
                stripped
            )));
        }
        let target = spec.rsplit(':').next().unwrap_or(spec);
        let target = target.strip_prefix("refs/heads/").unwrap_or(target);
        if protected.iter().any(|b| b == target) {
            return Some(PolicyDecision::deny(format!(
                "Git hygiene: direct push to protected branch `{}` is blocked; push a feature branch and open a pull request",
                target
            )));
        }
    }
    None
}

fn check_commit(git: &GitInvocation, pattern: &Regex) -> Option<PolicyDecision> {
    if git.args.iter().any(|a| a == "--no-verify" || a == "-n") {
        return Some(PolicyDecision::deny(
            "Git hygiene: `--no-verify` skips the repository's commit hooks and is blocked",
        ));
    }

    let subject = commit_message(&git.args)?.lines().next()?.trim().to_string();
    if pattern.is_match(&subject) {
        None
    } else {
        Some(PolicyDecision::deny(format!(
            "Git hygiene: commit subject `{}` does not follow the conventional commit format (e.g. `feat(scope): description`)",
            subject
        )))
    }
}

/// The `-m`/`--message` value, if the message is given inline.
fn commit_message(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let short_cluster = arg.starts_with('-') && !arg.starts_with("--");
        // `-m msg`, `-am msg`, `--message msg`
        if arg == "--message" || (short_cluster && arg.ends_with('m')) {
            return iter.next().map(String::as_str);
        }
        if let Some(inline) = arg.strip_prefix("--message=") {
            return Some(inline);
        }
        if let Some(inline) = arg.strip_prefix("-m").filter(|s| !s.is_empty()) {
            return Some(inline);
        }
    }
    None
}

fn scan_staged_diff(project_root: &Path) -> Option<PolicyDecision> {
    let diff = git_output(project_root, &["diff", "--cached", "--no-color", "-U0"])?;
    let re = static_regex(&STAGED_SECRET_RE, STAGED_SECRET_PATTERN);
    let hit = diff
        .lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .find_map(|l| re.find(l))?;

    let shown: String = hit.as_str().chars().take(8).collect();
    Some(PolicyDecision::deny(format!(
        "Git hygiene: staged changes contain a secret (`{}…`); remove it from the index before committing",
        shown
    )))
}
