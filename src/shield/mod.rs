//! Security hooks. The tool-call gates are registered as critical: a crash
//! or timeout denies the tool call instead of letting it through. The PII
//! redactor and the session-start structure check are advisory.

pub mod dependency_sentinel;
pub mod git_hygiene;
pub mod pii_redactor;
pub mod pre_commit_quality;
pub mod root_agent_validator;
pub mod sandbox_guard;

use std::path::Path;
use std::process::{Command, Stdio};

use crate::hooks::utils::{file_name, program_words, split_segments};

/// A `git` invocation found in a command line: subcommand plus its args,
/// with global options such as `-C dir` skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GitInvocation {
    pub subcommand: String,
    pub args: Vec<String>,
}

/// Every git invocation in a (possibly chained) command line.
pub(crate) fn git_invocations(command: &str) -> Vec<GitInvocation> {
    split_segments(command)
        .iter()
        .filter_map(|segment| parse_git(&program_words(segment)))
        .collect()
}

fn parse_git(words: &[String]) -> Option<GitInvocation> {
    let (program, rest) = words.split_first()?;
    if file_name(program) != "git" {
        return None;
    }

    let mut i = 0;
    while i < rest.len() {
        let word = rest[i].as_str();
        if matches!(word, "-C" | "-c" | "--git-dir" | "--work-tree" | "--namespace") {
            i += 2;
        } else if word.starts_with('-') {
            i += 1;
        } else {
            return Some(GitInvocation {
                subcommand: word.to_string(),
                args: rest[i + 1..].to_vec(),
            });
        }
    }
    None
}

/// Stdout of a git command run in `cwd`, or `None` when git is missing, the
/// directory is not a repository, or the command fails.
pub(crate) fn git_output(cwd: &Path, args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
}
