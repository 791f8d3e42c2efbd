//! End-of-session sweep: every memory file the session touched is pruned
//! back to its line limit. Touched means mentioned in the transcript or
//! modified under a `memory/` tree within the last two hours.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use regex::Regex;

use super::memory_file::is_managed;
use super::pruning::prune_file;
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{read_transcript, static_regex, today};

const MEMORY_PATH_PATTERN: &str = r"[A-Za-z0-9_./~-]*memory/[A-Za-z0-9_./-]+\.md";
static MEMORY_PATH_RE: OnceLock<Regex> = OnceLock::new();

pub const RECENT_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);

/// Distinct memory paths mentioned in a transcript, in sorted order.
pub fn mentioned_memory_paths(transcript: &str) -> BTreeSet<String> {
    static_regex(&MEMORY_PATH_RE, MEMORY_PATH_PATTERN)
        .find_iter(transcript)
        .map(|m| m.as_str().to_string())
        .filter(|p| is_managed(p))
        .collect()
}

/// Managed memory files under `memory_dir` whose mtime falls inside
/// `window`. A missing directory yields nothing.
pub fn recently_modified(memory_dir: &Path, window: Duration) -> io::Result<Vec<PathBuf>> {
    let cutoff = SystemTime::now().checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut found = Vec::new();
    let mut pending = vec![memory_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                pending.push(path);
            } else if meta.modified()? >= cutoff && is_managed(&path.to_string_lossy()) {
                found.push(path);
            }
        }
    }
    Ok(found)
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let project_root = config.project_root_for(input);
    let mut files = BTreeSet::new();

    if let Some(transcript) = read_transcript(input.transcript_path()) {
        files.extend(
            mentioned_memory_paths(&transcript)
                .iter()
                .filter_map(|p| config.resolve_existing(p, &project_root)),
        );
    }
    for root in [&config.plugin_root, &project_root] {
        let memory_dir = root.join("memory");
        files.extend(recently_modified(&memory_dir, RECENT_WINDOW).map_err(|e| HookError::io(&memory_dir, e))?);
    }

    let date = today();
    for file in &files {
        match prune_file(file, date) {
            Ok(Some(outcome)) => tracing::debug!(
                path = %file.display(),
                before = outcome.before,
                limit = outcome.limit,
                "session prune"
            ),
            Ok(None) => {}
            Err(e) => return Err(HookError::io(file, e)),
        }
    }
    Ok(PolicyDecision::allow())
}
