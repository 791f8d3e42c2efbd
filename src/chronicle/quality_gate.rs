//! Post-write upkeep for memory files: refresh the freshness marker, prune
//! to the kind's line limit, and point out content that will age badly.

use std::fs;
use std::sync::OnceLock;

use regex::Regex;

use super::atomic_io::atomic_write;
use super::memory_file::{MemoryKind, is_managed, stamp};
use super::pruning::prune_content;
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{normalize_path, static_regex, today};

/// Overview files with this many vague phrases get flagged.
pub const VAGUE_THRESHOLD: usize = 3;

const ABSOLUTE_PATH_PATTERN: &str = r"(/home/[^/\s]+/|/Users/[^/\s]+/|[A-Za-z]:\\Users\\)";
const VAGUE_PATTERN: &str = r"(?i)\b(custom|some|various|etc|tbd|todo|placeholder)\b";

static ABSOLUTE_PATH_RE: OnceLock<Regex> = OnceLock::new();
static VAGUE_RE: OnceLock<Regex> = OnceLock::new();

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let Some(path) = input.file_path().filter(|p| is_managed(p)) else {
        return Ok(PolicyDecision::allow());
    };
    let resolved = normalize_path(&config.project_root_for(input), path);
    let Ok(original) = fs::read_to_string(&resolved) else {
        return Ok(PolicyDecision::allow());
    };

    let kind = MemoryKind::of(&resolved);
    let stamped = stamp(&original, today());
    let pruned = kind
        .limit()
        .and_then(|limit| prune_content(&stamped, limit, today()).map(|p| (limit, p)));

    let mut notes = Vec::new();
    let updated = match pruned {
        Some((limit, content)) => {
            notes.push(format!(
                "Memory quality: {} exceeded the {}-line limit for {} files ({} lines) and was pruned to the newest entries.",
                path,
                limit,
                kind.as_str(),
                stamped.lines().count()
            ));
            content
        }
        None => stamped,
    };
    if updated != original {
        atomic_write(&resolved, updated.as_bytes()).map_err(|e| HookError::io(&resolved, e))?;
    }

    notes.extend(soft_checks(kind, &updated));
    Ok(PolicyDecision::warn_if_any(&notes))
}

/// Advisory findings about memory content.
pub fn soft_checks(kind: MemoryKind, content: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let abs = static_regex(&ABSOLUTE_PATH_RE, ABSOLUTE_PATH_PATTERN);
    if let Some(m) = abs.find(content) {
        warnings.push(format!(
            "Memory quality: found absolute path `{}`; use project-relative paths so memory stays portable.",
            m.as_str()
        ));
    }

    if kind == MemoryKind::ProjectOverview {
        let vague = static_regex(&VAGUE_RE, VAGUE_PATTERN).find_iter(content).count();
        if vague >= VAGUE_THRESHOLD {
            warnings.push(format!(
                "Memory quality: {} vague phrases (custom, some, various, TBD...) in this overview; replace them with concrete names and versions.",
                vague
            ));
        }
    }
    warnings
}
