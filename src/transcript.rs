//! Session transcript scanning shared by the chain-state, telemetry and
//! context-usage hooks. Transcripts are treated as plain text.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta};
use regex::Regex;

use crate::hooks::utils::static_regex;

const TOOL_PATTERN: &str = r#""tool_name"\s*:?\s*"([A-Za-z0-9_]+)""#;
const SKILL_PATTERN: &str = r"skills/([A-Za-z0-9_-]+)/";
const CONTEXT_PATTERN: &str = r"context/[A-Za-z0-9_./-]+\.md";
const MEMORY_OP_PATTERN: &str = r"\b(Read|Write|Edit)\b[^\n]*memory/";
const COMMAND_PATTERN: &str = r"(?m)^/([a-z][a-z0-9-]*)(?:\s|$)";
const TIMESTAMP_PATTERN: &str = r#""timestamp"\s*:\s*"([^"]+)""#;

static TOOL_RE: OnceLock<Regex> = OnceLock::new();
static SKILL_RE: OnceLock<Regex> = OnceLock::new();
static CONTEXT_RE: OnceLock<Regex> = OnceLock::new();
static MEMORY_OP_RE: OnceLock<Regex> = OnceLock::new();
static COMMAND_RE: OnceLock<Regex> = OnceLock::new();
static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();

fn distinct(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

/// Tool call counts by tool name.
pub fn tool_calls(transcript: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for caps in static_regex(&TOOL_RE, TOOL_PATTERN).captures_iter(transcript) {
        *counts.entry(caps[1].to_string()).or_insert(0) += 1;
    }
    counts
}

/// Skill names in first-seen order.
pub fn skills_invoked(transcript: &str) -> Vec<String> {
    distinct(
        static_regex(&SKILL_RE, SKILL_PATTERN)
            .captures_iter(transcript)
            .map(|c| c[1].to_string()),
    )
}

/// Context file paths in first-seen order.
pub fn context_loads(transcript: &str) -> Vec<String> {
    distinct(
        static_regex(&CONTEXT_RE, CONTEXT_PATTERN)
            .find_iter(transcript)
            .map(|m| m.as_str().to_string()),
    )
}

/// Read/Write/Edit operations on memory files, by operation.
pub fn memory_operations(transcript: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for caps in static_regex(&MEMORY_OP_RE, MEMORY_OP_PATTERN).captures_iter(transcript) {
        *counts.entry(caps[1].to_lowercase()).or_insert(0) += 1;
    }
    counts
}

/// Slash commands typed at the start of a line, in order.
pub fn forge_commands(transcript: &str) -> Vec<String> {
    static_regex(&COMMAND_RE, COMMAND_PATTERN)
        .captures_iter(transcript)
        .map(|c| c[1].to_string())
        .collect()
}

/// Span between the earliest and latest RFC 3339 `"timestamp"` values.
/// `None` when fewer than two parse.
pub fn session_duration(transcript: &str) -> Option<TimeDelta> {
    let stamps: Vec<_> = static_regex(&TIMESTAMP_RE, TIMESTAMP_PATTERN)
        .captures_iter(transcript)
        .filter_map(|c| DateTime::parse_from_rfc3339(&c[1]).ok())
        .collect();
    if stamps.len() < 2 {
        return None;
    }
    let first = stamps.iter().min()?;
    let last = stamps.iter().max()?;
    Some(last.signed_duration_since(*first))
}

/// `12m 5s`, or `unknown`.
pub fn format_duration(duration: Option<TimeDelta>) -> String {
    match duration {
        Some(d) => format!("{}m {}s", d.num_minutes(), d.num_seconds() % 60),
        None => "unknown".to_string(),
    }
}

/// `a: 2, b: 1`, or `none`.
pub fn format_counts(counts: &BTreeMap<String, usize>) -> String {
    if counts.is_empty() {
        return "none".to_string();
    }
    counts
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}
