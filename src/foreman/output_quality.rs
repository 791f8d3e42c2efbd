//! Scores generated `claudedocs/` reports and records the result in the
//! file itself. Informational only.

use std::fmt;
use std::fs;
use std::sync::OnceLock;

use regex::Regex;

use crate::chronicle::atomic_io::atomic_write;
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{file_name, normalize_path, relative_to_dir, static_regex, today};

const OUTPUT_DIR: &str = "claudedocs";
const TYPE_PREFIXES: &[&str] = &[
    "analysis",
    "audit",
    "brainstorm",
    "docs",
    "documentation",
    "implementation",
    "plan",
    "refactor",
    "report",
    "review",
    "summary",
    "test",
];
const MIN_LINES: usize = 15;
const MAX_LINE_WIDTH: usize = 200;

const BLOCK_PATTERN: &str = r"(?s)\n*<!-- forge-quality .*?-->\n?";
const KEBAB_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)*$";
const ACTION_HEADING_PATTERN: &str =
    r"(?im)^#{2,6}\s+.*\b(action|recommendation|next step|todo|remediation)";
const LIST_ITEM_PATTERN: &str = r"(?m)^\s*(?:[-*+]|\d+\.)\s+\S";
const CODE_OR_LINK_PATTERN: &str = r"```|`[^`\n]+`|\[[^\]]+\]\([^)]+\)";

static BLOCK_RE: OnceLock<Regex> = OnceLock::new();
static KEBAB_RE: OnceLock<Regex> = OnceLock::new();
static ACTION_HEADING_RE: OnceLock<Regex> = OnceLock::new();
static LIST_ITEM_RE: OnceLock<Regex> = OnceLock::new();
static CODE_OR_LINK_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityScore {
    pub completeness: u32,
    pub actionability: u32,
    pub formatting: u32,
    pub naming: u32,
}

impl QualityScore {
    pub fn total(&self) -> u32 {
        self.completeness + self.actionability + self.formatting + self.naming
    }

    pub fn grade(&self) -> char {
        match self.total() {
            90.. => 'A',
            80..=89 => 'B',
            70..=79 => 'C',
            60..=69 => 'D',
            _ => 'F',
        }
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "score: {}/100 grade: {} (completeness {}/30, actionability {}/30, formatting {}/25, naming {}/15)",
            self.total(),
            self.grade(),
            self.completeness,
            self.actionability,
            self.formatting,
            self.naming
        )
    }
}

/// Strip any previous metadata block so re-scoring is stable.
pub fn strip_block(content: &str) -> String {
    static_regex(&BLOCK_RE, BLOCK_PATTERN)
        .replace_all(content, "\n")
        .trim_end()
        .to_string()
}

pub fn score(name: &str, content: &str) -> QualityScore {
    let headings: Vec<usize> = content
        .lines()
        .filter_map(|l| {
            let level = l.chars().take_while(|c| *c == '#').count();
            (level > 0 && l[level..].starts_with(' ')).then_some(level)
        })
        .collect();
    let non_empty = content.lines().filter(|l| !l.trim().is_empty()).count();
    let list_items = static_regex(&LIST_ITEM_RE, LIST_ITEM_PATTERN)
        .find_iter(content)
        .count();

    let mut completeness = 0;
    if headings.first() == Some(&1) {
        completeness += 10;
    }
    if headings.iter().filter(|l| **l == 2).count() >= 2 {
        completeness += 10;
    }
    if non_empty >= MIN_LINES {
        completeness += 10;
    } else if non_empty >= MIN_LINES / 2 {
        completeness += 5;
    }

    let mut actionability = 0;
    if static_regex(&ACTION_HEADING_RE, ACTION_HEADING_PATTERN).is_match(content) {
        actionability += 15;
    }
    actionability += match list_items {
        0 => 0,
        1..=2 => 8,
        _ => 15,
    };

    let mut formatting = 0;
    if !headings.is_empty() && headings.windows(2).all(|w| w[1] <= w[0] + 1) {
        formatting += 10;
    }
    if list_items > 0 {
        formatting += 5;
    }
    if static_regex(&CODE_OR_LINK_RE, CODE_OR_LINK_PATTERN).is_match(content) {
        formatting += 5;
    }
    if content.lines().all(|l| l.chars().count() <= MAX_LINE_WIDTH) {
        formatting += 5;
    }

    let stem = name.strip_suffix(".md").unwrap_or(name);
    let mut naming = 0;
    if static_regex(&KEBAB_RE, KEBAB_PATTERN).is_match(stem) {
        naming += 10;
    }
    let prefix = stem.split('-').next().unwrap_or("");
    if stem.contains('-') && TYPE_PREFIXES.contains(&prefix) {
        naming += 5;
    }

    QualityScore {
        completeness,
        actionability,
        formatting,
        naming,
    }
}

fn metadata_block(score: &QualityScore) -> String {
    format!(
        "<!-- forge-quality score: {} grade: {} completeness: {} actionability: {} formatting: {} naming: {} scored: {} -->",
        score.total(),
        score.grade(),
        score.completeness,
        score.actionability,
        score.formatting,
        score.naming,
        today().format("%Y-%m-%d")
    )
}

fn applies_to(path: &str) -> bool {
    let Some(rel) = relative_to_dir(path, OUTPUT_DIR) else {
        return false;
    };
    rel.ends_with(".md") && rel != "manifest.md" && !rel.starts_with("archive/")
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let Some(path) = input.file_path().filter(|p| applies_to(p)) else {
        return Ok(PolicyDecision::allow());
    };
    let resolved = normalize_path(&config.project_root_for(input), path);
    let Ok(content) = fs::read_to_string(&resolved) else {
        return Ok(PolicyDecision::allow());
    };

    let body = strip_block(&content);
    let name = file_name(path);
    let result = score(name, &body);
    let updated = format!("{}\n\n{}\n", body, metadata_block(&result));
    if updated != content {
        atomic_write(&resolved, updated.as_bytes()).map_err(|e| HookError::io(&resolved, e))?;
    }
    tracing::debug!(file = name, total = result.total(), "scored output");

    Ok(PolicyDecision::warn(format!("Output quality for {}: {}", name, result)))
}
