//! Memory file classification and the freshness marker.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::hooks::utils::{file_name, static_regex};

/// Operational files maintained by the plugin itself.
pub const SKIPPED_FILES: &[&str] = &["index.md", "lifecycle.md", "quality_guidance.md", "sync_log.md"];

/// The marker is only honored within this many leading lines.
pub const MARKER_WINDOW: usize = 5;

const MARKER_PATTERN: &str = r"<!--\s*Last Updated:\s*(\d{4}-\d{2}-\d{2})\s*-->";
static MARKER_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    ProjectOverview,
    ReviewHistory,
    Reference,
    Index,
    Lifecycle,
    Generic,
}

impl MemoryKind {
    pub fn of(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let under_reference = path
            .parent()
            .is_some_and(|p| p.components().any(|c| c.as_os_str() == "reference"));

        if stem == "index" {
            MemoryKind::Index
        } else if stem == "lifecycle" {
            MemoryKind::Lifecycle
        } else if stem.starts_with("project_overview") {
            MemoryKind::ProjectOverview
        } else if stem.starts_with("review_history") {
            MemoryKind::ReviewHistory
        } else if under_reference || stem.starts_with("reference") {
            MemoryKind::Reference
        } else {
            MemoryKind::Generic
        }
    }

    /// Line limit, or `None` for files that are never pruned.
    pub fn limit(self) -> Option<usize> {
        match self {
            MemoryKind::ProjectOverview => Some(200),
            MemoryKind::ReviewHistory => Some(300),
            MemoryKind::Reference | MemoryKind::Generic => Some(500),
            MemoryKind::Index | MemoryKind::Lifecycle => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::ProjectOverview => "project_overview",
            MemoryKind::ReviewHistory => "review_history",
            MemoryKind::Reference => "reference",
            MemoryKind::Index => "index",
            MemoryKind::Lifecycle => "lifecycle",
            MemoryKind::Generic => "generic",
        }
    }
}

/// True for paths with a `memory` directory component.
pub fn is_memory_path(path: &str) -> bool {
    let mut components: Vec<&str> = path.split(['/', '\\']).collect();
    components.pop();
    components.contains(&"memory")
}

/// Memory paths the Chronicle hooks act on: markdown under `memory/`,
/// excluding the operational files.
pub fn is_managed(path: &str) -> bool {
    is_memory_path(path) && path.ends_with(".md") && !SKIPPED_FILES.contains(&file_name(path))
}

pub fn marker_line(date: NaiveDate) -> String {
    format!("<!-- Last Updated: {} -->", date.format("%Y-%m-%d"))
}

/// Date from the freshness marker in the leading lines. `None` when the
/// marker is absent or the date does not parse.
pub fn parse_marker(content: &str) -> Option<NaiveDate> {
    let re = static_regex(&MARKER_RE, MARKER_PATTERN);
    content
        .lines()
        .take(MARKER_WINDOW)
        .find_map(|line| re.captures(line))
        .and_then(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok())
}

/// Set the marker to `date`, replacing an existing one in the leading
/// lines or prepending a new first line.
pub fn stamp(content: &str, date: NaiveDate) -> String {
    let re = static_regex(&MARKER_RE, MARKER_PATTERN);
    let marker = marker_line(date);
    let mut lines: Vec<&str> = content.split('\n').collect();

    match lines.iter().take(MARKER_WINDOW).position(|l| re.is_match(l)) {
        Some(idx) => {
            let replaced = re.replace(lines[idx], marker.as_str()).into_owned();
            let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            out[idx] = replaced;
            out.join("\n")
        }
        None => {
            lines.insert(0, &marker);
            lines.join("\n")
        }
    }
}

/// A memory file as read from disk.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub path: PathBuf,
    pub kind: MemoryKind,
    pub last_updated: Option<NaiveDate>,
    pub line_count: usize,
    pub body: String,
}

impl MemoryFile {
    pub fn load(path: &Path) -> io::Result<Self> {
        let body = fs::read_to_string(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            kind: MemoryKind::of(path),
            last_updated: parse_marker(&body),
            line_count: body.lines().count(),
            body,
        })
    }
}
