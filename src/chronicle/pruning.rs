//! Line-limit pruning for memory files.
//!
//! An oversized file keeps its 5 header lines, gains one pruning marker and
//! keeps the newest tail of the body, for exactly `limit` lines in total.

use std::io;
use std::path::Path;

use chrono::NaiveDate;

use super::atomic_io::atomic_write;
use super::memory_file::{MemoryFile, MemoryKind};

pub const HEADER_LINES: usize = 5;

/// What a pruning pass did to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneOutcome {
    pub kind: MemoryKind,
    pub limit: usize,
    pub before: usize,
}

/// Pruned text, or `None` when `content` is within `limit` (or `limit` is
/// too small to hold the header and marker).
pub fn prune_content(content: &str, limit: usize, today: NaiveDate) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    if total <= limit || limit <= HEADER_LINES + 1 {
        return None;
    }

    let tail = limit - HEADER_LINES - 1;
    let marker = format!(
        "<!-- Pruned: {} lines → {} lines on {} -->",
        total,
        limit,
        today.format("%Y-%m-%d")
    );

    let mut out: Vec<&str> = Vec::with_capacity(limit);
    out.extend_from_slice(&lines[..HEADER_LINES]);
    out.push(&marker);
    out.extend_from_slice(&lines[total - tail..]);

    let mut pruned = out.join("\n");
    if content.ends_with('\n') {
        pruned.push('\n');
    }
    Some(pruned)
}

/// Prune the file at `path` in place per its kind. `Ok(None)` when nothing
/// was written.
pub fn prune_file(path: &Path, today: NaiveDate) -> io::Result<Option<PruneOutcome>> {
    let file = MemoryFile::load(path)?;
    let Some(limit) = file.kind.limit() else {
        return Ok(None);
    };
    let Some(pruned) = prune_content(&file.body, limit, today) else {
        return Ok(None);
    };

    atomic_write(path, pruned.as_bytes())?;
    tracing::info!(path = %path.display(), before = file.line_count, limit, "memory file pruned");
    Ok(Some(PruneOutcome {
        kind: file.kind,
        limit,
        before: file.line_count,
    }))
}
