//! Surfaces health events the agent has not seen yet. The buffer itself is
//! left intact for the SessionEnd consolidated report; a cursor file marks
//! the last entry already shown.

use std::fs;
use std::path::Path;

use crate::chronicle::atomic_io::atomic_write;
use crate::config::Config;
use crate::error::HookError;
use crate::health_buffer::{HealthBuffer, HealthEntry};
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;

const CURSOR_FILE: &str = "health_report.cursor";

/// Entries after the cursor line. A cursor that no longer matches (the
/// buffer was flushed or trimmed) means everything is new.
fn unseen(entries: Vec<HealthEntry>, cursor: Option<&str>) -> Vec<HealthEntry> {
    let start = cursor
        .and_then(|c| entries.iter().rposition(|e| e.to_line() == c))
        .map_or(0, |i| i + 1);
    entries.into_iter().skip(start).collect()
}

fn read_cursor(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim_end().to_string())
}

pub fn handle(config: &Config, _input: &HookInput) -> Result<PolicyDecision, HookError> {
    let runtime_dir = config.runtime_dir();
    let cursor_path = runtime_dir.join(CURSOR_FILE);
    let entries = HealthBuffer::with_config(&runtime_dir, config).peek();
    let fresh = unseen(entries, read_cursor(&cursor_path).as_deref());
    let Some(last) = fresh.last() else {
        return Ok(PolicyDecision::allow());
    };
    atomic_write(&cursor_path, last.to_line().as_bytes()).map_err(|e| HookError::io(&cursor_path, e))?;

    let mut report = format!("Forge Health Report ({} events)", fresh.len());
    for entry in &fresh {
        report.push_str("\n- ");
        report.push_str(&entry.to_string());
    }
    Ok(PolicyDecision::warn(report))
}
