//! Snapshots freshly generated `claudedocs/` outputs into
//! `claudedocs/archive/<timestamp>/` and records each copy in
//! `claudedocs/archive/manifest.md`. Never blocks.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;

use crate::chronicle::atomic_io::{atomic_write, sha256_hex};
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;

pub const OUTPUT_DIR: &str = "claudedocs";
const ARCHIVE_DIR: &str = "archive";
const MANIFEST_FILE: &str = "manifest.md";
pub const RECENT_WINDOW: Duration = Duration::from_secs(10 * 60);

const MANIFEST_HEADER: &str = "# Archive Manifest\n\n| Archived | File | SHA-256 |\n|---|---|---|\n";

/// Top-level markdown outputs modified within `window`, sorted by name.
pub fn recent_outputs(output_dir: &Path, window: Duration) -> io::Result<Vec<PathBuf>> {
    let cutoff = SystemTime::now().checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut found = Vec::new();
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        let is_output = meta.is_file()
            && path.extension().is_some_and(|e| e == "md")
            && path.file_name().is_some_and(|n| n != MANIFEST_FILE);
        if is_output && meta.modified()? >= cutoff {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn manifest_row(archived: &str, name: &str, digest: &str) -> String {
    format!("| {} | {} | {} |\n", archived, name, digest)
}

fn already_archived(manifest: &str, name: &str, digest: &str) -> bool {
    manifest.contains(&format!("| {} | {} |", name, digest))
}

/// Archive every recent output whose current content is not yet in the
/// manifest. Returns the names copied.
pub fn archive(output_dir: &Path, window: Duration) -> io::Result<Vec<String>> {
    let archive_root = output_dir.join(ARCHIVE_DIR);
    let manifest_path = archive_root.join(MANIFEST_FILE);
    let manifest = fs::read_to_string(&manifest_path).unwrap_or_default();
    let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let snapshot = archive_root.join(&stamp);

    let mut rows = String::new();
    let mut archived = Vec::new();
    for path in recent_outputs(output_dir, window)? {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let content = fs::read(&path)?;
        let digest = sha256_hex(&content);
        if already_archived(&manifest, &name, &digest) {
            continue;
        }
        atomic_write(&snapshot.join(&name), &content)?;
        rows.push_str(&manifest_row(&stamp, &name, &digest));
        archived.push(name);
    }

    if !archived.is_empty() {
        let mut file = OpenOptions::new().create(true).append(true).open(&manifest_path)?;
        if manifest.is_empty() {
            file.write_all(MANIFEST_HEADER.as_bytes())?;
        }
        file.write_all(rows.as_bytes())?;
    }
    Ok(archived)
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    if input.bool_field("stop_hook_active") {
        return Ok(PolicyDecision::allow());
    }
    let output_dir = config.project_root_for(input).join(OUTPUT_DIR);
    if !output_dir.is_dir() {
        return Ok(PolicyDecision::allow());
    }

    let archived = archive(&output_dir, RECENT_WINDOW).map_err(|e| HookError::io(&output_dir, e))?;
    if !archived.is_empty() {
        tracing::info!(count = archived.len(), dir = %output_dir.display(), "archived outputs");
    }
    Ok(PolicyDecision::allow())
}
