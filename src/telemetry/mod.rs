//! Session reporting: per-session statistics, context usage and the
//! health report. Reports are appended to `.forge/telemetry.log`.

pub mod context_usage;
pub mod health_report;
pub mod session_stats;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::hooks::utils::utc_timestamp;

pub const TELEMETRY_LOG: &str = "telemetry.log";

/// Append a `--- <kind> ---` block with a timestamp line and `lines`.
pub fn append_report(runtime_dir: &Path, kind: &str, lines: &[String]) -> io::Result<()> {
    fs::create_dir_all(runtime_dir)?;
    let mut block = format!("--- {} ---\ntimestamp: {}\n", kind, utc_timestamp());
    for line in lines {
        block.push_str(line);
        block.push('\n');
    }
    block.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(runtime_dir.join(TELEMETRY_LOG))?;
    file.write_all(block.as_bytes())
}
