//! Shared, bounded diagnostics log written by every hook process.
//!
//! Layout under the runtime directory:
//! - `health_buffer`: one entry per line, oldest first
//! - `health_buffer.lock`: `flock` sentinel serializing writers and flushers
//!
//! Appends never block past the lock timeout; an entry that cannot get the
//! lock in time is dropped.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{Config, DEFAULT_LOCK_TIMEOUT_MS};
use crate::error::HealthBufferError;
use crate::hooks::utils::utc_timestamp;

const BUFFER_FILE: &str = "health_buffer";
const LOCK_FILE: &str = "health_buffer.lock";
pub const MAX_ENTRIES: usize = 200;
const RETRY_DELAY_MS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Severity> {
        match s {
            "info" => Some(Severity::Info),
            "warn" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEntry {
    pub timestamp: String,
    pub source: String,
    pub severity: Severity,
    pub message: String,
}

impl HealthEntry {
    pub fn new(source: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: utc_timestamp(),
            source: source.into(),
            severity,
            message: message.into(),
        }
    }

    /// Serialized form, `[ts] [severity] source: message`. Newlines in the
    /// message are flattened so one entry is always one line.
    pub(crate) fn to_line(&self) -> String {
        let message = self.message.replace(['\r', '\n'], " ");
        format!(
            "[{}] [{}] {}: {}",
            self.timestamp,
            self.severity.as_str(),
            self.source,
            message.trim()
        )
    }

    /// Parse a stored line. Lines written by other tools in the plain
    /// `[ts] message` form are kept as info entries without a source.
    fn parse_line(line: &str) -> Option<HealthEntry> {
        let rest = line.strip_prefix('[')?;
        let (timestamp, rest) = rest.split_once("] ")?;

        let structured = rest
            .strip_prefix('[')
            .and_then(|r| r.split_once("] "))
            .and_then(|(sev, r)| Some((Severity::parse(sev)?, r)))
            .and_then(|(severity, r)| {
                let (source, message) = r.split_once(": ")?;
                Some((severity, source.to_string(), message.to_string()))
            });

        let (severity, source, message) =
            structured.unwrap_or_else(|| (Severity::Info, String::new(), rest.to_string()));
        Some(HealthEntry {
            timestamp: timestamp.to_string(),
            source,
            severity,
            message,
        })
    }
}

impl fmt::Display for HealthEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "[{}] {}", self.timestamp, self.message)
        } else {
            write!(
                f,
                "[{}] {} ({}): {}",
                self.timestamp,
                self.source,
                self.severity.as_str(),
                self.message
            )
        }
    }
}

/// Handle to one project's health buffer. Cheap to construct; holds no
/// open files between calls.
#[derive(Debug, Clone)]
pub struct HealthBuffer {
    buffer_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    max_entries: usize,
}

impl HealthBuffer {
    pub fn new(runtime_dir: &Path) -> Self {
        Self {
            buffer_path: runtime_dir.join(BUFFER_FILE),
            lock_path: runtime_dir.join(LOCK_FILE),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            max_entries: MAX_ENTRIES,
        }
    }

    /// Buffer in `runtime_dir` using the configured lock timeout.
    pub fn with_config(runtime_dir: &Path, config: &Config) -> Self {
        Self::new(runtime_dir).with_lock_timeout(config.lock_timeout)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Append one entry. Returns whether it was stored; failures (including
    /// lock timeout) are traced and swallowed.
    pub fn append(&self, entry: HealthEntry) -> bool {
        if entry.message.trim().is_empty() {
            return false;
        }
        match self.try_append(&entry) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, source = %entry.source, "health entry dropped");
                false
            }
        }
    }

    /// Convenience wrapper around [`HealthBuffer::append`].
    pub fn record(&self, source: &str, severity: Severity, message: impl Into<String>) -> bool {
        self.append(HealthEntry::new(source, severity, message))
    }

    /// Take every retained entry and clear the buffer.
    pub fn flush(&self) -> Vec<HealthEntry> {
        match self.try_flush() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(error = %e, "health buffer flush failed");
                Vec::new()
            }
        }
    }

    /// Entries currently retained, without clearing.
    pub fn peek(&self) -> Vec<HealthEntry> {
        read_entries(&self.buffer_path)
    }

    fn try_append(&self, entry: &HealthEntry) -> Result<(), HealthBufferError> {
        let _guard = self.lock()?;

        let mut lines = read_lines(&self.buffer_path);
        if lines.len() + 1 > self.max_entries {
            lines.push(entry.to_line());
            let excess = lines.len() - self.max_entries;
            lines.drain(..excess);
            let mut body = lines.join("\n");
            body.push('\n');
            fs::write(&self.buffer_path, body)?;
        } else {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.buffer_path)?;
            writeln!(f, "{}", entry.to_line())?;
        }
        Ok(())
    }

    fn try_flush(&self) -> Result<Vec<HealthEntry>, HealthBufferError> {
        let _guard = self.lock()?;
        let entries = read_entries(&self.buffer_path);
        if self.buffer_path.exists() {
            fs::write(&self.buffer_path, "")?;
        }
        Ok(entries)
    }

    fn lock(&self) -> Result<LockGuard, HealthBufferError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            // SAFETY: the descriptor is owned by `file`, which outlives the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc == 0 {
                return Ok(LockGuard { file });
            }
            if Instant::now() >= deadline {
                return Err(HealthBufferError::LockTimeout(self.lock_timeout));
            }
            thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
        }
    }
}

/// Releases the `flock` when dropped.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // SAFETY: see `HealthBuffer::lock`.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn read_entries(path: &Path) -> Vec<HealthEntry> {
    read_lines(path)
        .iter()
        .filter_map(|l| HealthEntry::parse_line(l))
        .collect()
}
