use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Problems building a [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine working directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid commit pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Problems loading or validating the hook registration manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Every problem found, so an operator can fix them in one pass.
    #[error("manifest rejected:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown hook event `{0}`")]
    UnknownEvent(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Errors raised inside a built-in hook handler. The registry turns these
/// into the conservative decision for the hook's criticality.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("malformed event JSON: {0}")]
    MalformedInput(#[from] serde_json::Error),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HookError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HookError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum HealthBufferError {
    #[error("health buffer I/O: {0}")]
    Io(#[from] io::Error),

    #[error("health buffer lock not acquired within {0:?}")]
    LockTimeout(Duration),
}
