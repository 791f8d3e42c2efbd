//! Command-line surface. Every command returns the text for stdout plus an
//! exit code; errors are configuration problems and exit 2 in `main`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::health_buffer::HealthBuffer;
use crate::hooks::dispatcher::dispatch_from_cli;
use crate::hooks::manifest::Manifest;
use crate::hooks::registry::{BuiltinHook, run_from_cli};

#[derive(Debug, Parser)]
#[command(name = "forge-hooks", version, about = "Hook dispatch and policy enforcement for agent sessions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run every hook registered for EVENT against the event JSON on stdin
    Dispatch {
        /// Event name (PascalCase, kebab-case or snake_case)
        event: String,
        /// Registration manifest, overriding FORGE_HOOKS_MANIFEST
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Default per-hook timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run one built-in hook against the event JSON on stdin
    Hook {
        /// Built-in hook name, e.g. `sandbox-guard`
        name: BuiltinHook,
    },
    /// Registration manifest tools
    Manifest {
        #[command(subcommand)]
        command: ManifestCommands,
    },
    /// Health buffer tools
    Health {
        #[command(subcommand)]
        command: HealthCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ManifestCommands {
    /// Validate the manifest and summarize registrations
    Check {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum HealthCommands {
    /// Print and clear buffered health entries
    Flush,
}

pub fn run(command: Commands, mut config: Config, read_stdin: impl FnOnce() -> io::Result<String>) -> Result<(String, i32)> {
    match command {
        Commands::Dispatch { event, manifest, timeout } => {
            if let Some(path) = manifest {
                config.manifest_path = path;
            }
            if let Some(secs) = timeout {
                config.hook_timeout = Duration::from_secs(secs);
            }
            let stdin_json = read_event(read_stdin)?;
            Ok(dispatch_from_cli(&config, &event, &stdin_json)?)
        }
        Commands::Hook { name } => {
            let stdin_json = read_event(read_stdin)?;
            Ok(run_from_cli(&config, name, &stdin_json))
        }
        Commands::Manifest {
            command: ManifestCommands::Check { manifest },
        } => {
            let path = manifest.unwrap_or_else(|| config.manifest_path.clone());
            let loaded = Manifest::load(&path, &config.plugin_root)
                .with_context(|| format!("checking {}", path.display()))?;
            let mut out = format!("{}: {} hooks registered\n", path.display(), loaded.len());
            for (event, count) in loaded.events() {
                out.push_str(&format!("  {}: {}\n", event.as_str(), count));
            }
            Ok((out, 0))
        }
        Commands::Health {
            command: HealthCommands::Flush,
        } => {
            let entries = HealthBuffer::with_config(&config.runtime_dir(), &config).flush();
            let out: String = entries.iter().map(|e| format!("{}\n", e)).collect();
            Ok((out, 0))
        }
    }
}

fn read_event(read_stdin: impl FnOnce() -> io::Result<String>) -> Result<String> {
    let raw = read_stdin().context("reading event JSON from stdin")?;
    Ok(if raw.trim().is_empty() { "{}".to_string() } else { raw })
}
