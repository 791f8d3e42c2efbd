mod chronicle;
mod cli;
mod config;
mod error;
mod foreman;
mod health_buffer;
mod hooks;
mod shield;
mod telemetry;
mod transcript;

use std::io::{self, Read, Write};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

/// Exit status for configuration errors. Hook decisions always exit 0.
const EXIT_CONFIG: i32 = 2;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FORGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // stdout carries the hook protocol; diagnostics stay on stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

fn read_stdin() -> io::Result<String> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn run(cli: Cli) -> Result<(String, i32)> {
    let config = Config::from_env().context("loading configuration")?;
    tracing::debug!(
        plugin_root = %config.plugin_root.display(),
        project_dir = %config.project_dir.display(),
        "configuration loaded"
    );
    cli::run(cli.command, config, read_stdin)
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok((output, exit_code)) => {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(output.as_bytes());
            let _ = stdout.flush();
            if exit_code != 0 {
                process::exit(exit_code);
            }
        }
        Err(e) => {
            eprintln!("forge-hooks: {:#}", e);
            process::exit(EXIT_CONFIG);
        }
    }
}
