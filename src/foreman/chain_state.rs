//! Execution context carried between slash commands in one session, so a
//! follow-up command knows what ran before it and what it loaded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chronicle::atomic_io::atomic_write;
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::{HookEvent, HookInput};
use crate::hooks::utils::{read_transcript, utc_timestamp};
use crate::transcript::{context_loads, skills_invoked};

pub const CHAIN_STATE_FILE: &str = "chain_state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionContext {
    pub chain_id: String,
    pub session_id: String,
    pub previous_command: Option<String>,
    pub accumulated_args: Vec<String>,
    pub command_history: Vec<CommandRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandRecord {
    pub command: String,
    pub args: Vec<String>,
    pub task_id: Option<String>,
    pub timestamp: String,
    pub context_loaded: Vec<String>,
    pub skills_invoked: Vec<String>,
}

impl ExecutionContext {
    pub fn new(session_id: &str) -> Self {
        Self {
            chain_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            ..Self::default()
        }
    }

    /// Stored context, if present and readable. A corrupt file starts over.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "discarding unreadable chain state");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes())
    }

    /// Record a completed command.
    pub fn record(&mut self, entry: CommandRecord) {
        self.accumulated_args.extend(entry.args.iter().cloned());
        self.previous_command = Some(entry.command.clone());
        self.command_history.push(entry);
    }
}

/// `/analyze my-project` → (`analyze`, [`my-project`]); anything else is a
/// plain `task`.
pub fn parse_subject(subject: &str) -> (String, Vec<String>) {
    let mut words = subject.split_whitespace();
    match words.next().and_then(|w| w.strip_prefix('/')) {
        Some(name) if !name.is_empty() && !name.contains('/') => {
            (name.to_string(), words.map(str::to_string).collect())
        }
        _ => ("task".to_string(), Vec::new()),
    }
}

fn state_path(config: &Config) -> PathBuf {
    config.runtime_dir().join(CHAIN_STATE_FILE)
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    if input.cwd().is_none() {
        return Ok(PolicyDecision::allow());
    }
    let path = state_path(config);

    if input.event() == Some(HookEvent::SessionEnd) {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(HookError::io(&path, e)),
        }
        return Ok(PolicyDecision::allow());
    }

    let session_id = input.session_id().unwrap_or("unknown");
    let mut ctx = ExecutionContext::load(&path)
        .filter(|c| c.session_id == session_id)
        .unwrap_or_else(|| ExecutionContext::new(session_id));

    let (command, args) = parse_subject(input.str_field("task_subject").unwrap_or(""));
    let transcript = read_transcript(input.transcript_path()).unwrap_or_default();
    let previous = ctx.previous_command.clone();
    ctx.record(CommandRecord {
        command: command.clone(),
        args,
        task_id: input.str_field("task_id").map(str::to_string),
        timestamp: utc_timestamp(),
        context_loaded: context_loads(&transcript),
        skills_invoked: skills_invoked(&transcript),
    });
    ctx.save(&path).map_err(|e| HookError::io(&path, e))?;

    Ok(match previous {
        Some(prev) => PolicyDecision::warn(format!(
            "Command chain: /{} followed /{} ({} commands in this chain). Context from earlier commands is recorded in .forge/{}.",
            command,
            prev,
            ctx.command_history.len(),
            CHAIN_STATE_FILE
        )),
        None => PolicyDecision::allow(),
    })
}
