//! End-of-turn session statistics pulled from the transcript.

use std::collections::BTreeMap;

use chrono::TimeDelta;

use crate::config::Config;
use crate::error::HookError;
use crate::health_buffer::{HealthBuffer, Severity};
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::{HookEvent, HookInput};
use crate::hooks::utils::read_transcript;
use crate::telemetry::append_report;
use crate::transcript::{
    context_loads, forge_commands, format_counts, format_duration, memory_operations, session_duration,
    skills_invoked, tool_calls,
};

const SOURCE: &str = "telemetry";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub session: String,
    pub tools: BTreeMap<String, usize>,
    pub skills: Vec<String>,
    pub memory: BTreeMap<String, usize>,
    pub context: Vec<String>,
    pub commands: Vec<String>,
    pub duration: Option<TimeDelta>,
}

impl SessionStats {
    pub fn collect(session: &str, transcript: &str) -> Self {
        Self {
            session: session.to_string(),
            tools: tool_calls(transcript),
            skills: skills_invoked(transcript),
            memory: memory_operations(transcript),
            context: context_loads(transcript),
            commands: forge_commands(transcript),
            duration: session_duration(transcript),
        }
    }

    pub fn tool_total(&self) -> usize {
        self.tools.values().sum()
    }

    fn report_lines(&self) -> Vec<String> {
        vec![
            format!("session: {}", self.session),
            format!("tools: {}", format_counts(&self.tools)),
            format!("skills: {}", list_or_none(&self.skills)),
            format!("memory: {}", format_counts(&self.memory)),
            format!("context: {}", list_or_none(&self.context)),
            format!("commands: {}", list_or_none(&self.commands)),
            format!("duration: {}", format_duration(self.duration)),
        ]
    }

    fn summary(&self) -> String {
        format!(
            "Telemetry: session {} used {} tool calls, {} skills, {} context files, {} commands over {}",
            self.session,
            self.tool_total(),
            self.skills.len(),
            self.context.len(),
            self.commands.len(),
            format_duration(self.duration)
        )
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    if input.bool_field("stop_hook_active") {
        return Ok(PolicyDecision::allow());
    }
    let runtime_dir = config.runtime_dir();
    let buffer = HealthBuffer::with_config(&runtime_dir, config);

    if let Some(transcript) = read_transcript(input.transcript_path()) {
        let stats = SessionStats::collect(input.session_id().unwrap_or("unknown"), &transcript);
        append_report(&runtime_dir, "session_stats", &stats.report_lines())
            .map_err(|e| HookError::io(&runtime_dir, e))?;
        buffer.record(SOURCE, Severity::Info, stats.summary());
    }

    if input.event() == Some(HookEvent::SessionEnd) {
        let entries = buffer.flush();
        if !entries.is_empty() {
            let mut lines = vec![format!("events: {}", entries.len())];
            lines.extend(entries.iter().map(ToString::to_string));
            append_report(&runtime_dir, "health_report", &lines).map_err(|e| HookError::io(&runtime_dir, e))?;
        }
    }
    Ok(PolicyDecision::allow())
}
