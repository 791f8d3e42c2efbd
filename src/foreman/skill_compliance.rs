//! Checks each skill invocation in a finished turn against the six-step
//! skill workflow. Warn-only.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{read_transcript, static_regex};
use crate::transcript::context_loads;

const SKILL_START_PATTERN: &str = r"skills/([A-Za-z0-9_-]+)/SKILL\.md";
const OPERATION_PATTERN: &str = r"\b(Read|Write|Edit)\b";

static SKILL_START_RE: OnceLock<Regex> = OnceLock::new();
static OPERATION_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    InitialAnalysis,
    LoadMemory,
    LoadContext,
    PerformAnalysis,
    GenerateOutput,
    UpdateMemory,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 6] = [
        WorkflowStep::InitialAnalysis,
        WorkflowStep::LoadMemory,
        WorkflowStep::LoadContext,
        WorkflowStep::PerformAnalysis,
        WorkflowStep::GenerateOutput,
        WorkflowStep::UpdateMemory,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WorkflowStep::InitialAnalysis => "Initial Analysis",
            WorkflowStep::LoadMemory => "Load Memory",
            WorkflowStep::LoadContext => "Load Context",
            WorkflowStep::PerformAnalysis => "Perform Analysis",
            WorkflowStep::GenerateOutput => "Generate Output",
            WorkflowStep::UpdateMemory => "Update Memory",
        }
    }

    /// Whether the transcript segment shows this step. Reading SKILL.md
    /// opens the segment, and the analysis itself leaves no file trace, so
    /// steps 1 and 4 always count as done.
    fn observed(self, invocation: &SkillInvocation) -> bool {
        let memory_dir = format!("memory/skills/{}/", invocation.skill);
        match self {
            WorkflowStep::InitialAnalysis | WorkflowStep::PerformAnalysis => true,
            WorkflowStep::LoadMemory => invocation.any_line("Read", |l| l.contains(&memory_dir)),
            WorkflowStep::LoadContext => !context_loads(&invocation.text).is_empty(),
            WorkflowStep::GenerateOutput => invocation.any_write(|l| l.contains("claudedocs/")),
            WorkflowStep::UpdateMemory => invocation.any_write(|l| l.contains(&memory_dir)),
        }
    }
}

/// One skill's stretch of transcript, from its SKILL.md read up to the
/// next skill's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInvocation {
    pub skill: String,
    pub text: String,
}

impl SkillInvocation {
    fn any_line(&self, op: &str, pred: impl Fn(&str) -> bool) -> bool {
        self.text.lines().any(|line| operation(line) == Some(op) && pred(line))
    }

    fn any_write(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.any_line("Write", &pred) || self.any_line("Edit", &pred)
    }

    pub fn missing_steps(&self) -> Vec<WorkflowStep> {
        WorkflowStep::ALL.into_iter().filter(|s| !s.observed(self)).collect()
    }
}

fn operation(line: &str) -> Option<&str> {
    static_regex(&OPERATION_RE, OPERATION_PATTERN)
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Split a transcript into skill invocations. Re-reading the same skill's
/// SKILL.md continues the current invocation.
pub fn invocations(transcript: &str) -> Vec<SkillInvocation> {
    let mut found: Vec<SkillInvocation> = Vec::new();
    for line in transcript.lines() {
        let started = static_regex(&SKILL_START_RE, SKILL_START_PATTERN)
            .captures(line)
            .map(|c| c[1].to_string());
        if let Some(skill) = started {
            if found.last().is_none_or(|current| current.skill != skill) {
                found.push(SkillInvocation {
                    skill,
                    text: String::new(),
                });
            }
        }
        if let Some(current) = found.last_mut() {
            current.text.push_str(line);
            current.text.push('\n');
        }
    }
    found
}

pub fn handle(_config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    if input.bool_field("stop_hook_active") {
        return Ok(PolicyDecision::allow());
    }
    let Some(transcript) = read_transcript(input.transcript_path()) else {
        return Ok(PolicyDecision::allow());
    };

    let findings: Vec<String> = invocations(&transcript)
        .iter()
        .filter_map(|inv| {
            let missing = inv.missing_steps();
            if missing.is_empty() {
                return None;
            }
            let labels: Vec<&str> = missing.iter().map(|s| s.label()).collect();
            Some(format!("- {}: missing {}", inv.skill, labels.join(", ")))
        })
        .collect();

    if findings.is_empty() {
        return Ok(PolicyDecision::allow());
    }
    tracing::debug!(skills = findings.len(), "skill workflow gaps");
    Ok(PolicyDecision::warn(format!(
        "Skill workflow check:\n{}",
        findings.join("\n")
    )))
}
