//! Built-in hooks reachable through `forge-hooks hook <name>`.
//!
//! Each hook reads one event from stdin and answers with a decision. A
//! malformed event or a handler error never escapes: it becomes the
//! conservative decision for the hook's criticality.

use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::error::HookError;
use crate::health_buffer::{HealthBuffer, Severity};
use crate::{chronicle, foreman, shield, telemetry};

use super::decision::{Criticality, PolicyDecision};
use super::types::HookInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinHook {
    SandboxGuard,
    PiiRedactor,
    DependencySentinel,
    GitHygiene,
    PreCommitQuality,
    RootAgentValidator,
    MemoryFreshness,
    MemoryQualityGate,
    MemoryCrossPollinator,
    MemorySessionPruner,
    FrontmatterValidator,
    AgentConfigValidator,
    ChainState,
    DriftDetector,
    OutputQualityScorer,
    SkillComplianceChecker,
    OutputArchival,
    HealthReport,
    Telemetry,
    ContextUsage,
}

impl BuiltinHook {
    pub const ALL: [BuiltinHook; 20] = [
        BuiltinHook::SandboxGuard,
        BuiltinHook::PiiRedactor,
        BuiltinHook::DependencySentinel,
        BuiltinHook::GitHygiene,
        BuiltinHook::PreCommitQuality,
        BuiltinHook::RootAgentValidator,
        BuiltinHook::MemoryFreshness,
        BuiltinHook::MemoryQualityGate,
        BuiltinHook::MemoryCrossPollinator,
        BuiltinHook::MemorySessionPruner,
        BuiltinHook::FrontmatterValidator,
        BuiltinHook::AgentConfigValidator,
        BuiltinHook::ChainState,
        BuiltinHook::DriftDetector,
        BuiltinHook::OutputQualityScorer,
        BuiltinHook::SkillComplianceChecker,
        BuiltinHook::OutputArchival,
        BuiltinHook::HealthReport,
        BuiltinHook::Telemetry,
        BuiltinHook::ContextUsage,
    ];

    pub fn from_arg(s: &str) -> Option<BuiltinHook> {
        let normalized = s.trim().replace('_', "-").to_ascii_lowercase();
        Self::ALL.into_iter().find(|h| h.name() == normalized)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinHook::SandboxGuard => "sandbox-guard",
            BuiltinHook::PiiRedactor => "pii-redactor",
            BuiltinHook::DependencySentinel => "dependency-sentinel",
            BuiltinHook::GitHygiene => "git-hygiene",
            BuiltinHook::PreCommitQuality => "pre-commit-quality",
            BuiltinHook::RootAgentValidator => "root-agent-validator",
            BuiltinHook::MemoryFreshness => "memory-freshness",
            BuiltinHook::MemoryQualityGate => "memory-quality-gate",
            BuiltinHook::MemoryCrossPollinator => "memory-cross-pollinator",
            BuiltinHook::MemorySessionPruner => "memory-session-pruner",
            BuiltinHook::FrontmatterValidator => "frontmatter-validator",
            BuiltinHook::AgentConfigValidator => "agent-config-validator",
            BuiltinHook::ChainState => "chain-state",
            BuiltinHook::DriftDetector => "drift-detector",
            BuiltinHook::OutputQualityScorer => "output-quality-scorer",
            BuiltinHook::SkillComplianceChecker => "skill-compliance-checker",
            BuiltinHook::OutputArchival => "output-archival",
            BuiltinHook::HealthReport => "health-report",
            BuiltinHook::Telemetry => "telemetry",
            BuiltinHook::ContextUsage => "context-usage",
        }
    }

    /// Only the Shield tool-call gates fail closed.
    pub fn criticality(&self) -> Criticality {
        match self {
            BuiltinHook::SandboxGuard
            | BuiltinHook::DependencySentinel
            | BuiltinHook::GitHygiene
            | BuiltinHook::PreCommitQuality => Criticality::Critical,
            _ => Criticality::Advisory,
        }
    }

    fn handler(&self) -> fn(&Config, &HookInput) -> Result<PolicyDecision, HookError> {
        match self {
            BuiltinHook::SandboxGuard => shield::sandbox_guard::handle,
            BuiltinHook::PiiRedactor => shield::pii_redactor::handle,
            BuiltinHook::DependencySentinel => shield::dependency_sentinel::handle,
            BuiltinHook::GitHygiene => shield::git_hygiene::handle,
            BuiltinHook::PreCommitQuality => shield::pre_commit_quality::handle,
            BuiltinHook::RootAgentValidator => shield::root_agent_validator::handle,
            BuiltinHook::MemoryFreshness => chronicle::freshness::handle,
            BuiltinHook::MemoryQualityGate => chronicle::quality_gate::handle,
            BuiltinHook::MemoryCrossPollinator => chronicle::cross_pollinator::handle,
            BuiltinHook::MemorySessionPruner => chronicle::session_pruner::handle,
            BuiltinHook::FrontmatterValidator => foreman::frontmatter::handle,
            BuiltinHook::AgentConfigValidator => foreman::agent_config::handle,
            BuiltinHook::ChainState => foreman::chain_state::handle,
            BuiltinHook::DriftDetector => foreman::drift_detector::handle,
            BuiltinHook::OutputQualityScorer => foreman::output_quality::handle,
            BuiltinHook::SkillComplianceChecker => foreman::skill_compliance::handle,
            BuiltinHook::OutputArchival => foreman::output_archival::handle,
            BuiltinHook::HealthReport => telemetry::health_report::handle,
            BuiltinHook::Telemetry => telemetry::session_stats::handle,
            BuiltinHook::ContextUsage => telemetry::context_usage::handle,
        }
    }

    /// Run against raw stdin and always produce a decision.
    pub fn run(&self, config: &Config, raw: &str) -> PolicyDecision {
        let result = match HookInput::parse(raw) {
            Ok(input) => (self.handler())(config, &input),
            Err(e) => Err(HookError::from(e)),
        };

        match result {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(hook = self.name(), error = %e, "hook failed");
                let cause = e.to_string();
                HealthBuffer::with_config(&config.runtime_dir(), config).record(self.name(), Severity::Error, cause.as_str());
                self.criticality().fallback(self.name(), &cause)
            }
        }
    }
}

impl fmt::Display for BuiltinHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuiltinHook {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_arg(s).ok_or_else(|| format!("unknown hook `{}`", s))
    }
}

/// CLI entry for `hook <name>`: stdout text and exit code.
pub fn run_from_cli(config: &Config, hook: BuiltinHook, stdin_json: &str) -> (String, i32) {
    let decision = hook.run(config, stdin_json);
    let event = HookInput::parse(stdin_json).ok().and_then(|i| i.event());
    (decision.render(event), 0)
}
