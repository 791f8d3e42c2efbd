//! How much of the loaded context a session actually used, reported before
//! compaction and at session end.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::HookError;
use crate::foreman::frontmatter::{extract_frontmatter, parse_fields};
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::read_transcript;
use crate::telemetry::append_report;
use crate::transcript::context_loads;

const OVERUSE_FACTOR: f64 = 3.0;
const OVERUSE_MIN_MENTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStatus {
    Unused,
    Active,
    Overused,
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UsageStatus::Unused => "unused",
            UsageStatus::Active => "active",
            UsageStatus::Overused => "overused",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUsage {
    pub path: String,
    pub mentions: usize,
    pub status: UsageStatus,
    pub estimated_tokens: Option<u64>,
}

fn stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}

/// Usage of every context file loaded in `transcript`, in load order.
pub fn analyze(transcript: &str) -> Vec<ContextUsage> {
    let loads = context_loads(transcript);
    let counts: Vec<usize> = loads
        .iter()
        .map(|path| {
            let stem = stem(path);
            transcript
                .lines()
                .filter(|line| !line.contains(path.as_str()))
                .map(|line| line.matches(stem).count())
                .sum()
        })
        .collect();

    let mean = if counts.is_empty() {
        0.0
    } else {
        counts.iter().sum::<usize>() as f64 / counts.len() as f64
    };

    loads
        .into_iter()
        .zip(counts)
        .map(|(path, mentions)| {
            let status = if mentions == 0 {
                UsageStatus::Unused
            } else if mentions >= OVERUSE_MIN_MENTIONS && mentions as f64 > mean * OVERUSE_FACTOR {
                UsageStatus::Overused
            } else {
                UsageStatus::Active
            };
            ContextUsage {
                path,
                mentions,
                status,
                estimated_tokens: None,
            }
        })
        .collect()
}

fn estimated_tokens(file: &Path) -> Option<u64> {
    let content = fs::read_to_string(file).ok()?;
    let frontmatter = extract_frontmatter(&content)?;
    parse_fields(&frontmatter).get("estimatedTokens")?.parse().ok()
}

/// Share of loaded files that were referenced at all, as a whole percent.
pub fn utilization(usage: &[ContextUsage]) -> u32 {
    if usage.is_empty() {
        return 0;
    }
    let used = usage.iter().filter(|u| u.status != UsageStatus::Unused).count();
    ((used * 100) as f64 / usage.len() as f64).round() as u32
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let Some(transcript) = read_transcript(input.transcript_path()) else {
        return Ok(PolicyDecision::allow());
    };
    let project_root = config.project_root_for(input);
    let mut usage = analyze(&transcript);
    if usage.is_empty() {
        return Ok(PolicyDecision::allow());
    }
    for entry in &mut usage {
        entry.estimated_tokens = config
            .resolve_existing(&entry.path, &project_root)
            .and_then(|p| estimated_tokens(&p));
    }

    let count = |status: UsageStatus| usage.iter().filter(|u| u.status == status).count();
    let (active, unused, overused) = (
        count(UsageStatus::Active),
        count(UsageStatus::Unused),
        count(UsageStatus::Overused),
    );
    let wasted: u64 = usage
        .iter()
        .filter(|u| u.status == UsageStatus::Unused)
        .filter_map(|u| u.estimated_tokens)
        .sum();
    let percent = utilization(&usage);

    let mut report = vec![format!(
        "Context Usage Report ({} loaded: {} active, {} unused, {} overused)",
        usage.len(),
        active,
        unused,
        overused
    )];
    for u in &usage {
        let tokens = u
            .estimated_tokens
            .map(|t| format!(", ~{} tokens", t))
            .unwrap_or_default();
        report.push(format!("- {}: {} ({} mentions{})", u.path, u.status, u.mentions, tokens));
    }
    if wasted > 0 {
        report.push(format!("Estimated tokens wasted on unused context: ~{}", wasted));
    }
    report.push(format!("Utilization: {}%", percent));

    let runtime_dir = config.runtime_dir();
    let log_lines = vec![
        format!("trigger: {}", input.str_field("trigger").unwrap_or("session_end")),
        format!("loaded: {}", usage.len()),
        format!("active: {}", active),
        format!("unused: {}", unused),
        format!("overused: {}", overused),
        format!("wasted_tokens: {}", wasted),
        format!("utilization: {}%", percent),
    ];
    append_report(&runtime_dir, "context_usage_report", &log_lines).map_err(|e| HookError::io(&runtime_dir, e))?;

    Ok(PolicyDecision::warn(report.join("\n")))
}
