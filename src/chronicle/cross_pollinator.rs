//! Copies critical findings from skill memory into the project's shared
//! insights file, so one skill's discoveries reach the others.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use super::atomic_io::{atomic_write, sha256_hex};
use super::memory_file::{is_managed, marker_line};
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{normalize_path, today};

pub const INSIGHTS_FILE: &str = "cross_skill_insights.md";
const CRITICAL_SECTIONS: &[&str] = &["critical", "security", "breaking", "performance"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub section: String,
    pub summary: String,
}

/// `memory/skills/<skill>/<project>/<file>.md` split into its memory root,
/// skill and project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillMemoryPath {
    pub memory_root: PathBuf,
    pub skill: String,
    pub project: String,
}

impl SkillMemoryPath {
    pub fn parse(path: &Path) -> Option<Self> {
        let parts: Vec<&str> = path
            .iter()
            .map(|c| c.to_str().unwrap_or_default())
            .collect();
        let idx = parts.iter().rposition(|c| *c == "memory")?;
        match &parts[idx + 1..] {
            ["skills", skill, project, file] if file.ends_with(".md") => Some(Self {
                memory_root: path.iter().take(idx + 1).collect(),
                skill: skill.to_string(),
                project: project.to_string(),
            }),
            _ => None,
        }
    }

    pub fn insights_path(&self) -> PathBuf {
        self.memory_root
            .join("projects")
            .join(&self.project)
            .join(INSIGHTS_FILE)
    }
}

/// Critical sections with their first non-empty line.
pub fn critical_findings(content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            let heading = heading.trim();
            let first_word = heading.split_whitespace().next().unwrap_or("").to_lowercase();
            current = CRITICAL_SECTIONS
                .contains(&first_word.as_str())
                .then(|| heading.to_string());
            continue;
        }
        if trimmed.starts_with('#') {
            current = None;
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        if let Some(section) = current.take() {
            findings.push(Finding {
                section,
                summary: trimmed.trim_start_matches(['-', '*', ' ']).to_string(),
            });
        }
    }
    findings
}

fn finding_id(skill: &str, finding: &Finding) -> String {
    let digest = sha256_hex(format!("{}\n{}\n{}", skill, finding.section, finding.summary).as_bytes());
    format!("xp:{}", &digest[..16])
}

/// Append unseen findings to the insights file. Returns how many were added.
pub fn propagate(target: &SkillMemoryPath, findings: &[Finding], date: NaiveDate) -> std::io::Result<usize> {
    let path = target.insights_path();
    let existing = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => format!(
            "{}\n# Cross-Skill Insights: {}\n\nCritical findings propagated from skill memories.\n\n",
            marker_line(date),
            target.project
        ),
        Err(e) => return Err(e),
    };

    let mut updated = existing.clone();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    let mut added = 0;
    for finding in findings {
        let id = finding_id(&target.skill, finding);
        if updated.contains(&id) {
            continue;
        }
        updated.push_str(&format!(
            "- [{}] **{}** from {}: {} <!-- {} -->\n",
            date.format("%Y-%m-%d"),
            finding.section,
            target.skill,
            finding.summary,
            id
        ));
        added += 1;
    }

    if added > 0 {
        atomic_write(&path, updated.as_bytes())?;
    }
    Ok(added)
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let Some(path) = input.file_path().filter(|p| is_managed(p)) else {
        return Ok(PolicyDecision::allow());
    };
    let resolved = normalize_path(&config.project_root_for(input), path);
    let Some(target) = SkillMemoryPath::parse(&resolved) else {
        return Ok(PolicyDecision::allow());
    };
    let Ok(content) = fs::read_to_string(&resolved) else {
        return Ok(PolicyDecision::allow());
    };

    let findings = critical_findings(&content);
    if findings.is_empty() {
        return Ok(PolicyDecision::allow());
    }
    let insights = target.insights_path();
    let added = propagate(&target, &findings, today()).map_err(|e| HookError::io(&insights, e))?;
    if added > 0 {
        tracing::info!(skill = %target.skill, project = %target.project, added, "findings cross-pollinated");
    }
    Ok(PolicyDecision::allow())
}
