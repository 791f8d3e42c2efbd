//! Checks a sub-agent's config file when the agent starts. Warn-only.

use std::fs;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::static_regex;

/// Host-provided agents that have no plugin config.
const BUILTIN_AGENTS: &[&str] = &["Bash", "Explore", "Plan", "general-purpose"];
const REQUIRED_FIELDS: &[&str] = &["name", "version", "description"];

const SEMVER_PATTERN: &str = r"^\d+\.\d+\.\d+$";
static SEMVER_RE: OnceLock<Regex> = OnceLock::new();

/// Problems in the raw text of `<agent>.config.json`.
pub fn check_config(agent_type: &str, raw: &str) -> Vec<String> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return vec![format!("config is not valid JSON: {}", e)],
    };
    let Some(obj) = value.as_object() else {
        return vec!["config is not a JSON object".to_string()];
    };

    let mut issues: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| obj.get(**f).and_then(Value::as_str).is_none_or(str::is_empty))
        .map(|f| format!("missing required field `{}`", f))
        .collect();

    if let Some(name) = obj.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
        if name != agent_type {
            issues.push(format!("`name` is `{}` but the agent type is `{}`", name, agent_type));
        }
    }
    if let Some(version) = obj.get("version").and_then(Value::as_str).filter(|v| !v.is_empty()) {
        if !static_regex(&SEMVER_RE, SEMVER_PATTERN).is_match(version) {
            issues.push(format!("`version` `{}` is not semver (X.Y.Z)", version));
        }
    }
    issues
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let agent_type = input.str_field("agent_type").unwrap_or("");
    if agent_type.is_empty() || BUILTIN_AGENTS.contains(&agent_type) {
        return Ok(PolicyDecision::allow());
    }

    let path = config
        .plugin_root
        .join("agents")
        .join(format!("{}.config.json", agent_type));
    let issues = match fs::read_to_string(&path) {
        Ok(raw) => check_config(agent_type, &raw),
        Err(_) => vec![format!("no config found at agents/{}.config.json", agent_type)],
    };
    if issues.is_empty() {
        return Ok(PolicyDecision::allow());
    }

    Ok(PolicyDecision::warn(format!(
        "Agent config check for `{}`:\n- {}",
        agent_type,
        issues.join("\n- ")
    )))
}
