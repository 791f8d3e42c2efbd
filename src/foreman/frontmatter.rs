//! Frontmatter contract for context files under `context/`.

use std::collections::BTreeMap;
use std::fs;

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{file_name, normalize_path};

const SKIPPED_FILES: &[&str] = &["index.md", "cross_domain.md", "loading_protocol.md"];

pub const REQUIRED_FIELDS: &[&str] = &["id", "domain", "title", "type", "estimatedTokens", "loadingStrategy"];
pub const DOMAINS: &[&str] = &[
    "engineering",
    "angular",
    "azure",
    "commands",
    "dotnet",
    "git",
    "python",
    "schema",
    "security",
];
pub const TYPES: &[&str] = &["always", "framework", "reference", "pattern", "index", "detection"];
pub const LOADING_STRATEGIES: &[&str] = &["always", "onDemand", "lazy"];

/// Extract frontmatter block between first and second `---` lines.
pub fn extract_frontmatter(content: &str) -> Option<String> {
    let mut lines = content.lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return None;
    }

    let mut fm_lines = Vec::new();
    for line in lines {
        if line.trim_end() == "---" {
            return (!fm_lines.is_empty()).then(|| fm_lines.join("\n"));
        }
        fm_lines.push(line);
    }
    None
}

/// Top-level `key: value` pairs. Nested or continuation lines are ignored.
pub fn parse_fields(frontmatter: &str) -> BTreeMap<String, String> {
    frontmatter
        .lines()
        .filter(|l| !l.starts_with([' ', '\t', '#', '-']))
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| {
            let value = v.trim().trim_matches(|c| c == '"' || c == '\'');
            (k.trim().to_string(), value.to_string())
        })
        .collect()
}

/// Every problem with a context file's frontmatter. Empty means valid.
pub fn validate(content: &str) -> Vec<String> {
    let Some(frontmatter) = extract_frontmatter(content) else {
        return vec!["missing frontmatter block (--- ... ---) at the top of the file".to_string()];
    };
    let fields = parse_fields(&frontmatter);
    let mut problems = Vec::new();

    for field in REQUIRED_FIELDS {
        if fields.get(*field).is_none_or(|v| v.is_empty()) {
            problems.push(format!("missing required field `{}`", field));
        }
    }

    let check_enum = |problems: &mut Vec<String>, key: &str, allowed: &[&str]| {
        if let Some(value) = fields.get(key).filter(|v| !v.is_empty()) {
            if !allowed.contains(&value.as_str()) {
                problems.push(format!(
                    "`{}: {}` is not one of: {}",
                    key,
                    value,
                    allowed.join(", ")
                ));
            }
        }
    };
    check_enum(&mut problems, "domain", DOMAINS);
    check_enum(&mut problems, "type", TYPES);
    check_enum(&mut problems, "loadingStrategy", LOADING_STRATEGIES);

    if let Some(tokens) = fields.get("estimatedTokens").filter(|v| !v.is_empty()) {
        if !tokens.parse::<u64>().is_ok_and(|n| n > 0) {
            problems.push(format!("`estimatedTokens: {}` must be a positive integer", tokens));
        }
    }
    problems
}

fn applies_to(path: &str) -> bool {
    let in_context = path.starts_with("context/") || path.contains("/context/");
    in_context && path.ends_with(".md") && !SKIPPED_FILES.contains(&file_name(path))
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let Some(path) = input.file_path().filter(|p| applies_to(p)) else {
        return Ok(PolicyDecision::allow());
    };

    let content = match input.tool_name() {
        Some("Write") => input.tool_input_str("content").unwrap_or("").to_string(),
        Some("Edit") => {
            let resolved = normalize_path(&config.project_root_for(input), path);
            let Ok(current) = fs::read_to_string(&resolved) else {
                return Ok(PolicyDecision::allow());
            };
            apply_edit(input, current)
        }
        _ => return Ok(PolicyDecision::allow()),
    };

    let problems = validate(&content);
    if problems.is_empty() {
        Ok(PolicyDecision::allow())
    } else {
        Ok(PolicyDecision::deny(format!(
            "Frontmatter validation failed for {}:\n- {}",
            path,
            problems.join("\n- ")
        )))
    }
}

/// File content as it will be after the Edit.
fn apply_edit(input: &HookInput, current: String) -> String {
    let new = input
        .data
        .pointer("/tool_input/new_string")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let Some(old) = input.tool_input_str("old_string") else {
        return current;
    };
    let replace_all = input
        .data
        .pointer("/tool_input/replace_all")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if replace_all {
        current.replace(old, new)
    } else {
        current.replacen(old, new, 1)
    }
}
