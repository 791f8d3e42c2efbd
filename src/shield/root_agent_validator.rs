//! Session-start check of the plugin layout against its safety profile.
//! Informational: the session starts whatever is missing.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::manifest::Manifest;
use crate::hooks::types::HookInput;

const PROFILE_PATH: &str = "templates/root_safety_profile.json";
const LOCAL_PROFILE: &str = "safety_profile.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafetyProfile {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "requiredStructure", default)]
    pub required: RequiredStructure,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequiredStructure {
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentCounts {
    pub agents: usize,
    pub skills: usize,
    pub commands: usize,
    pub hooks: usize,
}

/// The plugin's profile, then the project's `.forge` copy. `Ok(None)` when
/// neither exists.
fn load_profile(config: &Config) -> Result<Option<SafetyProfile>, String> {
    let candidates = [
        config.plugin_root.join(PROFILE_PATH),
        config.runtime_dir().join(LOCAL_PROFILE),
    ];
    let Some(path) = candidates.iter().find(|p| p.is_file()) else {
        return Ok(None);
    };
    let raw = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("{}: {}", path.display(), e))
}

/// Profile entries absent under `root`, marked up for the report.
pub fn missing_entries(profile: &SafetyProfile, root: &Path) -> Vec<String> {
    let dirs = profile
        .required
        .directories
        .iter()
        .filter(|d| !root.join(d).is_dir())
        .map(|d| format!("✗ {}/ (directory)", d.trim_end_matches('/')));
    let files = profile
        .required
        .files
        .iter()
        .filter(|f| !root.join(f).is_file())
        .map(|f| format!("✗ {} (file)", f));
    dirs.chain(files).collect()
}

fn count_files(dir: &Path, extension: &str) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|x| x == extension))
                .count()
        })
        .unwrap_or(0)
}

pub fn count_components(plugin_root: &Path) -> (ComponentCounts, Option<String>) {
    let skills = fs::read_dir(plugin_root.join("skills"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().join("SKILL.md").is_file())
                .count()
        })
        .unwrap_or(0);

    let manifest_path = plugin_root.join("hooks").join("hooks.json");
    let (hooks, manifest_problem) = if manifest_path.is_file() {
        match Manifest::load(&manifest_path, plugin_root) {
            Ok(manifest) => (manifest.len(), None),
            Err(e) => (0, Some(format!("✗ hooks/hooks.json: {}", e))),
        }
    } else {
        (0, None)
    };

    let counts = ComponentCounts {
        agents: count_files(&plugin_root.join("agents"), "md"),
        skills,
        commands: count_files(&plugin_root.join("commands"), "md"),
        hooks,
    };
    (counts, manifest_problem)
}

pub fn handle(config: &Config, _input: &HookInput) -> Result<PolicyDecision, HookError> {
    let runtime_dir = config.runtime_dir();
    fs::create_dir_all(&runtime_dir).map_err(|e| HookError::io(&runtime_dir, e))?;

    let (counts, manifest_problem) = count_components(&config.plugin_root);
    let mut lines = vec![
        "Forge Session Start".to_string(),
        format!(
            "Components: {} agents, {} skills, {} commands, {} hooks",
            counts.agents, counts.skills, counts.commands, counts.hooks
        ),
    ];

    let mut problems: Vec<String> = manifest_problem.into_iter().collect();
    match load_profile(config) {
        Ok(Some(profile)) => {
            lines.push(format!("Safety profile: v{}", profile.version));
            problems.extend(missing_entries(&profile, &config.plugin_root));
        }
        Ok(None) => lines.push("Safety profile: not found, structure check skipped".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable safety profile");
            lines.push(format!("Safety profile: unreadable ({})", e));
        }
    }

    if problems.is_empty() {
        lines.push("✅ Plugin structure OK".to_string());
    } else {
        lines.push(format!("Missing or invalid ({}):", problems.len()));
        lines.extend(problems);
    }
    Ok(PolicyDecision::warn(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;
    use serde_json::json;
    use tempfile::TempDir;

    fn session_start(plugin: &Path, project: &Path) -> String {
        let config = Config::new(plugin, project);
        let input = HookInput::parse(&json!({"hook_event_name": "SessionStart", "cwd": project}).to_string()).unwrap();
        let d = handle(&config, &input).unwrap();
        assert_eq!(d.decision, Decision::Warn);
        d.additional_context.unwrap()
    }

    fn write_profile(plugin: &Path) {
        fs::create_dir_all(plugin.join("templates")).unwrap();
        fs::write(
            plugin.join(PROFILE_PATH),
            json!({
                "version": "1.2.0",
                "requiredStructure": {
                    "directories": ["agents", "skills", "commands", "hooks"],
                    "files": ["hooks/hooks.json"]
                }
            })
            .to_string(),
        )
        .unwrap();
    }

    #[test]
    fn complete_layout_passes() {
        let plugin = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write_profile(plugin.path());
        for dir in ["agents", "commands", "hooks", "skills/analyze", "skills/notes"] {
            fs::create_dir_all(plugin.path().join(dir)).unwrap();
        }
        fs::write(plugin.path().join("agents/python-engineer.md"), "x").unwrap();
        fs::write(plugin.path().join("agents/python-engineer.config.json"), "{}").unwrap();
        fs::write(plugin.path().join("commands/analyze.md"), "x").unwrap();
        fs::write(plugin.path().join("skills/analyze/SKILL.md"), "x").unwrap();
        fs::write(plugin.path().join("hooks/hooks.json"), r#"{"hooks": {}}"#).unwrap();

        let report = session_start(plugin.path(), project.path());
        assert!(report.starts_with("Forge Session Start"));
        assert!(report.contains("Components: 1 agents, 1 skills, 1 commands, 0 hooks"));
        assert!(report.contains("Safety profile: v1.2.0"));
        assert!(report.contains("✅"));
    }

    #[test]
    fn missing_directories_reported() {
        let plugin = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write_profile(plugin.path());
        fs::create_dir_all(plugin.path().join("agents")).unwrap();
        fs::create_dir_all(plugin.path().join("hooks")).unwrap();

        let report = session_start(plugin.path(), project.path());
        assert!(report.contains("Missing or invalid (3):"));
        assert!(report.contains("✗ skills/ (directory)"));
        assert!(report.contains("✗ commands/ (directory)"));
        assert!(report.contains("✗ hooks/hooks.json (file)"));
        assert!(!report.contains("✗ agents/"));
    }

    #[test]
    fn invalid_manifest_reported() {
        let plugin = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::create_dir_all(plugin.path().join("hooks")).unwrap();
        fs::write(
            plugin.path().join("hooks/hooks.json"),
            json!({"hooks": {"Stop": [{"hooks": [{"type": "command", "command": "bin/absent"}]}]}}).to_string(),
        )
        .unwrap();

        let report = session_start(plugin.path(), project.path());
        assert!(report.contains("✗ hooks/hooks.json:"));
    }

    #[test]
    fn no_profile_still_reports_and_creates_runtime_dir() {
        let plugin = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let report = session_start(plugin.path(), project.path());
        assert!(report.contains("Components: 0 agents, 0 skills, 0 commands, 0 hooks"));
        assert!(report.contains("structure check skipped"));
        assert!(project.path().join(".forge").is_dir());
    }

    #[test]
    fn project_profile_is_fallback() {
        let plugin = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join(".forge")).unwrap();
        fs::write(
            project.path().join(".forge").join(LOCAL_PROFILE),
            json!({"version": "0.9.0", "requiredStructure": {"directories": ["agents"]}}).to_string(),
        )
        .unwrap();

        let report = session_start(plugin.path(), project.path());
        assert!(report.contains("Safety profile: v0.9.0"));
        assert!(report.contains("✗ agents/ (directory)"));
    }
}
