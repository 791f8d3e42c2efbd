//! Flags dependency manifests that declare frameworks known to conflict.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{file_name, normalize_path, static_regex};
use crate::shield::dependency_sentinel::{Ecosystem, strip_version};

const PACKAGE_REFERENCE_PATTERN: &str = r#"<PackageReference\s+Include="([^"]+)""#;
static PACKAGE_REFERENCE_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    PackageJson,
    Requirements,
    PyProject,
    CsProj,
}

impl ManifestFormat {
    pub fn detect(path: &str) -> Option<Self> {
        let name = file_name(path);
        if name == "package.json" {
            Some(Self::PackageJson)
        } else if name.starts_with("requirements") && name.ends_with(".txt") {
            Some(Self::Requirements)
        } else if name == "pyproject.toml" {
            Some(Self::PyProject)
        } else if name.ends_with(".csproj") {
            Some(Self::CsProj)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Conflict {
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct ConflictTable {
    #[serde(default)]
    conflicts: Vec<Conflict>,
}

/// Conflict table from the plugin, or `None` when absent or unreadable.
pub fn load_conflicts(plugin_root: &Path) -> Option<Vec<Conflict>> {
    let path = plugin_root.join("context").join("framework_conflicts.json");
    let raw = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<ConflictTable>(&raw) {
        Ok(table) => Some(table.conflicts),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed conflict table");
            None
        }
    }
}

/// Lowercased dependency names declared in a manifest.
pub fn declared_dependencies(format: ManifestFormat, content: &str) -> BTreeSet<String> {
    let names: Vec<String> = match format {
        ManifestFormat::PackageJson => package_json(content),
        ManifestFormat::Requirements => content
            .lines()
            .map(|l| l.split('#').next().unwrap_or("").trim())
            .filter(|l| !l.is_empty() && !l.starts_with('-'))
            .map(|l| strip_version(l, Ecosystem::Pip))
            .collect(),
        ManifestFormat::PyProject => pyproject(content),
        ManifestFormat::CsProj => static_regex(&PACKAGE_REFERENCE_RE, PACKAGE_REFERENCE_PATTERN)
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect(),
    };
    names
        .into_iter()
        .map(|n| n.to_lowercase())
        .filter(|n| !n.is_empty() && n != "python")
        .collect()
}

fn package_json(content: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };
    ["dependencies", "devDependencies", "peerDependencies"]
        .iter()
        .filter_map(|key| value.get(key).and_then(Value::as_object))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

/// PEP 621 arrays (`project.dependencies`, `project.optional-dependencies`)
/// and Poetry dependency tables, dependency groups included.
fn pyproject(content: &str) -> Vec<String> {
    let doc: toml::Table = match toml::from_str(content) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable pyproject.toml");
            return Vec::new();
        }
    };
    let mut names = Vec::new();

    if let Some(project) = doc.get("project").and_then(toml::Value::as_table) {
        let optional = project
            .get("optional-dependencies")
            .and_then(toml::Value::as_table)
            .into_iter()
            .flat_map(|extras| extras.values());
        for array in project
            .get("dependencies")
            .into_iter()
            .chain(optional)
            .filter_map(toml::Value::as_array)
        {
            names.extend(
                array
                    .iter()
                    .filter_map(toml::Value::as_str)
                    .map(|spec| strip_version(spec, Ecosystem::Pip)),
            );
        }
    }

    let poetry = doc
        .get("tool")
        .and_then(|tool| tool.get("poetry"))
        .and_then(toml::Value::as_table);
    if let Some(poetry) = poetry {
        let mut tables: Vec<&toml::Table> = ["dependencies", "dev-dependencies"]
            .iter()
            .filter_map(|key| poetry.get(*key))
            .filter_map(toml::Value::as_table)
            .collect();
        if let Some(groups) = poetry.get("group").and_then(toml::Value::as_table) {
            tables.extend(
                groups
                    .values()
                    .filter_map(|group| group.get("dependencies"))
                    .filter_map(toml::Value::as_table),
            );
        }
        for table in tables {
            names.extend(table.keys().cloned());
        }
    }
    names
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let Some(path) = input.file_path() else {
        return Ok(PolicyDecision::allow());
    };
    let Some(format) = ManifestFormat::detect(path) else {
        return Ok(PolicyDecision::allow());
    };
    let Some(conflicts) = load_conflicts(&config.plugin_root) else {
        return Ok(PolicyDecision::allow());
    };
    let resolved = normalize_path(&config.project_root_for(input), path);
    let Ok(content) = fs::read_to_string(&resolved) else {
        return Ok(PolicyDecision::allow());
    };

    let declared = declared_dependencies(format, &content);
    let warnings: Vec<String> = conflicts
        .iter()
        .filter(|c| !c.frameworks.is_empty())
        .filter(|c| c.frameworks.iter().all(|f| declared.contains(&f.to_lowercase())))
        .map(|c| {
            format!(
                "Context drift in {}: {} declared together. {}",
                file_name(path),
                c.frameworks.join(" + "),
                c.reason
            )
        })
        .collect();
    Ok(PolicyDecision::warn_if_any(&warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;
    use serde_json::json;
    use tempfile::TempDir;

    fn names(format: ManifestFormat, content: &str) -> Vec<String> {
        declared_dependencies(format, content).into_iter().collect()
    }

    fn plugin_with_conflicts() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("context")).unwrap();
        fs::write(
            dir.path().join("context/framework_conflicts.json"),
            json!({"conflicts": [
                {"frameworks": ["flask", "fastapi"], "reason": "Two web frameworks in one service."},
                {"frameworks": ["jest", "vitest"], "reason": "Pick one test runner."}
            ]})
            .to_string(),
        )
        .unwrap();
        dir
    }

    fn post(plugin: &Path, project: &Path, file: &str, content: &str) -> PolicyDecision {
        fs::write(project.join(file), content).unwrap();
        let config = Config::new(plugin, project);
        let input = HookInput::parse(
            &json!({"tool_name": "Write", "tool_input": {"file_path": file}, "cwd": project}).to_string(),
        )
        .unwrap();
        handle(&config, &input).unwrap()
    }

    #[test]
    fn recognizes_manifests() {
        assert_eq!(ManifestFormat::detect("a/package.json"), Some(ManifestFormat::PackageJson));
        assert_eq!(ManifestFormat::detect("requirements-dev.txt"), Some(ManifestFormat::Requirements));
        assert_eq!(ManifestFormat::detect("pyproject.toml"), Some(ManifestFormat::PyProject));
        assert_eq!(ManifestFormat::detect("src/MyApp.csproj"), Some(ManifestFormat::CsProj));
        for other in ["src/main.py", "README.md", ".gitignore"] {
            assert_eq!(ManifestFormat::detect(other), None);
        }
    }

    #[test]
    fn parses_each_format() {
        assert_eq!(
            names(ManifestFormat::PackageJson, r#"{"dependencies":{"express":"^4"},"devDependencies":{"Jest":"29"}}"#),
            vec!["express", "jest"]
        );
        assert_eq!(
            names(ManifestFormat::Requirements, "# deps\nflask==2.3.0\nrequests>=2.31 ; python_version>'3'\n-r base.txt\n"),
            vec!["flask", "requests"]
        );
        assert_eq!(
            names(ManifestFormat::PyProject, "[tool.poetry.dependencies]\npython = \"^3.11\"\nfastapi = \"^0.100\"\n"),
            vec!["fastapi"]
        );
        assert_eq!(
            names(ManifestFormat::PyProject, "[project]\nname = \"x\"\ndependencies = [\n  \"flask>=2\",\n  \"httpx\",\n]\n"),
            vec!["flask", "httpx"]
        );
        assert_eq!(
            names(ManifestFormat::PyProject, "[project]\ndependencies = [\"django>=4\", \"celery\"]\n"),
            vec!["celery", "django"]
        );
        assert_eq!(
            names(ManifestFormat::CsProj, r#"<PackageReference Include="Newtonsoft.Json" Version="13.0.1" />"#),
            vec!["newtonsoft.json"]
        );
    }

    #[test]
    fn pyproject_extras_and_groups() {
        let content = r#"
[project]
name = "svc"
dependencies = [
    "uvicorn[standard]>=0.23",
    "fastapi",
]

[project.optional-dependencies]
test = ["pytest"]

[tool.poetry.group.dev.dependencies]
black = { version = "^24", optional = true }
"#;
        assert_eq!(
            names(ManifestFormat::PyProject, content),
            vec!["black", "fastapi", "pytest", "uvicorn"]
        );
        assert!(names(ManifestFormat::PyProject, "[project\ndependencies = [").is_empty());
    }

    #[test]
    fn conflicting_frameworks_warn() {
        let plugin = plugin_with_conflicts();
        let project = TempDir::new().unwrap();
        let d = post(plugin.path(), project.path(), "requirements.txt", "flask==2.3.0\nFastAPI==0.100\n");
        assert_eq!(d.decision, Decision::Warn);
        let ctx = d.additional_context.unwrap();
        assert!(ctx.contains("flask + fastapi"));
        assert!(ctx.contains("Two web frameworks"));
    }

    #[test]
    fn single_framework_is_quiet() {
        let plugin = plugin_with_conflicts();
        let project = TempDir::new().unwrap();
        let d = post(plugin.path(), project.path(), "requirements.txt", "requests==2.31.0\npytest==7.4.0\nflask\n");
        assert_eq!(d, PolicyDecision::allow());
    }

    #[test]
    fn missing_table_disables_check() {
        let plugin = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let d = post(plugin.path(), project.path(), "requirements.txt", "flask\nfastapi\n");
        assert_eq!(d, PolicyDecision::allow());
    }

    #[test]
    fn non_manifests_and_empty_paths_pass() {
        let plugin = plugin_with_conflicts();
        let config = Config::new(plugin.path(), "/project");
        for payload in [
            json!({"tool_name": "Write", "tool_input": {"file_path": "src/main.py"}}),
            json!({"tool_name": "Write", "tool_input": {}}),
        ] {
            let input = HookInput::parse(&payload.to_string()).unwrap();
            assert_eq!(handle(&config, &input).unwrap(), PolicyDecision::allow());
        }
    }
}
