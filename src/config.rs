//! Process configuration, read once at startup and passed down by reference.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. Environment (`CLAUDE_PLUGIN_ROOT`, `CLAUDE_PROJECT_DIR`, `FORGE_HOOKS_MANIFEST`)
//! 3. `<project>/.forge/config.json`
//! 4. CLI flags (applied by the caller)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::hooks::types::HookInput;

/// Runtime state directory name, relative to the project root.
pub const RUNTIME_DIR: &str = ".forge";

pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_COMMIT_PATTERN: &str =
    r"^(feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(\([^)]+\))?!?: .+";

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the plugin installation (hooks, memory, context, agents).
    pub plugin_root: PathBuf,
    /// Project the host session is working in.
    pub project_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub hook_timeout: Duration,
    pub lock_timeout: Duration,
    pub protected_branches: Vec<String>,
    pub commit_pattern: Regex,
    /// Roots outside the project that file tools may touch.
    pub sandbox_extra_roots: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    hook_timeout_secs: Option<u64>,
    lock_timeout_ms: Option<u64>,
    protected_branches: Option<Vec<String>>,
    commit_pattern: Option<String>,
    sandbox: SandboxSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SandboxSection {
    extra_roots: Vec<PathBuf>,
}

impl Config {
    /// Defaults rooted at the given directories.
    pub fn new(plugin_root: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        let plugin_root = plugin_root.into();
        let manifest_path = plugin_root.join("hooks").join("hooks.json");
        Self {
            plugin_root,
            project_dir: project_dir.into(),
            manifest_path,
            hook_timeout: Duration::from_secs(DEFAULT_HOOK_TIMEOUT_SECS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            protected_branches: vec!["main".to_string(), "master".to_string()],
            commit_pattern: default_commit_pattern(),
            sandbox_extra_roots: Vec::new(),
        }
    }

    /// Build from the process environment and the project's config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = env::current_dir().map_err(ConfigError::CurrentDir)?;
        let plugin_root = env_path("CLAUDE_PLUGIN_ROOT").unwrap_or_else(|| cwd.clone());
        let project_dir = env_path("CLAUDE_PROJECT_DIR").unwrap_or(cwd);

        let mut config = Config::new(plugin_root, project_dir);
        if let Some(manifest) = env_path("FORGE_HOOKS_MANIFEST") {
            config.manifest_path = manifest;
        }
        config.load_overrides()
    }

    /// Apply `<project>/.forge/config.json` when it exists.
    pub fn load_overrides(mut self) -> Result<Self, ConfigError> {
        let path = self.runtime_dir().join("config.json");
        if !path.is_file() {
            return Ok(self);
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let file: FileConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;

        if let Some(secs) = file.hook_timeout_secs {
            self.hook_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.lock_timeout_ms {
            self.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(branches) = file.protected_branches {
            self.protected_branches = branches;
        }
        if let Some(pattern) = file.commit_pattern {
            self.commit_pattern =
                Regex::new(&pattern).map_err(|source| ConfigError::Pattern { pattern, source })?;
        }
        self.sandbox_extra_roots = file.sandbox.extra_roots;
        Ok(self)
    }

    /// Runtime state shared by every hook of a session. Payload `cwd`
    /// does not move it.
    pub fn runtime_dir(&self) -> PathBuf {
        self.project_dir.join(RUNTIME_DIR)
    }

    /// Project root for one event: the payload's `cwd` wins over the
    /// configured project directory.
    pub fn project_root_for(&self, input: &HookInput) -> PathBuf {
        match input.cwd() {
            Some(cwd) => PathBuf::from(cwd),
            None => self.project_dir.clone(),
        }
    }

    /// Resolve a path mentioned by a hook payload or transcript. Absolute
    /// paths are kept; relative ones are tried against the plugin root and
    /// then the project directory.
    pub fn resolve_existing(&self, path: &str, project_root: &Path) -> Option<PathBuf> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return candidate.exists().then(|| candidate.to_path_buf());
        }
        [self.plugin_root.join(candidate), project_root.join(candidate)]
            .into_iter()
            .find(|p| p.exists())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn default_commit_pattern() -> Regex {
    crate::hooks::utils::static_regex(&DEFAULT_COMMIT_RE, DEFAULT_COMMIT_PATTERN).clone()
}

static DEFAULT_COMMIT_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_sane() {
        let config = Config::new("/plugin", "/project");
        assert_eq!(config.hook_timeout, Duration::from_secs(10));
        assert_eq!(config.lock_timeout, Duration::from_millis(2000));
        assert_eq!(config.manifest_path, PathBuf::from("/plugin/hooks/hooks.json"));
        assert_eq!(config.runtime_dir(), PathBuf::from("/project/.forge"));
        assert!(config.commit_pattern.is_match("feat(api): add endpoint"));
        assert!(!config.commit_pattern.is_match("added stuff"));
    }

    #[test]
    fn overrides_from_project_config() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".forge")).unwrap();
        fs::write(
            dir.path().join(".forge/config.json"),
            json!({
                "hook_timeout_secs": 3,
                "protected_branches": ["release"],
                "commit_pattern": "^JIRA-[0-9]+ .+",
                "sandbox": {"extra_roots": ["/opt/shared"]}
            })
            .to_string(),
        )
        .unwrap();

        let config = Config::new("/plugin", dir.path()).load_overrides().unwrap();
        assert_eq!(config.hook_timeout, Duration::from_secs(3));
        assert_eq!(config.lock_timeout, Duration::from_millis(2000));
        assert_eq!(config.protected_branches, vec!["release".to_string()]);
        assert!(config.commit_pattern.is_match("JIRA-12 fix login"));
        assert_eq!(config.sandbox_extra_roots, vec![PathBuf::from("/opt/shared")]);
    }

    #[test]
    fn bad_commit_pattern_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".forge")).unwrap();
        fs::write(
            dir.path().join(".forge/config.json"),
            r#"{"commit_pattern": "(unclosed"}"#,
        )
        .unwrap();

        let err = Config::new("/plugin", dir.path()).load_overrides().unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }

    #[test]
    fn payload_cwd_overrides_project_dir() {
        let config = Config::new("/plugin", "/project");
        let input = HookInput::parse(r#"{"cwd":"/elsewhere"}"#).unwrap();
        assert_eq!(config.project_root_for(&input), PathBuf::from("/elsewhere"));
        assert_eq!(config.runtime_dir(), PathBuf::from("/project/.forge"));

        let input = HookInput::parse("{}").unwrap();
        assert_eq!(config.project_root_for(&input), PathBuf::from("/project"));
    }

    #[test]
    fn resolve_existing_prefers_plugin_root() {
        let plugin = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::create_dir_all(plugin.path().join("memory")).unwrap();
        fs::write(plugin.path().join("memory/a.md"), "x").unwrap();
        fs::create_dir_all(project.path().join("memory")).unwrap();
        fs::write(project.path().join("memory/b.md"), "x").unwrap();

        let config = Config::new(plugin.path(), project.path());
        assert_eq!(
            config.resolve_existing("memory/a.md", project.path()),
            Some(plugin.path().join("memory/a.md"))
        );
        assert_eq!(
            config.resolve_existing("memory/b.md", project.path()),
            Some(project.path().join("memory/b.md"))
        );
        assert_eq!(config.resolve_existing("memory/c.md", project.path()), None);
    }
}
