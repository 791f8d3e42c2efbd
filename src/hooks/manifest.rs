//! Hook registration manifest.
//!
//! Same shape the host runtime uses for its own hook settings, plus an
//! explicit `criticality` per hook:
//!
//! ```json
//! {"hooks": {"PreToolUse": [{"matcher": "Bash|Read", "hooks": [
//!   {"type": "command", "command": "${CLAUDE_PLUGIN_ROOT}/bin/forge-hooks hook sandbox-guard",
//!    "criticality": "critical", "timeout": 5}
//! ]}]}}
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::decision::Criticality;
use super::types::HookEvent;
use crate::error::ManifestError;

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    hooks: BTreeMap<String, Vec<RawGroup>>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    matcher: Option<String>,
    #[serde(default)]
    hooks: Vec<RawHook>,
}

#[derive(Debug, Deserialize)]
struct RawHook {
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    criticality: Option<Criticality>,
    #[serde(default)]
    name: Option<String>,
}

fn default_kind() -> String {
    "command".to_string()
}

/// Which tool names a registration applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Any,
    Tools(Vec<String>),
}

impl Matcher {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("*") => Matcher::Any,
            Some(list) => Matcher::Tools(
                list.split('|')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
        }
    }

    /// Tool-less events (prompts, session events) match every registration.
    pub fn matches(&self, tool_name: Option<&str>) -> bool {
        match (self, tool_name) {
            (Matcher::Any, _) | (_, None) => true,
            (Matcher::Tools(tools), Some(name)) => tools.iter().any(|t| t == name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HookSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub matcher: Matcher,
    pub timeout: Option<Duration>,
    pub criticality: Criticality,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: BTreeMap<HookEvent, Vec<HookSpec>>,
}

impl Manifest {
    pub fn load(path: &Path, plugin_root: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, plugin_root)
    }

    /// Parse and validate. Every problem is collected before failing.
    pub fn parse(raw: &str, plugin_root: &Path) -> Result<Self, ManifestError> {
        let manifest: RawManifest = serde_json::from_str(raw)?;
        let mut problems = Vec::new();
        let mut entries: BTreeMap<HookEvent, Vec<HookSpec>> = BTreeMap::new();

        for (event_name, groups) in manifest.hooks {
            let Some(event) = HookEvent::from_arg(&event_name) else {
                problems.push(format!("unknown event type `{}`", event_name));
                continue;
            };

            for (gi, group) in groups.into_iter().enumerate() {
                let matcher = Matcher::parse(group.matcher.as_deref());
                for (hi, hook) in group.hooks.into_iter().enumerate() {
                    let at = format!("{}[{}].hooks[{}]", event_name, gi, hi);
                    match build_spec(hook, matcher.clone(), plugin_root) {
                        Ok(spec) => entries.entry(event).or_default().push(spec),
                        Err(mut errs) => {
                            problems.extend(errs.drain(..).map(|e| format!("{}: {}", at, e)))
                        }
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(Self { entries })
        } else {
            Err(ManifestError::Invalid(problems))
        }
    }

    /// Registered hooks for an event, in registration order, filtered by
    /// tool name.
    pub fn hooks_for<'a>(
        &'a self,
        event: HookEvent,
        tool_name: Option<&'a str>,
    ) -> impl Iterator<Item = &'a HookSpec> + 'a {
        self.entries
            .get(&event)
            .into_iter()
            .flatten()
            .filter(move |spec| spec.matcher.matches(tool_name))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> impl Iterator<Item = (HookEvent, usize)> + '_ {
        self.entries.iter().map(|(e, hooks)| (*e, hooks.len()))
    }
}

fn build_spec(
    hook: RawHook,
    matcher: Matcher,
    plugin_root: &Path,
) -> Result<HookSpec, Vec<String>> {
    let mut errs = Vec::new();

    if hook.kind != "command" {
        errs.push(format!("unsupported hook type `{}`", hook.kind));
    }
    if hook.criticality.is_none() {
        errs.push("missing `criticality` (critical|advisory)".to_string());
    }

    let expanded = expand_plugin_root(&hook.command, plugin_root);
    let mut words = expanded.split_whitespace().map(str::to_string);
    let program = match words.next() {
        Some(first) => resolve_program(&first, plugin_root),
        None => {
            errs.push("empty `command`".to_string());
            PathBuf::new()
        }
    };
    let args: Vec<String> = words.collect();

    if !program.as_os_str().is_empty() && !is_executable(&program) {
        errs.push(format!("`{}` is not an executable file", program.display()));
    }
    if hook.timeout == Some(0) {
        errs.push("`timeout` must be positive".to_string());
    }

    match (errs.is_empty(), hook.criticality) {
        (true, Some(criticality)) => Ok(HookSpec {
            name: hook
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| default_name(&program, &args)),
            program,
            args,
            matcher,
            timeout: hook.timeout.map(Duration::from_secs),
            criticality,
        }),
        _ => Err(errs),
    }
}

fn expand_plugin_root(command: &str, plugin_root: &Path) -> String {
    let root = plugin_root.to_string_lossy();
    command
        .replace("${CLAUDE_PLUGIN_ROOT}", &root)
        .replace("$CLAUDE_PLUGIN_ROOT", &root)
}

fn resolve_program(word: &str, plugin_root: &Path) -> PathBuf {
    let path = Path::new(word);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        plugin_root.join(path)
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// `forge-hooks hook sandbox-guard` is named `sandbox-guard`; a standalone
/// script is named after its file stem.
fn default_name(program: &Path, args: &[String]) -> String {
    match args {
        [sub, name, ..] if sub == "hook" => name.clone(),
        _ => program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_script(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn parses_groups_in_order() {
        let dir = TempDir::new().unwrap();
        make_script(dir.path(), "guard.sh", 0o755);
        make_script(dir.path(), "audit.sh", 0o755);

        let raw = json!({"hooks": {
            "PreToolUse": [
                {"matcher": "Bash|Read", "hooks": [
                    {"type": "command", "command": "${CLAUDE_PLUGIN_ROOT}/guard.sh --strict", "criticality": "critical", "timeout": 5}
                ]},
                {"hooks": [{"command": "audit.sh", "criticality": "advisory"}]}
            ]
        }})
        .to_string();

        let manifest = Manifest::parse(&raw, dir.path()).unwrap();
        assert_eq!(manifest.len(), 2);

        let bash: Vec<_> = manifest.hooks_for(HookEvent::PreToolUse, Some("Bash")).collect();
        assert_eq!(bash.len(), 2);
        assert_eq!(bash[0].name, "guard");
        assert_eq!(bash[0].args, vec!["--strict".to_string()]);
        assert_eq!(bash[0].timeout, Some(Duration::from_secs(5)));
        assert_eq!(bash[0].criticality, Criticality::Critical);
        assert_eq!(bash[1].program, dir.path().join("audit.sh"));
        assert_eq!(bash[1].criticality, Criticality::Advisory);

        let write: Vec<_> = manifest.hooks_for(HookEvent::PreToolUse, Some("Write")).collect();
        assert_eq!(write.len(), 1);
        assert_eq!(write[0].name, "audit");

        assert_eq!(manifest.hooks_for(HookEvent::Stop, None).count(), 0);
    }

    #[test]
    fn builtin_hook_named_after_subcommand() {
        let dir = TempDir::new().unwrap();
        make_script(dir.path(), "forge-hooks", 0o755);
        let raw = json!({"hooks": {"UserPromptSubmit": [{"hooks": [
            {"command": "forge-hooks hook pii-redactor", "criticality": "critical"}
        ]}]}})
        .to_string();
        let manifest = Manifest::parse(&raw, dir.path()).unwrap();
        let hooks: Vec<_> = manifest.hooks_for(HookEvent::UserPromptSubmit, None).collect();
        assert_eq!(hooks[0].name, "pii-redactor");
    }

    #[test]
    fn rejects_unknown_event_and_missing_executable() {
        let dir = TempDir::new().unwrap();
        make_script(dir.path(), "not-exec.sh", 0o644);
        let raw = json!({"hooks": {
            "Notification": [{"hooks": [{"command": "x.sh", "criticality": "advisory"}]}],
            "Stop": [{"hooks": [
                {"command": "missing.sh", "criticality": "advisory"},
                {"command": "not-exec.sh", "criticality": "advisory"},
                {"command": "not-exec.sh"},
                {"type": "prompt", "command": "", "criticality": "advisory"}
            ]}]
        }})
        .to_string();

        let Err(ManifestError::Invalid(problems)) = Manifest::parse(&raw, dir.path()) else {
            panic!("manifest should be rejected");
        };
        let all = problems.join("\n");
        assert!(all.contains("unknown event type `Notification`"));
        assert!(all.contains("missing.sh` is not an executable file"));
        assert!(all.contains("not-exec.sh` is not an executable file"));
        assert!(all.contains("missing `criticality`"));
        assert!(all.contains("unsupported hook type `prompt`"));
        assert!(all.contains("empty `command`"));
    }

    #[test]
    fn directory_is_not_executable() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        let raw = json!({"hooks": {"Stop": [{"hooks": [{"command": "bin", "criticality": "advisory"}]}]}})
            .to_string();
        assert!(matches!(
            Manifest::parse(&raw, dir.path()),
            Err(ManifestError::Invalid(_))
        ));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        assert!(matches!(
            Manifest::parse("{not json", Path::new("/")),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn matcher_semantics() {
        assert!(Matcher::parse(None).matches(Some("Bash")));
        assert!(Matcher::parse(Some("*")).matches(Some("Bash")));
        let m = Matcher::parse(Some("Write|Edit"));
        assert!(m.matches(Some("Edit")));
        assert!(!m.matches(Some("Bash")));
        assert!(!m.matches(Some("Writer")));
        assert!(m.matches(None));
    }
}
