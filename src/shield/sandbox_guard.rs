//! Host isolation: file tools stay inside the project, shell commands stay
//! away from home-directory secrets and system credential files.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{file_name, normalize_path, program_words, split_segments, static_regex};

/// Always reachable regardless of project root.
const ALWAYS_ALLOWED: &[&str] = &["/tmp", "/var/tmp", "/dev/null", "/private/tmp"];

/// Secrets files, matched against a bare file name.
const SENSITIVE_FILE_PATTERN: &str = r"(?i)^(\.env|\.env\..+|.+\.pem|.+\.key|.+\.p12|.+\.pfx|\.npmrc|\.pypirc|\.netrc|\.htpasswd|\.git-credentials|credentials\.(json|ya?ml)|service-account.*\.json|id_rsa.*|id_ed25519.*|id_ecdsa.*)$";

/// Home-directory secrets referenced from a shell command.
const HOME_SECRET_PATTERN: &str = r"(~|\$HOME|\$\{HOME\})/(\.ssh|\.gnupg|\.aws|\.kube|\.docker|\.config|\.bashrc|\.bash_profile|\.zshrc|\.profile)(/|\s|$|['\x22;|&])";

const SYSTEM_FILE_PATTERN: &str = r"/etc/(passwd|shadow|hosts|sudoers|gshadow)\b";

/// Home-directory secrets by absolute path, e.g. `/home/u/.ssh/id_rsa`.
const ABS_HOME_SECRET_PATTERN: &str = r"^/(home/[^/]+|Users/[^/]+|root)/(\.ssh|\.gnupg|\.aws|\.kube|\.docker|\.bashrc|\.bash_profile|\.zshrc|\.profile)(/|$)";

static SENSITIVE_FILE_RE: OnceLock<Regex> = OnceLock::new();
static HOME_SECRET_RE: OnceLock<Regex> = OnceLock::new();
static SYSTEM_FILE_RE: OnceLock<Regex> = OnceLock::new();
static ABS_HOME_SECRET_RE: OnceLock<Regex> = OnceLock::new();

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let project_root = config.project_root_for(input);
    let decision = match input.tool_name() {
        Some("Read" | "Write" | "Edit" | "MultiEdit" | "NotebookEdit") => match input.file_path() {
            Some(path) => check_file(path, &project_root, &config.sandbox_extra_roots),
            None => PolicyDecision::allow(),
        },
        Some("Bash") => match input.command() {
            Some(command) => check_command(command),
            None => PolicyDecision::allow(),
        },
        _ => PolicyDecision::allow(),
    };
    Ok(decision)
}

/// Path checks for file tools.
pub fn check_file(path: &str, project_root: &Path, extra_roots: &[PathBuf]) -> PolicyDecision {
    if is_sensitive_name(file_name(path)) {
        return PolicyDecision::deny(format!(
            "Sandbox: access to secrets/credentials file `{}` is blocked",
            path
        ));
    }

    let resolved = normalize_path(project_root, path);
    if static_regex(&SYSTEM_FILE_RE, SYSTEM_FILE_PATTERN).is_match(&resolved.to_string_lossy())
        || static_regex(&ABS_HOME_SECRET_RE, ABS_HOME_SECRET_PATTERN)
            .is_match(&resolved.to_string_lossy())
    {
        return PolicyDecision::deny(format!(
            "Sandbox: `{}` is a system credential or home-directory secret and is outside the project directory",
            resolved.display()
        ));
    }

    let inside = resolved.starts_with(project_root)
        || ALWAYS_ALLOWED.iter().any(|root| resolved.starts_with(root))
        || extra_roots.iter().any(|root| resolved.starts_with(root));
    if inside {
        PolicyDecision::allow()
    } else {
        PolicyDecision::deny(format!(
            "Sandbox: `{}` is outside the project directory ({})",
            resolved.display(),
            project_root.display()
        ))
    }
}

/// Pattern checks for shell commands.
pub fn check_command(command: &str) -> PolicyDecision {
    if let Some(m) = static_regex(&HOME_SECRET_RE, HOME_SECRET_PATTERN).find(command) {
        return PolicyDecision::deny(format!(
            "Sandbox: command touches home-directory secrets (`{}`)",
            m.as_str().trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_')
        ));
    }
    if let Some(m) = static_regex(&SYSTEM_FILE_RE, SYSTEM_FILE_PATTERN).find(command) {
        return PolicyDecision::deny(format!(
            "Sandbox: command touches system credential file `{}`",
            m.as_str()
        ));
    }

    for segment in split_segments(command) {
        let words = program_words(&segment);
        if is_rm_root(&words) {
            return PolicyDecision::deny("Sandbox: recursive delete of the filesystem root is blocked");
        }
        if let Some(word) = words
            .iter()
            .skip(1)
            .find(|w| !w.starts_with('-') && is_sensitive_name(file_name(w)))
        {
            return PolicyDecision::deny(format!(
                "Sandbox: command references secrets/credentials file `{}`",
                word
            ));
        }
    }
    PolicyDecision::allow()
}

fn is_sensitive_name(name: &str) -> bool {
    // `.env.example`-style templates carry no secrets.
    if name.ends_with(".example") || name.ends_with(".sample") || name.ends_with(".template") {
        return false;
    }
    static_regex(&SENSITIVE_FILE_RE, SENSITIVE_FILE_PATTERN).is_match(name)
}

fn is_rm_root(words: &[String]) -> bool {
    let Some((program, rest)) = words.split_first() else {
        return false;
    };
    if file_name(program) != "rm" {
        return false;
    }
    let recursive = rest.iter().any(|w| {
        w == "--recursive" || (w.starts_with('-') && !w.starts_with("--") && w.contains(['r', 'R']))
    });
    recursive && rest.iter().any(|w| w == "/" || w == "/*")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROOT: &str = "/work/project";

    fn run(payload: serde_json::Value) -> PolicyDecision {
        let config = Config::new("/plugin", ROOT);
        let input = HookInput::parse(&payload.to_string()).unwrap();
        handle(&config, &input).unwrap()
    }

    fn read(path: &str) -> PolicyDecision {
        run(json!({"tool_name": "Read", "tool_input": {"file_path": path}, "cwd": ROOT}))
    }

    fn bash(command: &str) -> PolicyDecision {
        run(json!({"tool_name": "Bash", "tool_input": {"command": command}, "cwd": ROOT}))
    }

    #[test]
    fn project_paths_allowed() {
        assert!(!read("src/main.py").is_deny());
        assert!(!read("/work/project/src/main.py").is_deny());
        assert!(!run(json!({"tool_name": "Write", "tool_input": {"file_path": "/work/project/out.txt"}, "cwd": ROOT})).is_deny());
        assert!(!run(json!({"tool_name": "Edit", "tool_input": {"file_path": "/work/project/README.md"}, "cwd": ROOT})).is_deny());
    }

    #[test]
    fn temp_paths_allowed() {
        assert!(!read("/tmp/test_output.txt").is_deny());
        assert!(!read("/var/tmp/cache.dat").is_deny());
        assert!(!read("/dev/null").is_deny());
    }

    #[test]
    fn missing_file_path_allowed() {
        assert!(!run(json!({"tool_name": "Read", "tool_input": {}})).is_deny());
        assert!(!run(json!({"tool_name": "Read"})).is_deny());
    }

    #[test]
    fn outside_paths_denied() {
        for path in [
            "/etc/passwd",
            "/home/user/.ssh/id_rsa",
            "/etc/hosts",
            "/home/user/.bashrc",
            "/home/user/other-project/secrets.py",
            "../sibling/file.rs",
        ] {
            let d = read(path);
            assert!(d.is_deny(), "{} should be denied", path);
        }
        let reason = read("/home/user/other-project/secrets.py").reason.unwrap();
        assert!(reason.contains("outside the project directory"));
    }

    #[test]
    fn traversal_is_resolved() {
        assert!(read("src/../../../etc/shadow").is_deny());
        assert!(!read("src/../lib/mod.rs").is_deny());
    }

    #[test]
    fn sensitive_files_denied_inside_project() {
        for name in [
            ".env",
            ".env.local",
            "certs/server.pem",
            "ssl/private.key",
            ".npmrc",
            ".pypirc",
            "credentials.json",
            "service-account-key.json",
            ".netrc",
            ".git-credentials",
            ".htpasswd",
        ] {
            let d = read(&format!("{}/{}", ROOT, name));
            assert!(d.is_deny(), "{} should be denied", name);
            let reason = d.reason.unwrap().to_lowercase();
            assert!(reason.contains("secrets") || reason.contains("credentials"));
        }
    }

    #[test]
    fn env_templates_allowed() {
        assert!(!read(".env.example").is_deny());
    }

    #[test]
    fn extra_roots_allowed() {
        let mut config = Config::new("/plugin", ROOT);
        config.sandbox_extra_roots = vec![PathBuf::from("/opt/shared")];
        let input = HookInput::parse(
            &json!({"tool_name": "Read", "tool_input": {"file_path": "/opt/shared/a.txt"}}).to_string(),
        )
        .unwrap();
        assert!(!handle(&config, &input).unwrap().is_deny());
    }

    #[test]
    fn harmless_commands_allowed() {
        for cmd in [
            "ls -la src/",
            "python3 -c 'print(1+1)'",
            "echo hello",
            "grep -r 'TODO' src/",
            "rm -rf build/",
            "cat .env.example",
        ] {
            assert!(!bash(cmd).is_deny(), "{} should be allowed", cmd);
        }
        assert!(!run(json!({"tool_name": "Bash", "tool_input": {"command": ""}})).is_deny());
        assert!(!run(json!({"tool_name": "Glob", "tool_input": {"pattern": "**/*"}})).is_deny());
    }

    #[test]
    fn home_secrets_in_commands_denied() {
        for dir in ["~/.ssh", "~/.aws", "~/.gnupg", "$HOME/.kube", "~/.docker", "~/.config"] {
            assert!(bash(&format!("cat {}/config", dir)).is_deny(), "{}", dir);
        }
        assert!(bash("cat ~/.bashrc").is_deny());
        assert!(bash("echo x >> ~/.zshrc").is_deny());
        assert!(!bash("cat ~/.sshd_notes").is_deny());
    }

    #[test]
    fn system_files_in_commands_denied() {
        for path in ["/etc/passwd", "/etc/shadow", "/etc/hosts", "/etc/sudoers"] {
            assert!(bash(&format!("cat {}", path)).is_deny(), "{}", path);
        }
    }

    #[test]
    fn sensitive_files_in_commands_denied() {
        for pattern in [".env", ".env.production", "server.pem", "private.key", "credentials.json", ".npmrc"] {
            assert!(bash(&format!("cat project/{}", pattern)).is_deny(), "{}", pattern);
        }
    }

    #[test]
    fn rm_rf_root_denied() {
        assert!(bash("rm -rf /").is_deny());
        assert!(bash("sudo rm -fr /*").is_deny());
        assert!(bash("echo hi && rm --recursive --force /").is_deny());
        assert!(!bash("rm -f /tmp/x").is_deny());
    }
}
