//! Read gate for memory files: aging files warn, stale or unstamped files
//! are refused until refreshed.

use std::fs;

use chrono::NaiveDate;

use super::memory_file::{is_managed, parse_marker};
use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{normalize_path, today};

pub const FRESH_DAYS: i64 = 30;
pub const STALE_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Aging(i64),
    Stale(i64),
    Missing,
}

pub fn classify(last_updated: Option<NaiveDate>, today: NaiveDate) -> Freshness {
    let Some(updated) = last_updated else {
        return Freshness::Missing;
    };
    let age = (today - updated).num_days();
    if age <= FRESH_DAYS {
        Freshness::Fresh
    } else if age < STALE_DAYS {
        Freshness::Aging(age)
    } else {
        Freshness::Stale(age)
    }
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    let Some(path) = input.file_path().filter(|p| is_managed(p)) else {
        return Ok(PolicyDecision::allow());
    };
    let resolved = normalize_path(&config.project_root_for(input), path);
    let Ok(content) = fs::read_to_string(&resolved) else {
        return Ok(PolicyDecision::allow());
    };

    Ok(match classify(parse_marker(&content), today()) {
        Freshness::Fresh => PolicyDecision::allow(),
        Freshness::Aging(age) => PolicyDecision::warn(format!(
            "Memory freshness: {} is aging ({} days since last update). Verify it against the current code before relying on it.",
            path, age
        )),
        Freshness::Stale(age) => PolicyDecision::deny(format!(
            "Memory freshness: {} is stale ({} days old, limit {}). Re-validate and rewrite it to refresh the timestamp.",
            path, age, STALE_DAYS
        )),
        Freshness::Missing => PolicyDecision::deny(format!(
            "Memory freshness: {} has a missing timestamp (`<!-- Last Updated: YYYY-MM-DD -->` in the first 5 lines). Its age cannot be verified.",
            path
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;
    use chrono::Duration;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn read(root: &Path, path: &str) -> PolicyDecision {
        let config = Config::new("/plugin", root);
        let input = HookInput::parse(
            &json!({"tool_name": "Read", "tool_input": {"file_path": path}, "cwd": root}).to_string(),
        )
        .unwrap();
        handle(&config, &input).unwrap()
    }

    fn aged(dir: &TempDir, days: i64) -> String {
        let rel = "memory/projects/p/project_overview.md";
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let date = today() - Duration::days(days);
        fs::write(
            &path,
            format!("<!-- Last Updated: {} -->\n# Overview\n", date.format("%Y-%m-%d")),
        )
        .unwrap();
        rel.to_string()
    }

    #[test]
    fn boundaries() {
        let t = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let ago = |d| Some(t - Duration::days(d));
        assert_eq!(classify(ago(0), t), Freshness::Fresh);
        assert_eq!(classify(ago(30), t), Freshness::Fresh);
        assert_eq!(classify(ago(31), t), Freshness::Aging(31));
        assert_eq!(classify(ago(89), t), Freshness::Aging(89));
        assert_eq!(classify(ago(90), t), Freshness::Stale(90));
        assert_eq!(classify(None, t), Freshness::Missing);
        assert_eq!(classify(Some(t + Duration::days(3)), t), Freshness::Fresh);
    }

    #[test]
    fn fresh_file_silent() {
        let dir = TempDir::new().unwrap();
        for days in [0, 29] {
            let rel = aged(&dir, days);
            assert_eq!(read(dir.path(), &rel), PolicyDecision::allow());
        }
    }

    #[test]
    fn aging_file_warns() {
        let dir = TempDir::new().unwrap();
        for days in [31, 60, 89] {
            let rel = aged(&dir, days);
            let d = read(dir.path(), &rel);
            assert_eq!(d.decision, Decision::Warn);
            let ctx = d.additional_context.unwrap();
            assert!(ctx.contains("aging"));
            assert!(ctx.contains(&days.to_string()));
        }
    }

    #[test]
    fn stale_file_denied() {
        let dir = TempDir::new().unwrap();
        for days in [90, 180] {
            let rel = aged(&dir, days);
            let d = read(dir.path(), &rel);
            assert!(d.is_deny());
            let reason = d.reason.unwrap();
            assert!(reason.contains("stale"));
            assert!(reason.contains(&days.to_string()));
        }
    }

    #[test]
    fn missing_marker_denied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory/projects/p/notes.md");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "# Notes\nno timestamp\n").unwrap();

        let d = read(dir.path(), path.to_str().unwrap());
        assert!(d.is_deny());
        assert!(d.reason.unwrap().contains("missing timestamp"));
    }

    #[test]
    fn non_memory_and_operational_files_pass() {
        let dir = TempDir::new().unwrap();
        for path in ["src/main.rs", "context/python/index.md", "memory/index.md", "memory/lifecycle.md", "memory/quality_guidance.md", "memory/sync_log.md"] {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(&full, "no marker").unwrap();
            assert_eq!(read(dir.path(), path), PolicyDecision::allow(), "{}", path);
        }
    }

    #[test]
    fn nonexistent_file_allowed() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read(dir.path(), "memory/projects/x/gone.md"), PolicyDecision::allow());
    }
}
