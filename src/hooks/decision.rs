//! Wire contract between the dispatcher and every hook.
//!
//! A hook answers on stdout with
//! `{"hookSpecificOutput": {"permissionDecision": "allow"|"deny", ...}}`.
//! Warnings travel as `allow` plus `additionalContext`. A plain allow is
//! encoded as no output at all.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::types::HookEvent;

/// Ordered from least to most restrictive, so `max` aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Warn,
    Deny,
}

/// How a hook's failure is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Security hooks: failure means deny.
    Critical,
    /// Memory, compliance and telemetry hooks: failure means allow.
    Advisory,
}

impl Criticality {
    /// Decision substituted when a hook produced no usable answer.
    pub fn fallback(self, hook: &str, cause: &str) -> PolicyDecision {
        match self {
            Criticality::Critical => {
                PolicyDecision::deny(format!("{} failed closed: {}", hook, cause))
            }
            Criticality::Advisory => PolicyDecision::allow(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reason: Option<String>,
    pub additional_context: Option<String>,
}

/// Stdout that is present but does not follow the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation(pub String);

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: None,
            additional_context: None,
        }
    }

    pub fn warn(context: impl Into<String>) -> Self {
        Self {
            decision: Decision::Warn,
            reason: None,
            additional_context: Some(context.into()),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            additional_context: None,
        }
    }

    /// Warn when there is anything to say, otherwise allow.
    pub fn warn_if_any(warnings: &[String]) -> Self {
        if warnings.is_empty() {
            Self::allow()
        } else {
            Self::warn(warnings.join("\n"))
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.additional_context = Some(context.into());
        self
    }

    pub fn is_deny(&self) -> bool {
        self.decision == Decision::Deny
    }

    /// JSON for stdout, or `None` for a plain allow.
    pub fn to_json(&self, event: Option<HookEvent>) -> Option<Value> {
        let context = self.additional_context.as_deref().filter(|c| !c.is_empty());
        if self.decision != Decision::Deny && context.is_none() {
            return None;
        }

        let mut specific = Map::new();
        if let Some(event) = event {
            specific.insert("hookEventName".into(), json!(event.as_str()));
        }
        let permission = if self.is_deny() { "deny" } else { "allow" };
        specific.insert("permissionDecision".into(), json!(permission));
        if let Some(reason) = self.reason.as_deref() {
            specific.insert("permissionDecisionReason".into(), json!(reason));
        }
        if let Some(context) = context {
            specific.insert("additionalContext".into(), json!(context));
        }

        let mut out = Map::new();
        out.insert("hookSpecificOutput".into(), Value::Object(specific));
        if let Some(context) = context {
            out.insert("additionalContext".into(), json!(context));
        }
        Some(Value::Object(out))
    }

    /// Stdout text: empty for a plain allow, one JSON line otherwise.
    pub fn render(&self, event: Option<HookEvent>) -> String {
        match self.to_json(event) {
            Some(value) => format!("{}\n", value),
            None => String::new(),
        }
    }

    /// Decode hook stdout. `Ok(None)` means the hook expressed no opinion.
    pub fn from_stdout(stdout: &str) -> Result<Option<Self>, ProtocolViolation> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| ProtocolViolation(format!("stdout is not JSON: {}", e)))?;
        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolViolation("stdout is not a JSON object".to_string()))?;

        let specific = obj.get("hookSpecificOutput").and_then(Value::as_object);
        let field = |key: &str| -> Option<String> {
            specific
                .and_then(|s| s.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let context = field("additionalContext").or_else(|| {
            obj.get("additionalContext")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        let reason = field("permissionDecisionReason");

        let decision = match field("permissionDecision").as_deref() {
            Some("deny") => Decision::Deny,
            Some("allow") | None if context.is_some() => Decision::Warn,
            Some("allow") | None => Decision::Allow,
            Some(other) => {
                return Err(ProtocolViolation(format!(
                    "unknown permissionDecision `{}`",
                    other
                )));
            }
        };

        Ok(Some(Self {
            decision,
            reason: if decision == Decision::Deny {
                reason.or_else(|| Some("denied by hook".to_string()))
            } else {
                reason
            },
            additional_context: context,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_order_is_restrictiveness() {
        assert!(Decision::Deny > Decision::Warn);
        assert!(Decision::Warn > Decision::Allow);
        assert_eq!(
            [Decision::Allow, Decision::Deny, Decision::Warn].into_iter().max(),
            Some(Decision::Deny)
        );
    }

    #[test]
    fn plain_allow_renders_nothing() {
        assert_eq!(PolicyDecision::allow().render(Some(HookEvent::PreToolUse)), "");
    }

    #[test]
    fn deny_renders_hook_specific_output() {
        let out = PolicyDecision::deny("nope")
            .to_json(Some(HookEvent::PreToolUse))
            .unwrap();
        assert_eq!(out["hookSpecificOutput"]["permissionDecision"], "deny");
        assert_eq!(out["hookSpecificOutput"]["permissionDecisionReason"], "nope");
        assert_eq!(out["hookSpecificOutput"]["hookEventName"], "PreToolUse");
        assert!(out.get("additionalContext").is_none());
    }

    #[test]
    fn warn_mirrors_context_at_top_level() {
        let out = PolicyDecision::warn("careful").to_json(None).unwrap();
        assert_eq!(out["hookSpecificOutput"]["permissionDecision"], "allow");
        assert_eq!(out["hookSpecificOutput"]["additionalContext"], "careful");
        assert_eq!(out["additionalContext"], "careful");
    }

    #[test]
    fn decode_empty_is_no_opinion() {
        assert_eq!(PolicyDecision::from_stdout("  \n"), Ok(None));
    }

    #[test]
    fn decode_deny_and_warn() {
        let deny = PolicyDecision::from_stdout(
            r#"{"hookSpecificOutput":{"permissionDecision":"deny","permissionDecisionReason":"blocked"}}"#,
        )
        .unwrap()
        .unwrap();
        assert!(deny.is_deny());
        assert_eq!(deny.reason.as_deref(), Some("blocked"));

        let warn = PolicyDecision::from_stdout(r#"{"additionalContext":"heads up"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(warn.decision, Decision::Warn);
        assert_eq!(warn.additional_context.as_deref(), Some("heads up"));
    }

    #[test]
    fn decode_deny_without_reason_gets_one() {
        let deny = PolicyDecision::from_stdout(r#"{"hookSpecificOutput":{"permissionDecision":"deny"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(deny.reason.as_deref(), Some("denied by hook"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(PolicyDecision::from_stdout("hello world").is_err());
        assert!(PolicyDecision::from_stdout("[1]").is_err());
        assert!(
            PolicyDecision::from_stdout(r#"{"hookSpecificOutput":{"permissionDecision":"maybe"}}"#)
                .is_err()
        );
    }

    #[test]
    fn render_then_decode_preserves_decision() {
        for decision in [
            PolicyDecision::deny("r"),
            PolicyDecision::warn("c"),
            PolicyDecision::deny("r").with_context("c"),
        ] {
            let text = decision.render(Some(HookEvent::Stop));
            assert_eq!(PolicyDecision::from_stdout(&text).unwrap(), Some(decision));
        }
    }

    #[test]
    fn fallback_follows_criticality() {
        let closed = Criticality::Critical.fallback("sandbox-guard", "timed out");
        assert!(closed.is_deny());
        assert!(closed.reason.unwrap().contains("sandbox-guard failed closed"));
        assert_eq!(Criticality::Advisory.fallback("x", "y"), PolicyDecision::allow());
    }
}
