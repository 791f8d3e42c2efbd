use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::decision::{Criticality, Decision, PolicyDecision};
use super::manifest::{HookSpec, Manifest};
use super::types::{Event, HookEvent, HookInput};
use crate::config::Config;
use crate::error::DispatchError;
use crate::health_buffer::{HealthBuffer, Severity};

/// What one hook invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Decided(PolicyDecision),
    /// Exit 0 with empty stdout.
    NoOpinion,
    /// Spawn failure, timeout, non-zero exit or a protocol violation.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct HookReport {
    pub name: String,
    pub criticality: Criticality,
    pub outcome: HookOutcome,
    pub elapsed: Duration,
}

impl HookReport {
    /// The decision this report contributes after applying criticality.
    pub fn effective(&self) -> PolicyDecision {
        match &self.outcome {
            HookOutcome::Decided(decision) => decision.clone(),
            HookOutcome::NoOpinion => PolicyDecision::allow(),
            HookOutcome::Failed(cause) => self.criticality.fallback(&self.name, cause),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateDecision {
    pub decision: PolicyDecision,
    pub reports: Vec<HookReport>,
}

/// Runs the hooks registered for an event, one after another.
pub struct Dispatcher<'a> {
    config: &'a Config,
    manifest: &'a Manifest,
    health: HealthBuffer,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a Config, manifest: &'a Manifest) -> Self {
        let health = HealthBuffer::with_config(&config.runtime_dir(), config);
        Self {
            config,
            manifest,
            health,
        }
    }

    pub async fn dispatch(&self, event: &Event) -> AggregateDecision {
        let payload = event.stdin_json();
        let mut reports = Vec::new();

        for spec in self
            .manifest
            .hooks_for(event.kind, event.tool_name.as_deref())
        {
            let started = Instant::now();
            let outcome = self.run_hook(spec, payload.as_bytes()).await;
            let report = HookReport {
                name: spec.name.clone(),
                criticality: spec.criticality,
                outcome,
                elapsed: started.elapsed(),
            };
            self.log_report(event.kind, &report);
            reports.push(report);
        }

        AggregateDecision {
            decision: aggregate(reports.iter().map(HookReport::effective)),
            reports,
        }
    }

    /// Entry point for raw stdin. Malformed event JSON cannot be forwarded,
    /// so every candidate hook contributes its criticality fallback.
    pub async fn dispatch_raw(&self, kind: HookEvent, raw: &str) -> AggregateDecision {
        match HookInput::parse(raw) {
            Ok(input) => self.dispatch(&Event::new(kind, input)).await,
            Err(e) => {
                let cause = format!("malformed event JSON: {}", e);
                let reports: Vec<HookReport> = self
                    .manifest
                    .hooks_for(kind, None)
                    .map(|spec| HookReport {
                        name: spec.name.clone(),
                        criticality: spec.criticality,
                        outcome: HookOutcome::Failed(cause.clone()),
                        elapsed: Duration::ZERO,
                    })
                    .collect();
                self.health
                    .record("dispatcher", Severity::Error, format!("{}: {}", kind, cause));
                AggregateDecision {
                    decision: aggregate(reports.iter().map(HookReport::effective)),
                    reports,
                }
            }
        }
    }

    async fn run_hook(&self, spec: &HookSpec, payload: &[u8]) -> HookOutcome {
        let limit = spec.timeout.unwrap_or(self.config.hook_timeout);

        let mut child = match Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&self.config.project_dir)
            .env("CLAUDE_PLUGIN_ROOT", &self.config.plugin_root)
            .env("CLAUDE_PROJECT_DIR", &self.config.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return HookOutcome::Failed(format!("failed to spawn: {}", e)),
        };

        let stdin = child.stdin.take();
        let run = async move {
            if let Some(mut stdin) = stdin {
                // A hook may exit without reading stdin; that is not an error.
                if let Err(e) = stdin.write_all(payload).await {
                    tracing::debug!(error = %e, "hook did not read stdin");
                }
                drop(stdin);
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(limit, run).await {
            Err(_) => {
                return HookOutcome::Failed(format!("timed out after {}s", limit.as_secs_f32()));
            }
            Ok(Err(e)) => return HookOutcome::Failed(format!("wait failed: {}", e)),
            Ok(Ok(output)) => output,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!(hook = %spec.name, stderr = %stderr.trim(), "hook stderr");
        }

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return HookOutcome::Failed(format!("exited with status {}", code));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match PolicyDecision::from_stdout(&stdout) {
            Ok(Some(decision)) => HookOutcome::Decided(decision),
            Ok(None) => HookOutcome::NoOpinion,
            Err(violation) => HookOutcome::Failed(violation.0),
        }
    }

    fn log_report(&self, event: HookEvent, report: &HookReport) {
        match &report.outcome {
            HookOutcome::Failed(cause) => {
                tracing::warn!(hook = %report.name, %event, cause = %cause, "hook failed");
                let verdict = match report.criticality {
                    Criticality::Critical => "failed closed",
                    Criticality::Advisory => "failed open",
                };
                self.health.record(
                    &report.name,
                    Severity::Error,
                    format!("{} on {}: {}", verdict, event, cause),
                );
            }
            outcome => {
                tracing::debug!(
                    hook = %report.name,
                    %event,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    ?outcome,
                    "hook finished"
                );
            }
        }
    }
}

/// Most restrictive decision wins. Deny reasons and context strings are
/// concatenated in registration order.
pub fn aggregate(decisions: impl IntoIterator<Item = PolicyDecision>) -> PolicyDecision {
    let mut verdict = Decision::Allow;
    let mut reasons = Vec::new();
    let mut contexts = Vec::new();

    for decision in decisions {
        verdict = verdict.max(decision.decision);
        if decision.is_deny() {
            if let Some(reason) = decision.reason {
                reasons.push(reason);
            }
        }
        if let Some(context) = decision.additional_context.filter(|c| !c.trim().is_empty()) {
            contexts.push(context);
        }
    }

    let additional_context = (!contexts.is_empty()).then(|| contexts.join("\n\n"));
    match verdict {
        Decision::Deny => PolicyDecision {
            decision: Decision::Deny,
            reason: Some(reasons.join("\n")),
            additional_context,
        },
        Decision::Warn | Decision::Allow => PolicyDecision {
            decision: if additional_context.is_some() {
                Decision::Warn
            } else {
                Decision::Allow
            },
            reason: None,
            additional_context,
        },
    }
}

/// CLI entry: load the manifest, dispatch stdin, render the aggregate.
/// Unknown events and invalid manifests are configuration errors.
pub fn dispatch_from_cli(
    config: &Config,
    event_name: &str,
    stdin_json: &str,
) -> Result<(String, i32), DispatchError> {
    let event: HookEvent = event_name.parse()?;
    let manifest = Manifest::load(&config.manifest_path, &config.plugin_root)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DispatchError::Runtime)?;

    let dispatcher = Dispatcher::new(config, &manifest);
    let result = runtime.block_on(dispatcher.dispatch_raw(event, stdin_json));
    Ok((result.decision.render(Some(event)), 0))
}
