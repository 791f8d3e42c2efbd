use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

/// Lifecycle events the host runtime fires at hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    SessionStart,
    UserPromptSubmit,
    Stop,
    PreCompact,
    TaskCompleted,
    SubagentStart,
    SessionEnd,
}

impl HookEvent {
    pub const ALL: [HookEvent; 9] = [
        HookEvent::PreToolUse,
        HookEvent::PostToolUse,
        HookEvent::SessionStart,
        HookEvent::UserPromptSubmit,
        HookEvent::Stop,
        HookEvent::PreCompact,
        HookEvent::TaskCompleted,
        HookEvent::SubagentStart,
        HookEvent::SessionEnd,
    ];

    /// Parse an event name (case-insensitive, accepts kebab and snake case).
    pub fn from_arg(s: &str) -> Option<HookEvent> {
        match s.to_lowercase().as_str() {
            "pretooluse" | "pre-tool-use" | "pre_tool_use" => Some(HookEvent::PreToolUse),
            "posttooluse" | "post-tool-use" | "post_tool_use" => Some(HookEvent::PostToolUse),
            "sessionstart" | "session-start" | "session_start" => Some(HookEvent::SessionStart),
            "userpromptsubmit" | "user-prompt-submit" | "user_prompt_submit" => {
                Some(HookEvent::UserPromptSubmit)
            }
            "stop" => Some(HookEvent::Stop),
            "precompact" | "pre-compact" | "pre_compact" => Some(HookEvent::PreCompact),
            "taskcompleted" | "task-completed" | "task_completed" => Some(HookEvent::TaskCompleted),
            "subagentstart" | "subagent-start" | "subagent_start" => Some(HookEvent::SubagentStart),
            "sessionend" | "session-end" | "session_end" => Some(HookEvent::SessionEnd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PreToolUse => "PreToolUse",
            HookEvent::PostToolUse => "PostToolUse",
            HookEvent::SessionStart => "SessionStart",
            HookEvent::UserPromptSubmit => "UserPromptSubmit",
            HookEvent::Stop => "Stop",
            HookEvent::PreCompact => "PreCompact",
            HookEvent::TaskCompleted => "TaskCompleted",
            HookEvent::SubagentStart => "SubagentStart",
            HookEvent::SessionEnd => "SessionEnd",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookEvent::from_arg(s).ok_or_else(|| DispatchError::UnknownEvent(s.to_string()))
    }
}

/// Raw JSON object read from hook stdin. Kept as a `Value` so each handler
/// picks out only the fields it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookInput {
    #[serde(flatten)]
    pub data: Value,
}

impl HookInput {
    /// Parse stdin. Anything but a JSON object is malformed input.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Non-empty top-level string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn bool_field(&self, key: &str) -> bool {
        self.data.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Non-empty string field inside `tool_input`.
    pub fn tool_input_str(&self, key: &str) -> Option<&str> {
        self.data
            .get("tool_input")
            .and_then(|ti| ti.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn event(&self) -> Option<HookEvent> {
        self.str_field("hook_event_name").and_then(HookEvent::from_arg)
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.str_field("tool_name")
    }

    pub fn file_path(&self) -> Option<&str> {
        self.tool_input_str("file_path")
    }

    pub fn command(&self) -> Option<&str> {
        self.tool_input_str("command")
    }

    pub fn cwd(&self) -> Option<&str> {
        self.str_field("cwd")
    }

    pub fn transcript_path(&self) -> Option<&str> {
        self.str_field("transcript_path")
    }

    pub fn session_id(&self) -> Option<&str> {
        self.str_field("session_id")
    }
}

/// One event as the dispatcher sees it. Built per invocation, never stored.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: HookEvent,
    pub payload: Value,
    pub tool_name: Option<String>,
    pub file_path: Option<String>,
    pub command: Option<String>,
}

impl Event {
    pub fn new(kind: HookEvent, input: HookInput) -> Self {
        let tool_name = input.tool_name().map(str::to_string);
        let file_path = input.file_path().map(str::to_string);
        let command = input.command().map(str::to_string);
        Self {
            kind,
            payload: input.data,
            tool_name,
            file_path,
            command,
        }
    }

    /// JSON written to each hook's stdin: the host payload tagged with the
    /// event name.
    pub fn stdin_json(&self) -> String {
        let mut payload = self.payload.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert(
                "hook_event_name".to_string(),
                Value::String(self.kind.as_str().to_string()),
            );
        }
        payload.to_string()
    }
}
