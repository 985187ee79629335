use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type ContextId = String;
pub type EventId = String;
pub type ToolId = String;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    #[serde(alias = "pending", alias = "started")]
    Running,
    #[serde(alias = "complete", alias = "done", alias = "success")]
    Completed,
    #[serde(alias = "error", alias = "failed", alias = "exception")]
    Errored,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl Default for ContextStatus {
    fn default() -> Self {
        ContextStatus::Running
    }
}

impl ContextStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ContextStatus::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            ContextStatus::Running => "running",
            ContextStatus::Completed => "completed",
            ContextStatus::Errored => "errored",
            ContextStatus::Cancelled => "cancelled",
        }
    }
}

/// How a context entered the store.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrigin {
    /// Announced by a `context` message.
    Declared,
    /// Created implicitly for an event or child whose context has not
    /// been announced yet.
    Placeholder,
    /// A placeholder whose announcement never arrived within the grace
    /// window; it stays an unparented root for the rest of the session.
    Orphaned,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Context {
    pub id: ContextId,
    pub parent_id: Option<ContextId>,
    pub children: Vec<ContextId>,
    pub events: Vec<EventId>,
    pub label: String,
    pub status: ContextStatus,
    pub tool_id: Option<ToolId>,
    pub tool_name: Option<String>,
    pub args: Value,
    pub output: Value,
    pub error: Option<String>,
    pub created_at_ms: Option<i64>,
    pub closed_at_ms: Option<i64>,
    pub origin: ContextOrigin,
}

impl Context {
    pub(crate) fn new(id: ContextId, origin: ContextOrigin) -> Self {
        Self {
            id,
            parent_id: None,
            children: Vec::new(),
            events: Vec::new(),
            label: String::new(),
            status: ContextStatus::Running,
            tool_id: None,
            tool_name: None,
            args: Value::Null,
            output: Value::Null,
            error: None,
            created_at_ms: None,
            closed_at_ms: None,
            origin,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == ContextOrigin::Placeholder
    }

    /// Label shown in the tree: explicit label, then tool name, then id.
    pub fn display_label(&self) -> &str {
        if !self.label.trim().is_empty() {
            return &self.label;
        }
        self.tool_name
            .as_deref()
            .or(self.tool_id.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    ToolCalled,
    ToolReturn,
    ToolException,
    AgentPrompt,
    AgentLlmResponse,
    ChildContextCreated,
    ContextUpdate,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ToolCalled => "tool_called",
            EventKind::ToolReturn => "tool_return",
            EventKind::ToolException => "tool_exception",
            EventKind::AgentPrompt => "agent_prompt",
            EventKind::AgentLlmResponse => "agent_llm_response",
            EventKind::ChildContextCreated => "child_context_created",
            EventKind::ContextUpdate => "context_update",
            EventKind::Other(raw) => raw,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, EventKind::ToolException)
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "tool_called" | "tool_call" => EventKind::ToolCalled,
            "tool_return" | "tool_result" => EventKind::ToolReturn,
            "tool_exception" | "tool_error" => EventKind::ToolException,
            "agent_prompt" => EventKind::AgentPrompt,
            "agent_llm_response" | "llm_response" => EventKind::AgentLlmResponse,
            "child_context_created" | "child_context" => EventKind::ChildContextCreated,
            "context_update" => EventKind::ContextUpdate,
            _ => EventKind::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TraceEvent {
    pub id: EventId,
    pub context_id: ContextId,
    pub timestamp_ms: i64,
    pub kind: EventKind,
    pub payload: Value,
    /// Global arrival sequence assigned by the store.
    pub seq: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolArgument {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Tool {
    pub id: ToolId,
    pub name: String,
    pub description: Option<String>,
    pub args: Vec<ToolArgument>,
    pub context_count: usize,
    pub announced: bool,
}

/// Flattens a JSON value into searchable, displayable text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
