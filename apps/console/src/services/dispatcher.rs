use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull, DisplayFromStr, PickFirst};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ContextStatus, EventKind, ToolArgument};
use crate::registry::ToolAnnouncement;
use crate::store::{
    AppendOutcome, CloseSpec, ContextSpec, CreateOutcome, EventSpec, StoreError, TraceStore,
};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("message has no `type` field")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("malformed `{kind}` message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("`{kind}` message rejected: {source}")]
    Rejected {
        kind: &'static str,
        #[source]
        source: StoreError,
    },
}

/// A decoded inbound record.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceMessage {
    ContextCreated(ContextSpec),
    ContextClosed(CloseSpec),
    EventAppended(EventSpec),
    ToolObserved(ToolAnnouncement),
}

impl TraceMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            TraceMessage::ContextCreated(_) => CONTEXT,
            TraceMessage::ContextClosed(_) => CONTEXT_CLOSED,
            TraceMessage::EventAppended(_) => EVENT,
            TraceMessage::ToolObserved(_) => TOOL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    ContextCreated(CreateOutcome),
    ContextClosed,
    EventAppended(AppendOutcome),
    ToolObserved,
}

const CONTEXT: &str = "context";
const CONTEXT_CLOSED: &str = "context_closed";
const EVENT: &str = "event";
const TOOL: &str = "tool";

const DEFAULT_PLACEHOLDER_GRACE_MS: u64 = 30_000;

/// Turns raw stream messages into store mutations, one message at a time.
///
/// Holds configuration only; nothing from a message outlives `dispatch`.
#[derive(Clone, Copy, Debug)]
pub struct EventDispatcher {
    placeholder_grace_ms: i64,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_PLACEHOLDER_GRACE_MS))
    }
}

impl EventDispatcher {
    pub fn new(placeholder_grace: Duration) -> Self {
        Self {
            placeholder_grace_ms: i64::try_from(placeholder_grace.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Decodes and applies one message. Failures are logged and leave the
    /// store untouched so the next message is processed normally.
    pub fn dispatch(&self, store: &mut TraceStore, raw: &str) -> Result<Applied, DispatchError> {
        let message = Self::decode(raw).map_err(|err| {
            warn!(error = %err, bytes = raw.len(), "skipping undecodable trace message");
            DispatchError::from(err)
        })?;

        let kind = message.kind();
        let applied = self.apply(store, message).map_err(|source| {
            warn!(kind, error = %source, "skipping rejected trace message");
            DispatchError::Rejected { kind, source }
        })?;
        debug!(kind, ?applied, "applied trace message");

        let promoted = store.promote_stale_placeholders(self.placeholder_grace_ms);
        if !promoted.is_empty() {
            debug!(count = promoted.len(), "promoted stale placeholders");
        }
        Ok(applied)
    }

    pub fn decode(raw: &str) -> Result<TraceMessage, DecodeError> {
        let json: Value = serde_json::from_str(raw).map_err(DecodeError::InvalidJson)?;
        let kind = json
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?;
        let mut data = json.get("data").cloned().unwrap_or(Value::Null);

        match kind {
            CONTEXT => {
                let record: ContextRecord = parse(CONTEXT, data)?;
                Ok(TraceMessage::ContextCreated(record.into()))
            }
            CONTEXT_CLOSED => {
                let record: CloseRecord = parse(CONTEXT_CLOSED, data)?;
                Ok(TraceMessage::ContextClosed(record.into()))
            }
            EVENT => {
                // some producers put the owning context beside `data`
                if let (Some(body), Some(context_id)) = (data.as_object_mut(), json.get("context_id")) {
                    body.entry("context_id").or_insert_with(|| context_id.clone());
                }
                let record: EventRecord = parse(EVENT, data)?;
                Ok(TraceMessage::EventAppended(record.into()))
            }
            TOOL => {
                let record: ToolRecord = parse(TOOL, data)?;
                Ok(TraceMessage::ToolObserved(record.into()))
            }
            other => Err(DecodeError::UnknownType(other.to_string())),
        }
    }

    pub fn apply(&self, store: &mut TraceStore, message: TraceMessage) -> Result<Applied, StoreError> {
        match message {
            TraceMessage::ContextCreated(spec) => store.create_context(spec).map(Applied::ContextCreated),
            TraceMessage::ContextClosed(spec) => store.close_context(spec).map(|_| Applied::ContextClosed),
            TraceMessage::EventAppended(spec) => store.append_event(spec).map(Applied::EventAppended),
            TraceMessage::ToolObserved(announcement) => {
                store.upsert_tool(announcement).map(|_| Applied::ToolObserved)
            }
        }
    }
}

fn parse<T: DeserializeOwned>(kind: &'static str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Malformed { kind, source })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[serde_as]
#[derive(Deserialize)]
struct ContextRecord {
    id: String,
    #[serde(alias = "parent")]
    parent_id: Option<String>,
    #[serde(alias = "name")]
    label: Option<String>,
    status: Option<ContextStatus>,
    #[serde(alias = "tool")]
    tool_id: Option<String>,
    tool_name: Option<String>,
    #[serde(default)]
    args: Value,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(alias = "created_at")]
    timestamp: Option<i64>,
}

impl From<ContextRecord> for ContextSpec {
    fn from(record: ContextRecord) -> Self {
        ContextSpec {
            id: record.id,
            parent_id: non_empty(record.parent_id),
            label: record.label,
            status: record.status,
            tool_id: non_empty(record.tool_id),
            tool_name: non_empty(record.tool_name),
            args: record.args,
            timestamp_ms: record.timestamp,
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct CloseRecord {
    id: String,
    status: Option<ContextStatus>,
    #[serde(default, alias = "result")]
    output: Value,
    #[serde(alias = "exception")]
    error: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(alias = "closed_at")]
    timestamp: Option<i64>,
}

impl From<CloseRecord> for CloseSpec {
    fn from(record: CloseRecord) -> Self {
        let status = record.status.unwrap_or(if record.error.is_some() {
            ContextStatus::Errored
        } else {
            ContextStatus::Completed
        });
        CloseSpec {
            id: record.id,
            status,
            output: record.output,
            error: non_empty(record.error),
            timestamp_ms: record.timestamp,
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct EventRecord {
    id: String,
    #[serde(alias = "context")]
    context_id: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    timestamp: i64,
    #[serde(alias = "type")]
    kind: EventKind,
    #[serde(default, alias = "data")]
    payload: Value,
}

impl From<EventRecord> for EventSpec {
    fn from(record: EventRecord) -> Self {
        EventSpec {
            id: record.id,
            context_id: record.context_id,
            timestamp_ms: record.timestamp,
            kind: record.kind,
            payload: record.payload,
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct ToolRecord {
    id: String,
    name: Option<String>,
    description: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    args: Vec<ToolArgument>,
}

impl From<ToolRecord> for ToolAnnouncement {
    fn from(record: ToolRecord) -> Self {
        ToolAnnouncement {
            id: record.id,
            name: non_empty(record.name),
            description: non_empty(record.description),
            args: record.args,
        }
    }
}
