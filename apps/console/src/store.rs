//! Hierarchical trace state: an arena of contexts keyed by id, the events
//! they own, and the tool index derived from them.
//!
//! Every mutation validates first and writes second, so a rejected
//! mutation leaves the store exactly as it was.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde_json::Value;
use thiserror::Error;

use crate::models::{
    Context, ContextId, ContextOrigin, ContextStatus, EventId, EventKind, ToolId, TraceEvent,
};
use crate::registry::{ToolAnnouncement, ToolRegistry};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} id must not be empty")]
    EmptyId(&'static str),
    #[error("event `{0}` was already recorded")]
    DuplicateEvent(EventId),
    #[error(
        "event `{event_id}` at {timestamp_ms}ms is older than the last event of context `{context_id}` ({last_ms}ms)"
    )]
    NonMonotonicTimestamp {
        event_id: EventId,
        context_id: ContextId,
        timestamp_ms: i64,
        last_ms: i64,
    },
    #[error("context `{context_id}` cannot be parented by `{parent_id}`: the link would form a cycle")]
    CyclicParent {
        context_id: ContextId,
        parent_id: ContextId,
    },
    #[error("context `{context_id}` is already parented by {existing:?}, got `{requested}`")]
    ParentConflict {
        context_id: ContextId,
        existing: Option<ContextId>,
        requested: ContextId,
    },
    #[error("context `{context_id}` is already {status}")]
    AlreadyClosed {
        context_id: ContextId,
        status: &'static str,
    },
    #[error("context `{0}` cannot be closed with status running")]
    InvalidCloseStatus(ContextId),
}

/// Attributes carried by a context announcement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextSpec {
    pub id: ContextId,
    pub parent_id: Option<ContextId>,
    pub label: Option<String>,
    pub status: Option<ContextStatus>,
    pub tool_id: Option<ToolId>,
    pub tool_name: Option<String>,
    pub args: Value,
    pub timestamp_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CloseSpec {
    pub id: ContextId,
    pub status: ContextStatus,
    pub output: Value,
    pub error: Option<String>,
    pub timestamp_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventSpec {
    pub id: EventId,
    pub context_id: ContextId,
    pub timestamp_ms: i64,
    pub kind: EventKind,
    pub payload: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Merged,
    /// A placeholder received its announcement and moved under its parent.
    Reconciled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    AppendedToPlaceholder,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraceStore {
    contexts: HashMap<ContextId, Context>,
    order: Vec<ContextId>,
    roots: Vec<ContextId>,
    events: HashMap<EventId, TraceEvent>,
    /// Stream time at which each pending placeholder was first observed;
    /// `None` until the stream carries a timestamp.
    placeholder_since: HashMap<ContextId, Option<i64>>,
    latest_timestamp_ms: Option<i64>,
    next_seq: u64,
    tools: ToolRegistry,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- reads ------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn context(&self, id: &str) -> Option<&Context> {
        self.contexts.get(id)
    }

    pub fn event(&self, id: &str) -> Option<&TraceEvent> {
        self.events.get(id)
    }

    pub fn root_ids(&self) -> &[ContextId] {
        &self.roots
    }

    /// Root contexts in arrival order.
    pub fn roots(&self) -> impl Iterator<Item = &Context> + '_ {
        self.roots.iter().filter_map(|id| self.contexts.get(id))
    }

    /// Every context in arrival order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> + '_ {
        self.order.iter().filter_map(|id| self.contexts.get(id))
    }

    pub fn children<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Context> + 'a {
        self.contexts
            .get(id)
            .map(|ctx| ctx.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.contexts.get(child))
    }

    pub fn events<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.contexts
            .get(id)
            .map(|ctx| ctx.events.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|event| self.events.get(event))
    }

    /// Contexts whose id starts with `prefix`, in arrival order.
    pub fn by_search_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Context> + 'a {
        self.contexts().filter(move |ctx| ctx.id.starts_with(prefix))
    }

    pub fn contexts_for_tool<'a>(&'a self, tool_id: &'a str) -> impl Iterator<Item = &'a Context> + 'a {
        self.contexts()
            .filter(move |ctx| ctx.tool_id.as_deref() == Some(tool_id))
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Context> + '_ {
        self.contexts().filter(|ctx| ctx.is_placeholder())
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Display name of the tool `ctx` invokes, preferring the registry's
    /// announced name.
    pub fn tool_display_name<'a>(&'a self, ctx: &'a Context) -> Option<&'a str> {
        let tool_id = ctx.tool_id.as_deref()?;
        match self.tools.get(tool_id) {
            Some(tool) => Some(tool.name.as_str()),
            None => ctx.tool_name.as_deref().or(Some(tool_id)),
        }
    }

    /// Label shown for `ctx`: its own label, then its tool's name, then its id.
    pub fn display_label<'a>(&'a self, ctx: &'a Context) -> &'a str {
        if !ctx.label.trim().is_empty() {
            return &ctx.label;
        }
        self.tool_display_name(ctx)
            .unwrap_or_else(|| ctx.display_label())
    }

    pub fn latest_timestamp_ms(&self) -> Option<i64> {
        self.latest_timestamp_ms
    }

    /// Ids from the root down to `id`, inclusive.
    pub fn path_to(&self, id: &str) -> Vec<ContextId> {
        let mut path = Vec::new();
        let mut cursor = self.contexts.get(id);
        while let Some(ctx) = cursor {
            path.push(ctx.id.clone());
            if path.len() > self.contexts.len() {
                break;
            }
            cursor = ctx.parent_id.as_deref().and_then(|parent| self.contexts.get(parent));
        }
        path.reverse();
        path
    }

    /// All events of all contexts merged by `(timestamp, arrival)`.
    ///
    /// Per-context lists are already sorted, so this is a k-way merge
    /// rather than a sort of every event.
    pub fn timeline(&self) -> Vec<&TraceEvent> {
        let lists: Vec<Vec<&TraceEvent>> = self
            .contexts()
            .map(|ctx| {
                ctx.events
                    .iter()
                    .filter_map(|id| self.events.get(id))
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .collect();

        let mut heap = BinaryHeap::with_capacity(lists.len());
        for (list_idx, list) in lists.iter().enumerate() {
            let head = list[0];
            heap.push(Reverse((head.timestamp_ms, head.seq, list_idx, 0usize)));
        }

        let mut merged = Vec::with_capacity(self.events.len());
        while let Some(Reverse((_, _, list_idx, pos))) = heap.pop() {
            let list = &lists[list_idx];
            merged.push(list[pos]);
            if let Some(next) = list.get(pos + 1) {
                heap.push(Reverse((next.timestamp_ms, next.seq, list_idx, pos + 1)));
            }
        }
        merged
    }

    // ---- mutations ----------------------------------------------------------

    pub fn create_context(&mut self, spec: ContextSpec) -> Result<CreateOutcome, StoreError> {
        if spec.id.is_empty() {
            return Err(StoreError::EmptyId("context"));
        }
        if let Some(parent_id) = spec.parent_id.as_deref() {
            if parent_id.is_empty() {
                return Err(StoreError::EmptyId("parent"));
            }
            if parent_id == spec.id {
                return Err(StoreError::CyclicParent {
                    context_id: spec.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }

        let existing = self
            .contexts
            .get(&spec.id)
            .map(|ctx| (ctx.origin, ctx.parent_id.clone()));

        let outcome = match existing {
            None => {
                self.observe_time(spec.timestamp_ms);
                let mut ctx = Context::new(spec.id.clone(), ContextOrigin::Declared);
                ctx.created_at_ms = spec.timestamp_ms;
                self.insert(ctx);
                if let Some(parent_id) = spec.parent_id.clone() {
                    self.attach(&spec.id, &parent_id, spec.timestamp_ms);
                } else {
                    self.roots.push(spec.id.clone());
                }
                CreateOutcome::Created
            }
            Some((ContextOrigin::Declared, current_parent)) => {
                if let Some(requested) = spec.parent_id.as_ref() {
                    if current_parent.as_ref() != Some(requested) {
                        return Err(StoreError::ParentConflict {
                            context_id: spec.id.clone(),
                            existing: current_parent,
                            requested: requested.clone(),
                        });
                    }
                }
                self.observe_time(spec.timestamp_ms);
                CreateOutcome::Merged
            }
            Some((ContextOrigin::Orphaned, _)) => {
                if let Some(requested) = spec.parent_id.as_deref() {
                    tracing::warn!(
                        context_id = %spec.id,
                        parent_id = %requested,
                        "announcement arrived after placeholder promotion; keeping it as a root"
                    );
                }
                self.observe_time(spec.timestamp_ms);
                CreateOutcome::Merged
            }
            Some((ContextOrigin::Placeholder, _)) => {
                if let Some(parent_id) = spec.parent_id.as_deref() {
                    if self.is_ancestor_or_self(&spec.id, parent_id) {
                        return Err(StoreError::CyclicParent {
                            context_id: spec.id.clone(),
                            parent_id: parent_id.to_string(),
                        });
                    }
                }
                self.observe_time(spec.timestamp_ms);
                self.placeholder_since.remove(&spec.id);
                if let Some(ctx) = self.contexts.get_mut(&spec.id) {
                    ctx.origin = ContextOrigin::Declared;
                }
                if let Some(parent_id) = spec.parent_id.clone() {
                    self.roots.retain(|root| root != &spec.id);
                    self.attach(&spec.id, &parent_id, spec.timestamp_ms);
                }
                CreateOutcome::Reconciled
            }
        };

        self.merge_attributes(spec);
        Ok(outcome)
    }

    pub fn close_context(&mut self, spec: CloseSpec) -> Result<(), StoreError> {
        if spec.id.is_empty() {
            return Err(StoreError::EmptyId("context"));
        }
        if !spec.status.is_terminal() {
            return Err(StoreError::InvalidCloseStatus(spec.id));
        }
        if let Some(ctx) = self.contexts.get(&spec.id) {
            if ctx.status.is_terminal() {
                if ctx.status == spec.status {
                    return Ok(());
                }
                return Err(StoreError::AlreadyClosed {
                    context_id: spec.id,
                    status: ctx.status.label(),
                });
            }
        }

        self.observe_time(spec.timestamp_ms);
        if !self.contexts.contains_key(&spec.id) {
            self.insert_placeholder_root(&spec.id, spec.timestamp_ms);
        }

        if let Some(ctx) = self.contexts.get_mut(&spec.id) {
            ctx.status = spec.status;
            if !spec.output.is_null() {
                ctx.output = spec.output;
            }
            if spec.error.is_some() {
                ctx.error = spec.error;
            }
            ctx.closed_at_ms = spec.timestamp_ms;
        }
        Ok(())
    }

    pub fn append_event(&mut self, spec: EventSpec) -> Result<AppendOutcome, StoreError> {
        if spec.id.is_empty() {
            return Err(StoreError::EmptyId("event"));
        }
        if spec.context_id.is_empty() {
            return Err(StoreError::EmptyId("context"));
        }
        if self.events.contains_key(&spec.id) {
            return Err(StoreError::DuplicateEvent(spec.id));
        }
        if let Some(last_ms) = self.last_event_timestamp(&spec.context_id) {
            if spec.timestamp_ms < last_ms {
                return Err(StoreError::NonMonotonicTimestamp {
                    event_id: spec.id,
                    context_id: spec.context_id,
                    timestamp_ms: spec.timestamp_ms,
                    last_ms,
                });
            }
        }

        self.observe_time(Some(spec.timestamp_ms));
        let outcome = if self.contexts.contains_key(&spec.context_id) {
            AppendOutcome::Appended
        } else {
            self.insert_placeholder_root(&spec.context_id, Some(spec.timestamp_ms));
            AppendOutcome::AppendedToPlaceholder
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(ctx) = self.contexts.get_mut(&spec.context_id) {
            ctx.events.push(spec.id.clone());
        }
        self.events.insert(
            spec.id.clone(),
            TraceEvent {
                id: spec.id,
                context_id: spec.context_id,
                timestamp_ms: spec.timestamp_ms,
                kind: spec.kind,
                payload: spec.payload,
                seq,
            },
        );
        Ok(outcome)
    }

    pub fn upsert_tool(&mut self, announcement: ToolAnnouncement) -> Result<(), StoreError> {
        if announcement.id.is_empty() {
            return Err(StoreError::EmptyId("tool"));
        }
        self.tools.announce(announcement);
        Ok(())
    }

    /// Turns placeholders older than `grace_ms` of stream time into
    /// permanent roots. Returns the promoted ids in arrival order.
    pub fn promote_stale_placeholders(&mut self, grace_ms: i64) -> Vec<ContextId> {
        let Some(now) = self.latest_timestamp_ms else {
            return Vec::new();
        };
        let stale: Vec<ContextId> = self
            .order
            .iter()
            .filter(|id| {
                self.placeholder_since
                    .get(*id)
                    .copied()
                    .flatten()
                    .map(|since| now.saturating_sub(since) >= grace_ms)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        self.promote(&stale);
        stale
    }

    /// Promotes every pending placeholder; used when the stream ends.
    pub fn promote_all_placeholders(&mut self) -> Vec<ContextId> {
        let pending: Vec<ContextId> = self
            .order
            .iter()
            .filter(|id| self.placeholder_since.contains_key(*id))
            .cloned()
            .collect();
        self.promote(&pending);
        pending
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
        self.order.clear();
        self.roots.clear();
        self.events.clear();
        self.placeholder_since.clear();
        self.latest_timestamp_ms = None;
        self.next_seq = 0;
        self.tools.clear();
    }

    // ---- internals ----------------------------------------------------------

    fn insert(&mut self, ctx: Context) {
        self.order.push(ctx.id.clone());
        self.contexts.insert(ctx.id.clone(), ctx);
    }

    fn insert_placeholder_root(&mut self, id: &str, since_ms: Option<i64>) {
        let since = since_ms.or(self.latest_timestamp_ms);
        self.insert(Context::new(id.to_string(), ContextOrigin::Placeholder));
        self.roots.push(id.to_string());
        self.placeholder_since.insert(id.to_string(), since);
        tracing::debug!(context_id = %id, "created placeholder context");
    }

    /// Links `child` under `parent_id`, creating a placeholder parent when
    /// the parent has not been announced.
    fn attach(&mut self, child: &str, parent_id: &str, timestamp_ms: Option<i64>) {
        if !self.contexts.contains_key(parent_id) {
            self.insert_placeholder_root(parent_id, timestamp_ms);
        }
        if let Some(parent) = self.contexts.get_mut(parent_id) {
            parent.children.push(child.to_string());
        }
        if let Some(ctx) = self.contexts.get_mut(child) {
            ctx.parent_id = Some(parent_id.to_string());
        }
    }

    fn is_ancestor_or_self(&self, candidate: &str, start: &str) -> bool {
        let mut cursor = Some(start);
        let mut steps = 0usize;
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            steps += 1;
            if steps > self.contexts.len() {
                return true;
            }
            cursor = self
                .contexts
                .get(id)
                .and_then(|ctx| ctx.parent_id.as_deref());
        }
        false
    }

    fn merge_attributes(&mut self, spec: ContextSpec) {
        let Some(ctx) = self.contexts.get_mut(&spec.id) else {
            return;
        };

        if let Some(label) = spec.label.filter(|label| !label.trim().is_empty()) {
            ctx.label = label;
        }
        if let Some(status) = spec.status {
            if !ctx.status.is_terminal() {
                ctx.status = status;
            }
        }
        if !spec.args.is_null() {
            ctx.args = spec.args;
        }
        if ctx.created_at_ms.is_none() {
            ctx.created_at_ms = spec.timestamp_ms;
        }
        if spec.tool_name.is_some() {
            ctx.tool_name = spec.tool_name.clone();
        }

        if let Some(tool_id) = spec.tool_id.filter(|tool| !tool.is_empty()) {
            if ctx.tool_id.as_deref() != Some(tool_id.as_str()) {
                if let Some(previous) = ctx.tool_id.replace(tool_id.clone()) {
                    self.tools.release_context(&previous);
                }
                self.tools
                    .observe_context(&tool_id, spec.tool_name.as_deref());
            } else {
                self.tools.observe_name(&tool_id, spec.tool_name.as_deref());
            }
        } else if let Some(tool_id) = ctx.tool_id.as_deref() {
            self.tools.observe_name(tool_id, spec.tool_name.as_deref());
        }
    }

    fn promote(&mut self, ids: &[ContextId]) {
        for id in ids {
            self.placeholder_since.remove(id);
            if let Some(ctx) = self.contexts.get_mut(id) {
                ctx.origin = ContextOrigin::Orphaned;
                tracing::info!(context_id = %id, "placeholder promoted to orphaned root");
            }
        }
    }

    fn last_event_timestamp(&self, context_id: &str) -> Option<i64> {
        self.contexts
            .get(context_id)
            .and_then(|ctx| ctx.events.last())
            .and_then(|event| self.events.get(event))
            .map(|event| event.timestamp_ms)
    }

    fn observe_time(&mut self, timestamp_ms: Option<i64>) {
        let Some(ts) = timestamp_ms else {
            return;
        };
        self.latest_timestamp_ms = Some(match self.latest_timestamp_ms {
            Some(current) => current.max(ts),
            None => ts,
        });
        for since in self.placeholder_since.values_mut() {
            since.get_or_insert(ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(id: &str, parent: Option<&str>) -> ContextSpec {
        ContextSpec {
            id: id.into(),
            parent_id: parent.map(str::to_string),
            label: Some(format!("label {id}")),
            ..Default::default()
        }
    }

    fn event(id: &str, ctx: &str, ts: i64) -> EventSpec {
        EventSpec {
            id: id.into(),
            context_id: ctx.into(),
            timestamp_ms: ts,
            kind: EventKind::ToolCalled,
            payload: json!({ "n": id }),
        }
    }

    fn close(id: &str, status: ContextStatus) -> CloseSpec {
        CloseSpec {
            id: id.into(),
            status,
            output: Value::Null,
            error: None,
            timestamp_ms: None,
        }
    }

    fn ids<'a>(iter: impl Iterator<Item = &'a Context>) -> Vec<&'a str> {
        iter.map(|ctx| ctx.id.as_str()).collect()
    }

    #[test]
    fn scenario_create_nest_append_close() {
        let mut store = TraceStore::new();
        store.create_context(create("ctxA", None)).unwrap();
        store.create_context(create("ctxB", Some("ctxA"))).unwrap();
        store.append_event(event("ev1", "ctxB", 10)).unwrap();
        store
            .close_context(close("ctxB", ContextStatus::Completed))
            .unwrap();

        assert_eq!(ids(store.roots()), vec!["ctxA"]);
        assert_eq!(ids(store.children("ctxA")), vec!["ctxB"]);
        let ctx_b = store.context("ctxB").unwrap();
        assert!(ctx_b.is_closed());
        assert_eq!(ctx_b.events, vec!["ev1".to_string()]);
        let timeline: Vec<&str> = store.timeline().iter().map(|ev| ev.id.as_str()).collect();
        assert_eq!(timeline, vec!["ev1"]);
    }

    #[test]
    fn children_follow_arrival_order() {
        let mut store = TraceStore::new();
        store.create_context(create("root", None)).unwrap();
        for child in ["c3", "c1", "c2"] {
            store.create_context(create(child, Some("root"))).unwrap();
        }
        assert_eq!(ids(store.children("root")), vec!["c3", "c1", "c2"]);
    }

    #[test]
    fn repeated_creation_is_idempotent() {
        let mut once = TraceStore::new();
        once.create_context(create("root", None)).unwrap();
        once.create_context(create("child", Some("root"))).unwrap();

        let mut twice = once.clone();
        let outcome = twice.create_context(create("child", Some("root"))).unwrap();
        assert_eq!(outcome, CreateOutcome::Merged);
        assert_eq!(once, twice);
    }

    #[test]
    fn repeated_creation_merges_attributes() {
        let mut store = TraceStore::new();
        store.create_context(create("root", None)).unwrap();
        store
            .create_context(ContextSpec {
                id: "root".into(),
                tool_id: Some("react".into()),
                args: json!({ "task": "search" }),
                ..Default::default()
            })
            .unwrap();

        let root = store.context("root").unwrap();
        assert_eq!(root.label, "label root");
        assert_eq!(root.tool_id.as_deref(), Some("react"));
        assert_eq!(root.args, json!({ "task": "search" }));
        assert_eq!(store.tools().get("react").unwrap().context_count, 1);
    }

    #[test]
    fn conflicting_parent_is_rejected_without_changes() {
        let mut store = TraceStore::new();
        store.create_context(create("a", None)).unwrap();
        store.create_context(create("b", None)).unwrap();
        store.create_context(create("c", Some("a"))).unwrap();
        let before = store.clone();

        let err = store.create_context(create("c", Some("b"))).unwrap_err();
        assert!(matches!(err, StoreError::ParentConflict { .. }));
        assert_eq!(store, before);
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let mut store = TraceStore::new();
        let err = store.create_context(create("a", Some("a"))).unwrap_err();
        assert!(matches!(err, StoreError::CyclicParent { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn out_of_order_event_lands_in_placeholder_then_reconciles() {
        let mut store = TraceStore::new();
        store.create_context(create("root", None)).unwrap();
        let outcome = store.append_event(event("ev1", "late", 5)).unwrap();
        assert_eq!(outcome, AppendOutcome::AppendedToPlaceholder);
        assert!(store.context("late").unwrap().is_placeholder());
        assert_eq!(ids(store.roots()), vec!["root", "late"]);

        let outcome = store.create_context(create("late", Some("root"))).unwrap();
        assert_eq!(outcome, CreateOutcome::Reconciled);
        assert_eq!(ids(store.roots()), vec!["root"]);
        assert_eq!(ids(store.children("root")), vec!["late"]);
        let late = store.context("late").unwrap();
        assert_eq!(late.origin, ContextOrigin::Declared);
        assert_eq!(late.events, vec!["ev1".to_string()]);
        assert_eq!(late.label, "label late");
    }

    #[test]
    fn unknown_parent_gets_a_placeholder() {
        let mut store = TraceStore::new();
        store.create_context(create("child", Some("parent"))).unwrap();
        assert_eq!(ids(store.roots()), vec!["parent"]);
        assert!(store.context("parent").unwrap().is_placeholder());
        assert_eq!(ids(store.children("parent")), vec!["child"]);

        store.create_context(create("parent", None)).unwrap();
        assert_eq!(store.placeholders().count(), 0);
        assert_eq!(ids(store.roots()), vec!["parent"]);
    }

    #[test]
    fn reconciling_into_own_subtree_is_a_cycle() {
        let mut store = TraceStore::new();
        store.create_context(create("child", Some("parent"))).unwrap();
        let before = store.clone();
        let err = store.create_context(create("parent", Some("child"))).unwrap_err();
        assert!(matches!(err, StoreError::CyclicParent { .. }));
        assert_eq!(store, before);
    }

    #[test]
    fn stale_placeholders_become_orphaned_roots() {
        let mut store = TraceStore::new();
        store.append_event(event("ev1", "ghost", 1_000)).unwrap();
        store.create_context(create("root", None)).unwrap();
        store.append_event(event("ev2", "root", 20_000)).unwrap();
        assert!(store.promote_stale_placeholders(30_000).is_empty());

        store.append_event(event("ev3", "root", 31_000)).unwrap();
        assert_eq!(store.promote_stale_placeholders(30_000), vec!["ghost".to_string()]);
        assert_eq!(store.context("ghost").unwrap().origin, ContextOrigin::Orphaned);

        // a late announcement no longer moves the orphan
        store.create_context(create("ghost", Some("root"))).unwrap();
        assert_eq!(ids(store.roots()), vec!["ghost", "root"]);
        assert_eq!(store.context("ghost").unwrap().label, "label ghost");
    }

    #[test]
    fn untimed_placeholder_starts_its_grace_at_the_next_timestamp() {
        let mut store = TraceStore::new();
        store.create_context(create("R", None)).unwrap();
        store.create_context(create("B", Some("A"))).unwrap();
        store.append_event(event("ev1", "B", 1_717_000_000_000)).unwrap();
        assert!(store.promote_stale_placeholders(30_000).is_empty());

        let outcome = store.create_context(create("A", Some("R"))).unwrap();
        assert_eq!(outcome, CreateOutcome::Reconciled);
        let a = store.context("A").unwrap();
        assert_eq!(a.origin, ContextOrigin::Declared);
        assert_eq!(a.parent_id.as_deref(), Some("R"));
        assert_eq!(ids(store.roots()), vec!["R"]);
        assert_eq!(store.path_to("B"), vec!["R", "A", "B"]);
    }

    #[test]
    fn untimed_placeholder_still_expires_after_the_grace_window() {
        let mut store = TraceStore::new();
        store.create_context(create("B", Some("A"))).unwrap();
        store.append_event(event("ev1", "B", 1_000)).unwrap();
        store.append_event(event("ev2", "B", 30_999)).unwrap();
        assert!(store.promote_stale_placeholders(30_000).is_empty());

        store.append_event(event("ev3", "B", 31_000)).unwrap();
        assert_eq!(store.promote_stale_placeholders(30_000), vec!["A".to_string()]);
    }

    #[test]
    fn promote_all_placeholders_on_stream_end() {
        let mut store = TraceStore::new();
        store.append_event(event("ev1", "a", 1)).unwrap();
        store.append_event(event("ev2", "b", 2)).unwrap();
        assert_eq!(
            store.promote_all_placeholders(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(store.placeholders().count(), 0);
    }

    #[test]
    fn duplicate_event_is_rejected() {
        let mut store = TraceStore::new();
        store.append_event(event("ev1", "ctx", 1)).unwrap();
        let before = store.clone();
        let err = store.append_event(event("ev1", "ctx", 2)).unwrap_err();
        assert_eq!(err, StoreError::DuplicateEvent("ev1".into()));
        assert_eq!(store, before);
    }

    #[test]
    fn event_timestamps_must_not_go_backwards_within_a_context() {
        let mut store = TraceStore::new();
        store.append_event(event("ev1", "ctx", 10)).unwrap();
        store.append_event(event("ev2", "ctx", 10)).unwrap();
        let err = store.append_event(event("ev3", "ctx", 9)).unwrap_err();
        assert!(matches!(err, StoreError::NonMonotonicTimestamp { last_ms: 10, .. }));
        assert_eq!(store.event_count(), 2);

        // other contexts keep their own clocks
        store.append_event(event("ev4", "other", 1)).unwrap();
    }

    #[test]
    fn close_is_idempotent_for_same_status_only() {
        let mut store = TraceStore::new();
        store.create_context(create("ctx", None)).unwrap();
        store
            .close_context(CloseSpec {
                output: json!("done"),
                ..close("ctx", ContextStatus::Completed)
            })
            .unwrap();
        store
            .close_context(close("ctx", ContextStatus::Completed))
            .unwrap();
        assert_eq!(store.context("ctx").unwrap().output, json!("done"));

        let err = store
            .close_context(close("ctx", ContextStatus::Errored))
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyClosed { .. }));

        let err = store
            .close_context(close("ctx", ContextStatus::Running))
            .unwrap_err();
        assert_eq!(err, StoreError::InvalidCloseStatus("ctx".into()));
    }

    #[test]
    fn closing_unknown_context_creates_closed_placeholder() {
        let mut store = TraceStore::new();
        store
            .close_context(CloseSpec {
                error: Some("boom".into()),
                ..close("lost", ContextStatus::Errored)
            })
            .unwrap();
        let lost = store.context("lost").unwrap();
        assert!(lost.is_placeholder());
        assert_eq!(lost.status, ContextStatus::Errored);
        assert_eq!(lost.error.as_deref(), Some("boom"));
    }

    #[test]
    fn timeline_merges_contexts_by_timestamp_then_arrival() {
        let mut store = TraceStore::new();
        store.create_context(create("a", None)).unwrap();
        store.create_context(create("b", None)).unwrap();
        store.append_event(event("a1", "a", 1)).unwrap();
        store.append_event(event("a2", "a", 5)).unwrap();
        store.append_event(event("b1", "b", 3)).unwrap();
        store.append_event(event("b2", "b", 5)).unwrap();
        store.append_event(event("a3", "a", 7)).unwrap();

        let order: Vec<&str> = store.timeline().iter().map(|ev| ev.id.as_str()).collect();
        assert_eq!(order, vec!["a1", "b1", "a2", "b2", "a3"]);
    }

    #[test]
    fn by_search_prefix_keeps_arrival_order() {
        let mut store = TraceStore::new();
        for id in ["run-2", "step-1", "run-1"] {
            store.create_context(create(id, None)).unwrap();
        }
        assert_eq!(ids(store.by_search_prefix("run-")), vec!["run-2", "run-1"]);
    }

    #[test]
    fn retagging_a_context_moves_its_tool_count() {
        let mut store = TraceStore::new();
        store
            .create_context(ContextSpec {
                tool_id: Some("first".into()),
                ..create("ctx", None)
            })
            .unwrap();
        store
            .create_context(ContextSpec {
                tool_id: Some("second".into()),
                ..create("ctx", None)
            })
            .unwrap();
        assert_eq!(store.tools().get("first").unwrap().context_count, 0);
        assert_eq!(store.tools().get("second").unwrap().context_count, 1);
        assert_eq!(ids(store.contexts_for_tool("second")), vec!["ctx"]);
    }

    #[test]
    fn renaming_a_tool_in_a_repeat_announcement_reaches_the_registry() {
        let mut store = TraceStore::new();
        store
            .create_context(ContextSpec {
                id: "ctx".into(),
                tool_id: Some("fetch".into()),
                tool_name: Some("Fetch".into()),
                ..Default::default()
            })
            .unwrap();
        store
            .create_context(ContextSpec {
                id: "ctx".into(),
                tool_name: Some("Page Fetcher".into()),
                ..Default::default()
            })
            .unwrap();
        let tool = store.tools().get("fetch").unwrap();
        assert_eq!(tool.name, "Page Fetcher");
        assert_eq!(tool.context_count, 1);
    }

    #[test]
    fn display_label_prefers_the_announced_tool_name() {
        let mut store = TraceStore::new();
        store
            .create_context(ContextSpec {
                id: "ctx".into(),
                tool_id: Some("websearch".into()),
                ..Default::default()
            })
            .unwrap();
        let ctx = store.context("ctx").unwrap().clone();
        assert_eq!(store.display_label(&ctx), "websearch");

        store
            .upsert_tool(ToolAnnouncement {
                id: "websearch".into(),
                name: Some("Web Search".into()),
                ..Default::default()
            })
            .unwrap();
        let ctx = store.context("ctx").unwrap();
        assert_eq!(store.display_label(ctx), "Web Search");
        assert_eq!(store.tool_display_name(ctx), Some("Web Search"));

        let labelled = Context {
            label: "lookup".into(),
            ..ctx.clone()
        };
        assert_eq!(store.display_label(&labelled), "lookup");
    }

    #[test]
    fn path_to_walks_up_to_the_root() {
        let mut store = TraceStore::new();
        store.create_context(create("a", None)).unwrap();
        store.create_context(create("b", Some("a"))).unwrap();
        store.create_context(create("c", Some("b"))).unwrap();
        assert_eq!(store.path_to("c"), vec!["a", "b", "c"]);
        assert!(store.path_to("missing").is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = TraceStore::new();
        store.create_context(create("a", None)).unwrap();
        store.append_event(event("e", "a", 1)).unwrap();
        store
            .upsert_tool(ToolAnnouncement {
                id: "t".into(),
                ..Default::default()
            })
            .unwrap();
        store.clear();
        assert_eq!(store, TraceStore::new());
    }
}
