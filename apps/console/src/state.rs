use std::collections::HashSet;

use dioxus::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::models::{Context, ContextId, ToolId};
use crate::search::{SearchFilter, SearchResult};
use crate::services::connection::{ConnectionState, ConnectionStatus};
use crate::services::dispatcher::EventDispatcher;
use crate::settings::{ViewMode, ViewSettings};
use crate::store::TraceStore;

pub type AppSignal = dioxus_signals::Signal<AppState>;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchStats {
    pub applied: u64,
    pub rejected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rejection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at_ms: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub store: TraceStore,
    pub connection: ConnectionStatus,
    pub settings: ViewSettings,
    pub search_query: String,
    pub selected_tool: Option<ToolId>,
    pub collapsed: HashSet<ContextId>,
    pub stats: DispatchStats,
    dispatcher: EventDispatcher,
}

impl Default for AppState {
    fn default() -> Self {
        let config = AppConfig::default();
        Self::new(&config, ViewSettings::from_config(&config))
    }
}

impl AppState {
    pub fn new(config: &AppConfig, settings: ViewSettings) -> Self {
        Self {
            store: TraceStore::new(),
            connection: ConnectionStatus::default(),
            settings,
            search_query: String::new(),
            selected_tool: None,
            collapsed: HashSet::new(),
            stats: DispatchStats::default(),
            dispatcher: EventDispatcher::new(config.placeholder_grace),
        }
    }

    /// Decodes and applies one raw message. Failures are counted and
    /// skipped; the store is left untouched by them.
    pub fn apply_raw(&mut self, raw: &str, received_at_ms: Option<i64>) -> bool {
        self.stats.last_message_at_ms = received_at_ms.or(self.stats.last_message_at_ms);
        match self.dispatcher.dispatch(&mut self.store, raw) {
            Ok(_) => {
                self.stats.applied += 1;
                true
            }
            Err(err) => {
                self.stats.rejected += 1;
                self.stats.last_rejection = Some(err.to_string());
                false
            }
        }
    }

    /// Drops every trace record and per-trace UI state. Settings survive.
    pub fn reset_trace(&mut self) {
        self.store.clear();
        self.stats = DispatchStats::default();
        self.collapsed.clear();
        self.selected_tool = None;
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        let was_active = self.connection.state.is_active();
        let ended = matches!(
            status.state,
            ConnectionState::Disconnected | ConnectionState::Error
        );
        self.connection = status;
        if was_active && ended {
            let promoted = self.store.promote_all_placeholders();
            if !promoted.is_empty() {
                tracing::info!(count = promoted.len(), "stream ended with unresolved placeholders");
            }
        }
    }

    pub fn search(&self) -> SearchResult {
        SearchFilter::compute(&self.store, &self.search_query)
    }

    /// Top-level contexts for the tree view: all roots, or every
    /// invocation of the selected tool.
    pub fn displayed_roots(&self) -> Vec<&Context> {
        match self.selected_tool.as_deref() {
            Some(tool_id) => self.store.contexts_for_tool(tool_id).collect(),
            None => self.store.roots().collect(),
        }
    }

    pub fn toggle_collapsed(&mut self, id: &str) {
        if !self.collapsed.remove(id) {
            self.collapsed.insert(id.to_string());
        }
    }

    pub fn is_collapsed(&self, id: &str) -> bool {
        self.collapsed.contains(id)
    }

    /// Selecting the current tool again clears the selection.
    pub fn select_tool(&mut self, tool_id: Option<ToolId>) {
        self.selected_tool = match tool_id {
            Some(id) if self.selected_tool.as_deref() == Some(id.as_str()) => None,
            other => other,
        };
    }
}

#[derive(Clone, Copy)]
pub struct AppActions {
    state: AppSignal,
}

impl AppActions {
    pub fn apply_raw(&self, raw: &str) {
        let received_at = crate::ui::now_ms();
        let mut state = self.state;
        state.write().apply_raw(raw, Some(received_at));
    }

    pub fn reset_trace(&self) {
        let mut state = self.state;
        state.write().reset_trace();
    }

    pub fn set_connection(&self, status: ConnectionStatus) {
        let mut state = self.state;
        state.write().set_connection(status);
    }

    pub fn set_search_query(&self, query: String) {
        let mut state = self.state;
        state.write().search_query = query;
    }

    pub fn select_tool(&self, tool_id: Option<ToolId>) {
        let mut state = self.state;
        state.write().select_tool(tool_id);
    }

    pub fn toggle_collapsed(&self, id: &str) {
        let mut state = self.state;
        state.write().toggle_collapsed(id);
    }

    pub fn set_endpoint(&self, host: String, port: u16) {
        self.update_settings(|settings| {
            settings.host = host;
            settings.port = port;
        });
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        self.update_settings(|settings| settings.view_mode = mode);
    }

    pub fn toggle_theme(&self) {
        self.update_settings(|settings| settings.theme = settings.theme.toggled());
    }

    pub fn settings(&self) -> ViewSettings {
        self.state.read().settings.clone()
    }

    fn update_settings(&self, apply: impl FnOnce(&mut ViewSettings)) {
        let mut state = self.state;
        let snapshot = {
            let mut guard = state.write();
            apply(&mut guard.settings);
            guard.settings.clone()
        };
        snapshot.persist();
    }
}

pub fn use_app_state() -> AppSignal {
    use_context::<AppSignal>()
}

pub fn use_app_actions() -> AppActions {
    let state = use_app_state();
    AppActions { state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::trace::sample_session;
    use crate::models::ContextOrigin;
    use serde_json::json;

    fn connected() -> ConnectionStatus {
        ConnectionStatus {
            state: ConnectionState::Connected,
            endpoint: Some("ws://localhost:9001".into()),
            error: None,
            generation: 1,
        }
    }

    #[test]
    fn apply_raw_counts_applied_and_rejected() {
        let mut state = AppState::default();
        assert!(state.apply_raw(r#"{"type":"context","data":{"id":"a"}}"#, Some(10)));
        assert!(!state.apply_raw("not json", Some(20)));
        assert!(!state.apply_raw(r#"{"type":"context","data":{"id":"a","parent_id":"a"}}"#, None));

        assert_eq!(state.stats.applied, 1);
        assert_eq!(state.stats.rejected, 2);
        assert_eq!(state.stats.last_message_at_ms, Some(20));
        assert!(state.stats.last_rejection.is_some());
        assert_eq!(state.store.len(), 1);
    }

    #[test]
    fn reset_trace_keeps_settings() {
        let mut state = AppState::default();
        state.settings.host = "traces.local".into();
        for raw in sample_session() {
            state.apply_raw(&raw, None);
        }
        state.toggle_collapsed("ctx-agent");
        state.select_tool(Some("websearch".into()));

        state.reset_trace();
        assert!(state.store.is_empty());
        assert!(state.store.tools().is_empty());
        assert!(state.collapsed.is_empty());
        assert_eq!(state.selected_tool, None);
        assert_eq!(state.stats, DispatchStats::default());
        assert_eq!(state.settings.host, "traces.local");
    }

    #[test]
    fn leaving_an_active_connection_promotes_placeholders() {
        let mut state = AppState::default();
        state.set_connection(connected());
        let raw = json!({
            "type": "event",
            "data": { "id": "e1", "context_id": "ghost", "timestamp": 5, "kind": "tool_called" }
        })
        .to_string();
        state.apply_raw(&raw, None);
        assert!(state.store.context("ghost").unwrap().is_placeholder());

        state.set_connection(ConnectionStatus {
            state: ConnectionState::Error,
            ..connected()
        });
        assert_eq!(
            state.store.context("ghost").unwrap().origin,
            ContextOrigin::Orphaned
        );
        assert_eq!(state.store.event_count(), 1);
    }

    #[test]
    fn tool_selection_toggles_and_filters_roots() {
        let mut state = AppState::default();
        for raw in sample_session() {
            state.apply_raw(&raw, None);
        }
        let roots: Vec<&str> = state.displayed_roots().iter().map(|ctx| ctx.id.as_str()).collect();
        assert_eq!(roots, vec!["ctx-agent"]);

        state.select_tool(Some("wikipedia".into()));
        let roots: Vec<&str> = state.displayed_roots().iter().map(|ctx| ctx.id.as_str()).collect();
        assert_eq!(roots, vec!["ctx-wiki"]);

        state.select_tool(Some("wikipedia".into()));
        assert_eq!(state.selected_tool, None);
    }

    #[test]
    fn collapse_toggle_round_trips() {
        let mut state = AppState::default();
        state.toggle_collapsed("a");
        assert!(state.is_collapsed("a"));
        state.toggle_collapsed("a");
        assert!(!state.is_collapsed("a"));
    }
}
