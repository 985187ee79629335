use dioxus::prelude::*;

use crate::models::EventKind;
use crate::search::event_matches;
use crate::state::{use_app_state, AppState};
use crate::ui::{format_timestamp, kind_class, preview, EMPTY_CLASS, PANEL_CLASS, TD_CLASS, TH_CLASS};

#[derive(Clone, Debug, PartialEq)]
struct TimelineRow {
    event_id: String,
    timestamp_ms: i64,
    kind: EventKind,
    context_id: String,
    breadcrumb: String,
    summary: String,
}

/// Events of the whole trace in time order, narrowed to the search query
/// and the selected tool.
fn timeline_rows(state: &AppState) -> Vec<TimelineRow> {
    let query = state.search_query.as_str();
    state
        .store
        .timeline()
        .into_iter()
        .filter(|event| event_matches(event, query))
        .filter(|event| match state.selected_tool.as_deref() {
            None => true,
            Some(tool_id) => state
                .store
                .path_to(&event.context_id)
                .iter()
                .filter_map(|id| state.store.context(id))
                .any(|ctx| ctx.tool_id.as_deref() == Some(tool_id)),
        })
        .map(|event| TimelineRow {
            event_id: event.id.clone(),
            timestamp_ms: event.timestamp_ms,
            kind: event.kind.clone(),
            context_id: event.context_id.clone(),
            breadcrumb: breadcrumb(state, &event.context_id),
            summary: preview(&event.payload),
        })
        .collect()
}

fn breadcrumb(state: &AppState, context_id: &str) -> String {
    state
        .store
        .path_to(context_id)
        .iter()
        .filter_map(|id| state.store.context(id))
        .map(|ctx| state.store.display_label(ctx))
        .collect::<Vec<_>>()
        .join(" › ")
}

fn row_class(kind: &EventKind) -> &'static str {
    if kind.is_failure() {
        "bg-rose-50/60"
    } else {
        ""
    }
}

#[component]
pub fn TimelineView() -> Element {
    let app_state = use_app_state();
    let rows = timeline_rows(&app_state.read());

    if rows.is_empty() {
        return rsx! {
            p { class: EMPTY_CLASS, "No events to show." }
        };
    }

    rsx! {
        div { class: PANEL_CLASS,
            table { class: "min-w-full divide-y divide-slate-200 text-xs",
                thead { class: "text-slate-600",
                    tr {
                        th { class: TH_CLASS, "Time" }
                        th { class: TH_CLASS, "Kind" }
                        th { class: TH_CLASS, "Context" }
                        th { class: TH_CLASS, "Payload" }
                    }
                }
                tbody { class: "divide-y divide-slate-100",
                    for row in rows {
                        tr { key: "{row.event_id}",
                            class: row_class(&row.kind),
                            td { class: TD_CLASS, span { class: "font-mono", {format_timestamp(row.timestamp_ms)} } }
                            td { class: TD_CLASS, span { class: kind_class(&row.kind), {row.kind.as_str().to_string()} } }
                            td { class: TD_CLASS, title: "{row.context_id}", "{row.breadcrumb}" }
                            td { class: "{TD_CLASS} break-all", "{row.summary}" }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::trace::sample_session;

    fn loaded() -> AppState {
        let mut state = AppState::default();
        for raw in sample_session() {
            state.apply_raw(&raw, None);
        }
        state
    }

    #[test]
    fn rows_follow_event_time() {
        let state = loaded();
        let ids: Vec<String> = timeline_rows(&state).into_iter().map(|row| row.event_id).collect();
        assert_eq!(ids, vec!["ev-1", "ev-2", "ev-3", "ev-4", "ev-5"]);
    }

    #[test]
    fn rows_carry_the_context_path() {
        let state = loaded();
        let rows = timeline_rows(&state);
        let fetch = rows.iter().find(|row| row.event_id == "ev-3").unwrap();
        assert_eq!(fetch.breadcrumb, "ReAct agent › Web Search › fetch result page");
    }

    #[test]
    fn query_and_tool_selection_narrow_rows() {
        let mut state = loaded();
        state.search_query = "graydon".into();
        let ids: Vec<String> = timeline_rows(&state).into_iter().map(|row| row.event_id).collect();
        assert_eq!(ids, vec!["ev-4", "ev-5"]);

        state.search_query.clear();
        state.select_tool(Some("websearch".into()));
        let ids: Vec<String> = timeline_rows(&state).into_iter().map(|row| row.event_id).collect();
        assert_eq!(ids, vec!["ev-2", "ev-3"]);
    }
}
