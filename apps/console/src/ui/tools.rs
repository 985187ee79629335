use dioxus::prelude::*;
use dioxus_router::prelude::*;

use crate::models::{Context, ContextStatus};
use crate::search::SearchFilter;
use crate::state::{use_app_actions, use_app_state};
use crate::store::TraceStore;
use crate::ui::trace_tree::render_context;
use crate::ui::{EMPTY_CLASS, PANEL_CLASS, TD_CLASS, TH_CLASS};
use crate::Route;

const TOOL_BUTTON_CLASS: &str = "w-full rounded px-2 py-1 text-left text-sm transition-colors";
const TOOL_ACTIVE_CLASS: &str = "bg-slate-900 text-white dark:bg-slate-100 dark:text-slate-900";
const TOOL_IDLE_CLASS: &str = "hover:bg-slate-100 dark:hover:bg-slate-700";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvocationSummary {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub errored: usize,
    pub cancelled: usize,
}

pub fn invocation_summary(store: &TraceStore, tool_id: &str) -> InvocationSummary {
    store
        .contexts_for_tool(tool_id)
        .fold(InvocationSummary::default(), |mut summary, ctx| {
            summary.total += 1;
            match ctx.status {
                ContextStatus::Running => summary.running += 1,
                ContextStatus::Completed => summary.completed += 1,
                ContextStatus::Errored => summary.errored += 1,
                ContextStatus::Cancelled => summary.cancelled += 1,
            }
            summary
        })
}

fn tool_button_class(active: bool) -> String {
    let state = if active { TOOL_ACTIVE_CLASS } else { TOOL_IDLE_CLASS };
    format!("{TOOL_BUTTON_CLASS} {state}")
}

#[component]
pub fn ToolPanel() -> Element {
    let app_state = use_app_state();
    let actions = use_app_actions();
    let state = app_state.read();
    let selected = state.selected_tool.clone();
    let tools = state.store.tools().sorted_by_name();

    rsx! {
        aside { class: "{PANEL_CLASS} space-y-2",
            div { class: "flex items-center justify-between",
                h2 { class: "text-sm font-semibold", "Tools" }
                if selected.is_some() {
                    button {
                        class: "text-xs text-slate-500 hover:text-slate-800",
                        onclick: move |_| actions.select_tool(None),
                        "Show all"
                    }
                }
            }
            if tools.is_empty() {
                p { class: EMPTY_CLASS, "No tools observed yet." }
            }
            ul { class: "space-y-1",
                for tool in tools {
                    li { key: "{tool.id}", class: "flex items-center gap-1",
                        button {
                            class: tool_button_class(selected.as_deref() == Some(tool.id.as_str())),
                            title: tool.description.clone().unwrap_or_default(),
                            onclick: {
                                let tool_id = tool.id.clone();
                                move |_| actions.select_tool(Some(tool_id.clone()))
                            },
                            "{tool.name} ({tool.context_count})"
                        }
                        Link {
                            class: "text-xs text-indigo-600 hover:underline",
                            to: Route::ToolView { tool_id: tool.id.clone() },
                            "inspect"
                        }
                    }
                }
            }
        }
    }
}

/// Every invocation of one tool, each rendered as its own subtree.
#[component]
pub fn ToolView(tool_id: String) -> Element {
    let app_state = use_app_state();
    let actions = use_app_actions();
    let state = app_state.read();

    let Some(tool) = state.store.tools().get(&tool_id) else {
        return rsx! {
            section { class: PANEL_CLASS,
                p { class: EMPTY_CLASS, "Tool `{tool_id}` has not been observed in this trace." }
                Link { class: "text-xs text-indigo-600", to: Route::Dashboard {}, "Back to trace" }
            }
        };
    };

    let summary = invocation_summary(&state.store, &tool_id);
    let invocations: Vec<&Context> = state.store.contexts_for_tool(&tool_id).collect();

    rsx! {
        section { class: "mx-auto max-w-5xl space-y-4 p-4",
            div { class: "{PANEL_CLASS} space-y-2",
                Link { class: "text-xs text-indigo-600", to: Route::Dashboard {}, "Back to trace" }
                h2 { class: "text-lg font-semibold", "{tool.name}" }
                if let Some(description) = tool.description.as_ref() {
                    p { class: "text-sm text-slate-600 dark:text-slate-300", "{description}" }
                }
                p { class: "text-xs text-slate-500",
                    {format!(
                        "{} invocations: {} running, {} completed, {} errored, {} cancelled",
                        summary.total, summary.running, summary.completed, summary.errored, summary.cancelled
                    )}
                }
                if !tool.args.is_empty() {
                    table { class: "min-w-full divide-y divide-slate-200 text-xs",
                        thead {
                            tr {
                                th { class: TH_CLASS, "Argument" }
                                th { class: TH_CLASS, "Type" }
                                th { class: TH_CLASS, "Required" }
                                th { class: TH_CLASS, "Description" }
                            }
                        }
                        tbody { class: "divide-y divide-slate-100",
                            for arg in tool.args.iter() {
                                tr { key: "{arg.name}",
                                    td { class: "{TD_CLASS} font-mono", "{arg.name}" }
                                    td { class: TD_CLASS, {arg.kind.clone().unwrap_or_else(|| "-".into())} }
                                    td { class: TD_CLASS, if arg.required { "yes" } else { "no" } }
                                    td { class: TD_CLASS, {arg.description.clone().unwrap_or_default()} }
                                }
                            }
                        }
                    }
                }
            }
            if invocations.is_empty() {
                p { class: EMPTY_CLASS, "No invocations recorded." }
            }
            for ctx in invocations {
                div { key: "{ctx.id}", class: PANEL_CLASS,
                    {
                        let search = SearchFilter::compute_subtree(&state.store, &ctx.id, &state.search_query);
                        if search.is_visible(&ctx.id) {
                            render_context(&state, &search, ctx, actions)
                        } else {
                            rsx! { p { class: EMPTY_CLASS, "Hidden by the current filter." } }
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
    use crate::services::dispatcher::EventDispatcher;

    #[test]
    fn summary_counts_invocations_by_status() {
        let dispatcher = EventDispatcher::default();
        let mut store = TraceStore::new();
        for raw in sample_session() {
            dispatcher.dispatch(&mut store, &raw).unwrap();
        }
        let raw = r#"{"type":"context","data":{"id":"ctx-search-2","parent_id":"ctx-agent","tool_id":"websearch"}}"#;
        dispatcher.dispatch(&mut store, raw).unwrap();

        assert_eq!(
            invocation_summary(&store, "websearch"),
            InvocationSummary {
                total: 2,
                running: 1,
                completed: 1,
                ..Default::default()
            }
        );
        assert_eq!(invocation_summary(&store, "missing"), InvocationSummary::default());
    }
}
