use dioxus::prelude::*;

use crate::models::{Context, ContextOrigin, TraceEvent};
use crate::search::{event_matches, SearchResult, Visibility};
use crate::state::{use_app_actions, use_app_state, AppActions, AppState};
use crate::ui::{format_duration, format_timestamp, kind_class, pretty, preview, status_class, EMPTY_CLASS};

const NODE_CLASS: &str = "space-y-1";
const CHILDREN_CLASS: &str = "ml-4 space-y-2 border-l border-slate-200 pl-3 dark:border-slate-700";
const TOGGLE_CLASS: &str = "w-5 text-slate-400 hover:text-slate-700";
const CODE_CLASS: &str =
    "max-h-48 overflow-auto rounded bg-slate-50 p-2 text-[11px] text-slate-700 dark:bg-slate-900 dark:text-slate-300";

#[component]
pub fn TraceTree() -> Element {
    let app_state = use_app_state();
    let actions = use_app_actions();
    let state = app_state.read();

    if state.store.is_empty() {
        return rsx! {
            p { class: EMPTY_CLASS, "No trace data yet. Connect to a producer or replay the sample trace." }
        };
    }

    let search = state.search();
    let roots: Vec<&Context> = state
        .displayed_roots()
        .into_iter()
        .filter(|ctx| search.is_visible(&ctx.id))
        .collect();

    rsx! {
        div { class: "space-y-3",
            if search.is_filtering() {
                p { class: "text-xs text-slate-500",
                    {format!("{} direct matches for \"{}\"", search.direct_matches(), search.query())}
                }
            }
            if roots.is_empty() {
                p { class: EMPTY_CLASS, "Nothing matches the current filter." }
            }
            for ctx in roots {
                {render_context(&state, &search, ctx, actions)}
            }
        }
    }
}

/// Renders `ctx` and its visible descendants.
pub fn render_context(state: &AppState, search: &SearchResult, ctx: &Context, actions: AppActions) -> Element {
    let visibility = search.visibility(&ctx.id);
    let collapsed = state.is_collapsed(&ctx.id);
    let toggle_id = ctx.id.clone();
    let children: Vec<&Context> = state
        .store
        .children(&ctx.id)
        .filter(|child| search.is_visible(&child.id))
        .collect();
    let events: Vec<&TraceEvent> = state.store.events(&ctx.id).collect();

    let label_class = match visibility {
        Visibility::Direct if search.is_filtering() => "font-semibold text-slate-900 dark:text-white",
        Visibility::Indirect => "font-medium text-slate-400",
        _ => "font-medium text-slate-800 dark:text-slate-100",
    };
    let tool = state.store.tool_display_name(ctx).map(str::to_string);
    let elapsed = ctx
        .created_at_ms
        .zip(ctx.closed_at_ms)
        .map(|(start, end)| format_duration(end.saturating_sub(start)));
    let origin_note = match ctx.origin {
        ContextOrigin::Declared => None,
        ContextOrigin::Placeholder => Some("awaiting context"),
        ContextOrigin::Orphaned => Some("orphaned"),
    };
    let has_body = !events.is_empty() || !children.is_empty() || !ctx.args.is_null();

    rsx! {
        div { key: "{ctx.id}", class: NODE_CLASS,
            div { class: "flex flex-wrap items-center gap-2 text-sm",
                button {
                    class: TOGGLE_CLASS,
                    disabled: !has_body,
                    onclick: move |_| actions.toggle_collapsed(&toggle_id),
                    if collapsed { "▸" } else { "▾" }
                }
                span { class: label_class, {state.store.display_label(ctx).to_string()} }
                span { class: status_class(ctx.status), {ctx.status.label()} }
                if let Some(tool) = tool {
                    span { class: "text-xs text-indigo-600", "{tool}" }
                }
                if let Some(elapsed) = elapsed {
                    span { class: "text-xs text-slate-400", "{elapsed}" }
                }
                if let Some(note) = origin_note {
                    span { class: "rounded border border-dashed border-slate-300 px-1.5 text-[11px] text-slate-500", "{note}" }
                }
                span { class: "font-mono text-[11px] text-slate-400", "{ctx.id}" }
            }
            if !collapsed {
                if !ctx.args.is_null() {
                    pre { class: CODE_CLASS, {pretty(&ctx.args)} }
                }
                if !events.is_empty() {
                    ul { class: "ml-7 space-y-1",
                        for event in events {
                            {render_event(event, search)}
                        }
                    }
                }
                if let Some(error) = ctx.error.as_ref() {
                    p { class: "ml-7 text-xs text-rose-600", "{error}" }
                }
                if !ctx.output.is_null() {
                    pre { class: CODE_CLASS, {pretty(&ctx.output)} }
                }
                if !children.is_empty() {
                    div { class: CHILDREN_CLASS,
                        for child in children {
                            {render_context(state, search, child, actions)}
                        }
                    }
                }
            }
        }
    }
}

fn render_event(event: &TraceEvent, search: &SearchResult) -> Element {
    let highlighted = search.is_filtering() && event_matches(event, search.query());
    let row_class = if highlighted {
        "flex gap-2 rounded bg-yellow-50 text-xs dark:bg-yellow-900/30"
    } else {
        "flex gap-2 text-xs"
    };

    rsx! {
        li { key: "{event.id}", class: row_class,
            span { class: "font-mono text-slate-400", {format_timestamp(event.timestamp_ms)} }
            span { class: kind_class(&event.kind), {event.kind.as_str().to_string()} }
            span { class: "break-all text-slate-600 dark:text-slate-300", {preview(&event.payload)} }
        }
    }
}
