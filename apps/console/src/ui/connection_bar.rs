use dioxus::prelude::*;

use crate::hooks::live::LiveSignal;
use crate::settings::parse_port;
use crate::state::{use_app_actions, use_app_state};
use crate::ui::{connection_class, format_timestamp, PANEL_CLASS};

const INPUT_CLASS: &str =
    "rounded border border-slate-300 px-2 py-1 text-sm disabled:opacity-50 dark:border-slate-600 dark:bg-slate-900";
const BUTTON_CLASS: &str =
    "rounded bg-slate-900 px-3 py-1 text-sm text-white hover:bg-slate-700 dark:bg-slate-100 dark:text-slate-900";
const GHOST_BUTTON_CLASS: &str =
    "rounded border border-slate-300 px-3 py-1 text-sm hover:bg-slate-100 dark:border-slate-600 dark:hover:bg-slate-700";

#[component]
pub fn ConnectionBar() -> Element {
    let app_state = use_app_state();
    let actions = use_app_actions();
    let live = use_coroutine_handle::<LiveSignal>();

    let snapshot = app_state.read();
    let settings = snapshot.settings.clone();
    let connection = snapshot.connection.clone();
    let stats = snapshot.stats.clone();
    let query = snapshot.search_query.clone();
    let context_count = snapshot.store.len();
    let event_count = snapshot.store.event_count();
    drop(snapshot);

    let mut host_text = use_signal(|| settings.host.clone());
    let mut port_text = use_signal(|| settings.port.to_string());
    let mut input_error = use_signal(|| None::<String>);
    let active = connection.state.is_active();

    let connect = move |_: MouseEvent| {
        let host = host_text.read().trim().to_string();
        match parse_port(&port_text.read()) {
            Some(port) if !host.is_empty() => {
                input_error.set(None);
                actions.set_endpoint(host, port);
                live.send(LiveSignal::Connect);
            }
            _ => input_error.set(Some("Enter a host and a port between 1 and 65535".into())),
        }
    };

    rsx! {
        section { class: "{PANEL_CLASS} space-y-3",
            div { class: "flex flex-wrap items-center gap-2",
                input {
                    class: INPUT_CLASS,
                    placeholder: "host",
                    value: "{host_text}",
                    disabled: active,
                    oninput: move |evt| host_text.set(evt.value()),
                }
                input {
                    class: "{INPUT_CLASS} w-24",
                    placeholder: "port",
                    value: "{port_text}",
                    disabled: active,
                    oninput: move |evt| port_text.set(evt.value()),
                }
                if active {
                    button { class: BUTTON_CLASS, onclick: move |_| live.send(LiveSignal::Disconnect), "Disconnect" }
                } else {
                    button { class: BUTTON_CLASS, onclick: connect, "Connect" }
                }
                span { class: connection_class(connection.state), {connection.state.label()} }
                if let Some(endpoint) = connection.endpoint.as_ref() {
                    span { class: "font-mono text-xs text-slate-500", "{endpoint}" }
                }
                div { class: "ml-auto flex items-center gap-2",
                    button {
                        class: GHOST_BUTTON_CLASS,
                        onclick: move |_| actions.set_view_mode(settings.view_mode.toggled()),
                        {format!("View: {}", settings.view_mode.label())}
                    }
                    button { class: GHOST_BUTTON_CLASS, onclick: move |_| actions.toggle_theme(), "Theme" }
                    button {
                        class: GHOST_BUTTON_CLASS,
                        disabled: active,
                        onclick: move |_| live.send(LiveSignal::Replay),
                        "Replay sample"
                    }
                    button { class: GHOST_BUTTON_CLASS, onclick: move |_| live.send(LiveSignal::Clear), "Clear" }
                }
            }
            if let Some(message) = input_error() {
                p { class: "text-xs text-rose-600", "{message}" }
            }
            if let Some(error) = connection.error.as_ref() {
                p { class: "text-xs text-rose-600", "{error}" }
            }
            div { class: "flex flex-wrap items-center gap-3",
                input {
                    class: "{INPUT_CLASS} min-w-[16rem] flex-1",
                    r#type: "search",
                    placeholder: "Filter by label, tool, payload…",
                    value: "{query}",
                    oninput: move |evt| actions.set_search_query(evt.value()),
                }
                span { class: "text-xs text-slate-500",
                    {format!(
                        "{context_count} contexts · {event_count} events · {} applied · {} rejected",
                        stats.applied, stats.rejected
                    )}
                }
                if let Some(at) = stats.last_message_at_ms {
                    span { class: "text-xs text-slate-400", {format!("last message {}", format_timestamp(at))} }
                }
            }
            if let Some(reason) = stats.last_rejection.as_ref() {
                p { class: "text-[11px] text-amber-600", {format!("last rejected message: {reason}")} }
            }
        }
    }
}
