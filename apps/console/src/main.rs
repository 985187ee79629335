#![allow(non_snake_case)]

mod config;
mod fixtures;
mod hooks;
mod models;
mod registry;
mod search;
mod services;
mod settings;
mod state;
mod store;
mod ui;

use config::AppConfig;
use dioxus::prelude::*;
use dioxus_router::prelude::*;
use hooks::live::use_live_stream;
use once_cell::sync::OnceCell;
use settings::{ViewMode, ViewSettings};
use state::{use_app_state, AppState};
use tracing::info;
use ui::connection_bar::ConnectionBar;
use ui::timeline::TimelineView;
use ui::tools::{ToolPanel, ToolView};
use ui::trace_tree::TraceTree;

pub(crate) static APP_CONFIG: OnceCell<AppConfig> = OnceCell::new();

fn main() {
    console_error_panic_hook::set_once();
    let config = AppConfig::from_env();
    init_logging(config.profile.log_level());
    bootstrap_infrastructure(config);
    launch(App);
}

fn init_logging(level: tracing::Level) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = dioxus_logger::init(level);
    });
}

fn bootstrap_infrastructure(config: AppConfig) {
    info!(
        host = %config.host,
        port = config.port,
        profile = ?config.profile,
        connect_timeout_ms = config.connect_timeout.as_millis() as u64,
        "trace console configured"
    );
    let _ = APP_CONFIG.set(config);
}

#[component]
fn App() -> Element {
    let app_state = use_signal(|| {
        let config = APP_CONFIG.get().cloned().unwrap_or_default();
        AppState::new(&config, ViewSettings::load_or(&config))
    });

    use_context_provider(|| app_state);
    use_live_stream();

    let theme = app_state.read().settings.theme;

    rsx! {
        div { class: theme.root_class(),
            Router::<Route> {}
        }
    }
}

#[derive(Clone, Routable, Debug, PartialEq)]
pub(crate) enum Route {
    #[route("/")]
    Dashboard {},
    #[route("/tools/:tool_id")]
    ToolView { tool_id: String },
}

#[component]
fn Dashboard() -> Element {
    let app_state = use_app_state();
    let view_mode = app_state.read().settings.view_mode;

    rsx! {
        div { class: "app-shell mx-auto max-w-7xl space-y-4 p-4",
            header { class: "flex items-baseline gap-3",
                h1 { class: "text-xl font-semibold", "Trace Console" }
                p { class: "text-xs text-slate-500", "Live view of nested agent and tool executions" }
            }
            ConnectionBar {}
            div { class: "grid gap-4 lg:grid-cols-[16rem_1fr]",
                ToolPanel {}
                main { class: "min-w-0",
                    {match view_mode {
                        ViewMode::Separate => rsx! { TraceTree {} },
                        ViewMode::Timeline => rsx! { TimelineView {} },
                    }}
                }
            }
        }
    }
}
