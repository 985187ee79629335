use std::time::Duration;

use dioxus::prelude::*;
use futures::StreamExt;
use tracing::{debug, info};

use crate::fixtures::trace::sample_session;
use crate::services::connection::{platform_transport, ConnectionManager, ConnectionStatus, Delivery};
use crate::state::use_app_actions;
use crate::APP_CONFIG;

/// Commands and transport notifications consumed by the live coroutine.
#[derive(Clone, Debug, PartialEq)]
pub enum LiveSignal {
    Connect,
    Disconnect,
    /// Load the bundled sample trace without a connection.
    Replay,
    Clear,
    State(ConnectionStatus),
    Message(Delivery),
}

/// Owns the single [`ConnectionManager`] of the app. Child components
/// reach the returned coroutine through `use_coroutine_handle::<LiveSignal>()`.
pub fn use_live_stream() -> Coroutine<LiveSignal> {
    let actions = use_app_actions();
    let manager = use_hook(|| {
        let timeout = APP_CONFIG
            .get()
            .map(|config| config.connect_timeout)
            .unwrap_or(Duration::from_secs(5));
        ConnectionManager::new(platform_transport(), timeout)
    });

    let coroutine = use_coroutine({
        let manager = manager.clone();
        move |mut rx: UnboundedReceiver<LiveSignal>| {
            let manager = manager.clone();
            async move {
                while let Some(signal) = rx.next().await {
                    match signal {
                        LiveSignal::Connect => {
                            let settings = actions.settings();
                            actions.reset_trace();
                            manager.connect(&settings.host, settings.port);
                        }
                        LiveSignal::Disconnect => manager.disconnect(),
                        LiveSignal::Replay => {
                            manager.disconnect();
                            actions.reset_trace();
                            let messages = sample_session();
                            info!(count = messages.len(), "replaying sample trace");
                            for raw in messages {
                                actions.apply_raw(&raw);
                            }
                        }
                        LiveSignal::Clear => actions.reset_trace(),
                        LiveSignal::State(status) => actions.set_connection(status),
                        LiveSignal::Message(delivery) => {
                            if manager.is_current(delivery.generation) {
                                actions.apply_raw(&delivery.raw);
                            } else {
                                debug!(generation = delivery.generation, "discarding stale delivery");
                            }
                        }
                    }
                }
            }
        }
    });

    use_hook({
        let manager = manager.clone();
        move || {
            manager.on_message(move |delivery| coroutine.send(LiveSignal::Message(delivery)));
            manager.on_state_change(move |status| coroutine.send(LiveSignal::State(status)));
        }
    });

    use_drop(move || manager.disconnect());

    coroutine
}
