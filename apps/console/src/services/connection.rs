//! Connection lifecycle for the trace stream.
//!
//! The manager never reconnects on its own: after a failure it parks in
//! `Error` until the operator calls [`ConnectionManager::connect`] again.
//! Every connection attempt gets a new generation number; callbacks from
//! an older generation are ignored, which is how in-flight deliveries are
//! cleared on disconnect.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("no transport available on this platform: {0}")]
    Unsupported(&'static str),
    #[error("failed to open connection: {0}")]
    Open(String),
    #[error("connection attempt timed out after {0} ms")]
    Timeout(u64),
    #[error("connection closed by peer (code {code}): {reason}")]
    Closed { code: u16, reason: String },
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Snapshot handed to state listeners after every transition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub endpoint: Option<String>,
    pub error: Option<TransportError>,
    pub generation: u64,
}

/// One raw inbound message, tagged with the connection that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub generation: u64,
    pub raw: String,
}

pub trait Transport {
    /// Starts opening `url`. Progress is reported through `sink`; the
    /// returned handle is closed when the connection is torn down.
    fn open(&self, url: &str, sink: TransportSink) -> Result<Box<dyn TransportHandle>, TransportError>;
}

pub trait TransportHandle {
    fn close(&mut self);
}

/// Fallback for targets without a browser WebSocket.
pub struct UnsupportedTransport;

impl Transport for UnsupportedTransport {
    fn open(&self, _url: &str, _sink: TransportSink) -> Result<Box<dyn TransportHandle>, TransportError> {
        Err(TransportError::Unsupported("live streaming requires the wasm32 build"))
    }
}

pub fn platform_transport() -> Rc<dyn Transport> {
    #[cfg(target_arch = "wasm32")]
    {
        Rc::new(crate::services::websocket::WebSocketTransport)
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        Rc::new(UnsupportedTransport)
    }
}

pub fn endpoint_url(host: &str, port: u16) -> Result<String, TransportError> {
    let trimmed = host.trim();
    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        ("ws", rest)
    } else {
        ("ws", trimmed)
    };
    let rest = rest.trim_end_matches('/');

    if rest.is_empty()
        || port == 0
        || rest.contains(|c: char| c.is_whitespace() || c == '/' || c == '?' || c == '#')
    {
        return Err(TransportError::InvalidEndpoint(format!("{trimmed}:{port}")));
    }

    let host = if rest.contains(':') && !rest.starts_with('[') {
        format!("[{rest}]")
    } else {
        rest.to_string()
    };
    Ok(format!("{scheme}://{host}:{port}"))
}

type MessageHandler = Rc<dyn Fn(Delivery)>;
type StateHandler = Rc<dyn Fn(ConnectionStatus)>;

struct Shared {
    state: ConnectionState,
    generation: u64,
    endpoint: Option<String>,
    last_error: Option<TransportError>,
    session_id: Option<Uuid>,
    connect_timeout: Duration,
    handle: Option<Box<dyn TransportHandle>>,
    on_message: Option<MessageHandler>,
    on_state: Option<StateHandler>,
    #[cfg(target_arch = "wasm32")]
    connect_timer: Option<gloo_timers::callback::Timeout>,
}

impl Shared {
    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            endpoint: self.endpoint.clone(),
            error: self.last_error.clone(),
            generation: self.generation,
        }
    }

    fn cancel_connect_timer(&mut self) {
        #[cfg(target_arch = "wasm32")]
        {
            self.connect_timer = None;
        }
    }
}

/// Moves `cell` to `next`, provided `generation` is still current and the
/// present state is one of `from`. Leaving for `Disconnected` or `Error`
/// retires the generation and closes the transport.
fn transition(
    cell: &Rc<RefCell<Shared>>,
    generation: u64,
    from: &[ConnectionState],
    next: ConnectionState,
    error: Option<TransportError>,
) -> bool {
    let (listener, status, retired) = {
        let mut shared = cell.borrow_mut();
        if shared.generation != generation || !from.contains(&shared.state) {
            return false;
        }

        let changed = shared.state != next || shared.last_error != error;
        shared.state = next;
        shared.last_error = error;
        let mut retired = None;
        match next {
            ConnectionState::Disconnected | ConnectionState::Error => {
                shared.generation += 1;
                shared.cancel_connect_timer();
                retired = shared.handle.take();
            }
            ConnectionState::Connected => shared.cancel_connect_timer(),
            ConnectionState::Connecting => {}
        }
        let listener = if changed { shared.on_state.clone() } else { None };
        (listener, shared.status(), retired)
    };

    if let Some(mut handle) = retired {
        handle.close();
    }
    if let Some(listener) = listener {
        listener(status);
    }
    true
}

/// Callback surface a [`Transport`] reports into. Cheap to clone; calls
/// made after the connection was retired are ignored.
#[derive(Clone)]
pub struct TransportSink {
    shared: Weak<RefCell<Shared>>,
    generation: u64,
}

impl TransportSink {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        if let Some(cell) = self.shared.upgrade() {
            if transition(
                &cell,
                self.generation,
                &[ConnectionState::Connecting],
                ConnectionState::Connected,
                None,
            ) {
                info!(generation = self.generation, "trace stream connected");
            }
        }
    }

    pub fn message(&self, raw: String) {
        let Some(cell) = self.shared.upgrade() else {
            return;
        };
        let handler = {
            let shared = cell.borrow();
            if shared.generation != self.generation || shared.state != ConnectionState::Connected {
                debug!(generation = self.generation, "dropping message from inactive connection");
                return;
            }
            shared.on_message.clone()
        };
        match handler {
            Some(handler) => handler(Delivery {
                generation: self.generation,
                raw,
            }),
            None => warn!("trace message received with no consumer registered"),
        }
    }

    pub fn failed(&self, error: TransportError) {
        if let Some(cell) = self.shared.upgrade() {
            let reason = error.to_string();
            if transition(
                &cell,
                self.generation,
                &[ConnectionState::Connecting, ConnectionState::Connected],
                ConnectionState::Error,
                Some(error),
            ) {
                warn!(generation = self.generation, %reason, "trace stream failed");
            }
        }
    }

    pub fn closed(&self, clean: bool, code: u16, reason: String) {
        let Some(cell) = self.shared.upgrade() else {
            return;
        };
        let active = [ConnectionState::Connecting, ConnectionState::Connected];
        if clean {
            if transition(&cell, self.generation, &active, ConnectionState::Disconnected, None) {
                info!(generation = self.generation, code, "trace stream closed by peer");
            }
        } else {
            self.failed(TransportError::Closed { code, reason });
        }
    }

    pub fn timed_out(&self) {
        let Some(cell) = self.shared.upgrade() else {
            return;
        };
        let timeout_ms = cell.borrow().connect_timeout.as_millis() as u64;
        if transition(
            &cell,
            self.generation,
            &[ConnectionState::Connecting],
            ConnectionState::Error,
            Some(TransportError::Timeout(timeout_ms)),
        ) {
            warn!(generation = self.generation, timeout_ms, "trace stream connect timed out");
        }
    }
}

#[derive(Clone)]
pub struct ConnectionManager {
    shared: Rc<RefCell<Shared>>,
    transport: Rc<dyn Transport>,
}

impl ConnectionManager {
    pub fn new(transport: Rc<dyn Transport>, connect_timeout: Duration) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                state: ConnectionState::Disconnected,
                generation: 0,
                endpoint: None,
                last_error: None,
                session_id: None,
                connect_timeout,
                handle: None,
                on_message: None,
                on_state: None,
                #[cfg(target_arch = "wasm32")]
                connect_timer: None,
            })),
            transport,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.borrow().state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.borrow().status()
    }

    pub fn last_error(&self) -> Option<TransportError> {
        self.shared.borrow().last_error.clone()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.shared.borrow().endpoint.clone()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.borrow().session_id
    }

    /// True while `generation` belongs to the live connection.
    pub fn is_current(&self, generation: u64) -> bool {
        let shared = self.shared.borrow();
        shared.generation == generation && shared.state.is_active()
    }

    /// Registers the single consumer of inbound messages, replacing any
    /// previous one.
    pub fn on_message(&self, handler: impl Fn(Delivery) + 'static) {
        let mut shared = self.shared.borrow_mut();
        if shared.on_message.is_some() {
            debug!("replacing trace message consumer");
        }
        shared.on_message = Some(Rc::new(handler));
    }

    pub fn on_state_change(&self, handler: impl Fn(ConnectionStatus) + 'static) {
        self.shared.borrow_mut().on_state = Some(Rc::new(handler));
    }

    pub fn connect(&self, host: &str, port: u16) {
        let generation = self.begin_attempt();
        let session_id = Uuid::new_v4();

        let url = match endpoint_url(host, port) {
            Ok(url) => url,
            Err(err) => {
                warn!(%host, port, error = %err, "refusing to connect");
                self.notify();
                self.fail(generation, err);
                return;
            }
        };

        {
            let mut shared = self.shared.borrow_mut();
            shared.endpoint = Some(url.clone());
            shared.session_id = Some(session_id);
        }
        self.notify();
        info!(session = %session_id, endpoint = %url, generation, "opening trace stream");

        let sink = TransportSink {
            shared: Rc::downgrade(&self.shared),
            generation,
        };

        match self.transport.open(&url, sink.clone()) {
            Ok(mut handle) => {
                let mut shared = self.shared.borrow_mut();
                if shared.generation == generation && shared.state.is_active() {
                    shared.handle = Some(handle);
                    if shared.state == ConnectionState::Connecting {
                        arm_connect_timer(&mut shared, sink);
                    }
                } else {
                    drop(shared);
                    handle.close();
                }
            }
            Err(err) => {
                warn!(session = %session_id, error = %err, "could not open trace stream");
                self.fail(generation, err);
            }
        }
    }

    /// Deliberately closes the connection. Safe to call in any state.
    pub fn disconnect(&self) {
        let generation = self.shared.borrow().generation;
        let from = [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
        ];
        if transition(&self.shared, generation, &from, ConnectionState::Disconnected, None) {
            info!(generation, "trace stream disconnected by operator");
        }
    }

    /// Retires any current connection and enters `Connecting` with a fresh
    /// generation.
    fn begin_attempt(&self) -> u64 {
        let retired = {
            let mut shared = self.shared.borrow_mut();
            shared.generation += 1;
            shared.cancel_connect_timer();
            shared.state = ConnectionState::Connecting;
            shared.last_error = None;
            shared.endpoint = None;
            shared.handle.take()
        };
        if let Some(mut handle) = retired {
            handle.close();
        }
        self.shared.borrow().generation
    }

    fn fail(&self, generation: u64, error: TransportError) {
        transition(
            &self.shared,
            generation,
            &[ConnectionState::Connecting, ConnectionState::Connected],
            ConnectionState::Error,
            Some(error),
        );
    }

    fn notify(&self) {
        let (listener, status) = {
            let shared = self.shared.borrow();
            (shared.on_state.clone(), shared.status())
        };
        if let Some(listener) = listener {
            listener(status);
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn arm_connect_timer(shared: &mut Shared, sink: TransportSink) {
    let millis = u32::try_from(shared.connect_timeout.as_millis()).unwrap_or(u32::MAX);
    shared.connect_timer = Some(gloo_timers::callback::Timeout::new(millis, move || {
        sink.timed_out();
    }));
}

#[cfg(not(target_arch = "wasm32"))]
fn arm_connect_timer(_shared: &mut Shared, _sink: TransportSink) {}
