pub mod connection;
pub mod dispatcher;

#[cfg(target_arch = "wasm32")]
pub mod websocket;
