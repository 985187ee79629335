use tracing::{debug, error};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use super::connection::{Transport, TransportError, TransportHandle, TransportSink};

/// Browser WebSocket transport.
pub struct WebSocketTransport;

struct WebSocketHandle {
    ws: WebSocket,
    _on_open: Closure<dyn FnMut(JsValue)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
    _on_error: Closure<dyn FnMut(JsValue)>,
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &str, sink: TransportSink) -> Result<Box<dyn TransportHandle>, TransportError> {
        let ws = WebSocket::new(url).map_err(|err| {
            error!(%url, ?err, "failed to create websocket");
            TransportError::Open(js_error_text(&err))
        })?;

        let on_open = {
            let sink = sink.clone();
            Closure::wrap(Box::new(move |_event: JsValue| sink.opened()) as Box<dyn FnMut(JsValue)>)
        };
        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

        let on_message = {
            let sink = sink.clone();
            Closure::wrap(Box::new(move |event: MessageEvent| {
                match event.data().as_string() {
                    Some(text) => sink.message(text),
                    None => debug!("ignoring non-text websocket frame"),
                }
            }) as Box<dyn FnMut(MessageEvent)>)
        };
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        let on_close = {
            let sink = sink.clone();
            Closure::wrap(Box::new(move |event: CloseEvent| {
                sink.closed(event.was_clean(), event.code(), event.reason());
            }) as Box<dyn FnMut(CloseEvent)>)
        };
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        let on_error = Closure::wrap(Box::new(move |event: JsValue| {
            sink.failed(TransportError::Failed(js_error_text(&event)));
        }) as Box<dyn FnMut(JsValue)>);
        ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        Ok(Box::new(WebSocketHandle {
            ws,
            _on_open: on_open,
            _on_message: on_message,
            _on_close: on_close,
            _on_error: on_error,
        }))
    }
}

impl TransportHandle for WebSocketHandle {
    fn close(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        self.ws.set_onclose(None);
        if let Err(err) = self.ws.close() {
            debug!(?err, "websocket close failed");
        }
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn js_error_text(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<web_sys::ErrorEvent>()
                .map(|event| event.message())
        })
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "websocket error".to_string())
}
