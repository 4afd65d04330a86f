#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use url::Url;
use workbook_client_core::transport::websocket::execution_url;
use workbook_client_core::transport::{EventSink, TransportEvent};

pub const WAIT: Duration = Duration::from_secs(5);

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Binds a loopback listener and returns it with the execution URL a client
/// should dial.
pub async fn bind() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let url = execution_url(&format!("http://{addr}")).expect("execution url");
    (listener, url)
}

pub async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = listener.accept().await.expect("accept");
    accept_async(stream).await.expect("websocket handshake")
}

/// Next text frame decoded as `(category, body)`, or `None` once the client
/// has closed.
pub async fn next_envelope(socket: &mut ServerSocket) -> Option<(String, String)> {
    while let Some(frame) = socket.next().await {
        match frame.expect("server read") {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(&text).expect("envelope json");
                let field = |name: &str| {
                    value[name]
                        .as_str()
                        .unwrap_or_else(|| panic!("missing {name} in {text}"))
                        .to_string()
                };
                return Some((field("category"), field("body")));
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

pub async fn send_envelope(socket: &mut ServerSocket, category: &str, body: &str) {
    let text = json!({ "category": category, "body": body }).to_string();
    socket.send(Message::Text(text)).await.expect("server send");
}

pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<TransportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(move |event| {
        let _ = tx.send(event);
    });
    (sink, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("transport event in time")
        .expect("event channel open")
}
