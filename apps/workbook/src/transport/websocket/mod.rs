use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use super::{Connector, EventSink, LinkCell, LinkState, Transport, TransportError, TransportEvent};
use crate::protocol::Envelope;

pub mod config;
pub use config::{EXECUTION_PATH, EndpointError, WebSocketOptions, execution_url};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Close,
}

/// One websocket per run; one text frame per envelope in each direction.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    link: LinkCell,
    events: EventSink,
    task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Starts connecting in the background and returns the pending transport.
    /// Must be called from within a tokio runtime.
    pub fn open(url: &Url, options: &WebSocketOptions, events: EventSink) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let link = LinkCell::new(LinkState::Pending);
        let task = tokio::spawn(run_link(
            url.to_string(),
            options.clone(),
            outbound_rx,
            link.clone(),
            events.clone(),
        ));
        Self {
            outbound: outbound_tx,
            link,
            events,
            task,
        }
    }
}

impl Transport for WebSocketTransport {
    fn state(&self) -> LinkState {
        self.link.get()
    }

    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let state = self.link.get();
        if state != LinkState::Ready {
            return Err(TransportError::SendFailed(state));
        }
        let text = envelope.encode()?;
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::SendFailed(LinkState::Closed))
    }

    fn close(&self) {
        match self.link.get() {
            LinkState::Pending => {
                // Nothing on the wire yet; drop the connect attempt.
                self.task.abort();
                self.link.set(LinkState::Closed);
                self.events.emit(TransportEvent::Closed {
                    reason: "closed before connecting".into(),
                });
            }
            LinkState::Ready => {
                self.link.advance(LinkState::Closing);
                let _ = self.outbound.send(Outbound::Close);
            }
            LinkState::Closing | LinkState::Closed => {}
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // A connected link finishes its close handshake on its own once the
        // outbound queue is gone.
        if self.link.get() == LinkState::Pending {
            self.task.abort();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    options: WebSocketOptions,
}

impl WebSocketConnector {
    pub fn new(options: WebSocketOptions) -> Self {
        Self { options }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &Url, events: EventSink) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::open(url, &self.options, events))
    }
}

async fn connect(url: &str, options: &WebSocketOptions) -> Result<Socket, String> {
    let attempt = connect_async(url);
    let result = match options.connect_timeout {
        Some(limit) => match timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => return Err(format!("timed out after {}ms", limit.as_millis())),
        },
        None => attempt.await,
    };
    result.map(|(socket, _)| socket).map_err(|err| err.to_string())
}

async fn run_link(
    url: String,
    options: WebSocketOptions,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    link: LinkCell,
    events: EventSink,
) {
    let socket = match connect(&url, &options).await {
        Ok(socket) => socket,
        Err(reason) => {
            link.set(LinkState::Closed);
            events.emit(TransportEvent::ConnectFailed { reason });
            return;
        }
    };
    debug!(target: "workbook::transport", %url, "websocket connected");
    link.advance(LinkState::Ready);
    events.emit(TransportEvent::Ready);

    let (mut writer, mut reader) = socket.split();
    let mut outbound_open = true;
    let mut reason = String::from("connection ended");

    loop {
        tokio::select! {
            queued = outbound.recv(), if outbound_open => match queued {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = writer.send(Message::Text(text)).await {
                        link.set(LinkState::Closed);
                        events.emit(TransportEvent::Error { reason: err.to_string() });
                        reason = "write failed".into();
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    outbound_open = false;
                    link.advance(LinkState::Closing);
                    if let Err(err) = writer.send(Message::Close(None)).await {
                        trace!(target: "workbook::transport", error = %err, "close frame not delivered");
                        reason = "closed locally".into();
                        break;
                    }
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => events.emit(TransportEvent::inbound(&text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => events.emit(TransportEvent::inbound(&text)),
                    Err(err) => events.emit(TransportEvent::Malformed {
                        reason: format!("binary frame is not utf-8: {err}"),
                    }),
                },
                Some(Ok(Message::Close(frame))) => {
                    link.advance(LinkState::Closing);
                    reason = describe_close(frame.as_ref());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    link.set(LinkState::Closed);
                    warn!(target: "workbook::transport", error = %err, "websocket read failed");
                    events.emit(TransportEvent::Error { reason: err.to_string() });
                    reason = "read failed".into();
                    break;
                }
                None => break,
            },
        }
    }

    // Flushes the reply to a peer-initiated close; errors only mean the
    // socket is already gone.
    let _ = writer.close().await;
    link.set(LinkState::Closed);
    debug!(target: "workbook::transport", %url, %reason, "websocket closed");
    events.emit(TransportEvent::Closed { reason });
}

fn describe_close(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) if frame.reason.is_empty() => format!("code {}", u16::from(frame.code)),
        Some(frame) => format!("code {}: {}", u16::from(frame.code), frame.reason),
        None => "closed by peer".into(),
    }
}
