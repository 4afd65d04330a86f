use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use url::Url;

use crate::protocol::{Envelope, EnvelopeError};

pub mod mock;
pub mod websocket;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Pending,
    Ready,
    Closing,
    Closed,
}

impl LinkState {
    fn as_u8(self) -> u8 {
        match self {
            LinkState::Pending => 0,
            LinkState::Ready => 1,
            LinkState::Closing => 2,
            LinkState::Closed => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LinkState::Pending,
            1 => LinkState::Ready,
            2 => LinkState::Closing,
            _ => LinkState::Closed,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkState::Pending => "pending",
            LinkState::Ready => "ready",
            LinkState::Closing => "closing",
            LinkState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Link state shared between a transport handle and its I/O task.
#[derive(Clone, Debug)]
pub(crate) struct LinkCell(Arc<AtomicU8>);

impl LinkCell {
    pub(crate) fn new(state: LinkState) -> Self {
        Self(Arc::new(AtomicU8::new(state.as_u8())))
    }

    pub(crate) fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: LinkState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Moves to `next` unless the link already reached `Closed`.
    pub(crate) fn advance(&self, next: LinkState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if LinkState::from_u8(current) == LinkState::Closed {
                    None
                } else {
                    Some(next.as_u8())
                }
            });
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: transport is {0}")]
    SendFailed(LinkState),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Notifications a transport reports about itself, in the order they happen.
///
/// A transport emits either `ConnectFailed` and nothing else, or `Ready`
/// followed by any number of `Message` / `Malformed` and a single `Closed`
/// (possibly preceded by `Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Ready,
    ConnectFailed { reason: String },
    Message(Envelope),
    Malformed { reason: String },
    Error { reason: String },
    Closed { reason: String },
}

impl TransportEvent {
    /// Decodes one inbound payload into a `Message` or `Malformed` event.
    pub fn inbound(payload: &str) -> Self {
        match Envelope::decode(payload) {
            Ok(envelope) => TransportEvent::Message(envelope),
            Err(err) => TransportEvent::Malformed {
                reason: err.to_string(),
            },
        }
    }
}

/// Where a transport delivers its notifications.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(TransportEvent) + Send + Sync>);

impl EventSink {
    pub fn new(deliver: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(deliver))
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Sending half of one connection. Inbound traffic and lifecycle changes are
/// reported through the [`EventSink`] the transport was opened with.
pub trait Transport: Send {
    fn state(&self) -> LinkState;

    /// Queues one envelope. Envelopes leave in call order; fails unless the
    /// link is `Ready`.
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Requests a graceful shutdown. Calling it again is a no-op.
    fn close(&self);
}

/// Opens transports. `open` returns immediately with a pending transport; the
/// outcome of the connect attempt arrives later as `Ready` or `ConnectFailed`.
pub trait Connector {
    fn open(&self, url: &Url, events: EventSink) -> Box<dyn Transport>;
}
