//! In-process transport for tests and offline demos.
//!
//! `MockConnector` hands out `MockTransport`s and remembers every link it
//! opened, so a test can play the backend: mark the link ready, push inbound
//! payloads, close it, and inspect what the client sent.

use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

use super::{Connector, EventSink, LinkState, Transport, TransportError, TransportEvent};
use crate::protocol::Envelope;

#[derive(Debug)]
struct LinkInner {
    state: LinkState,
    sent: Vec<Envelope>,
    fail_after: Option<usize>,
    close_requests: usize,
}

/// Test-side view of one mock link.
#[derive(Clone, Debug)]
pub struct MockLink {
    url: Url,
    inner: Arc<Mutex<LinkInner>>,
    events: EventSink,
}

impl MockLink {
    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    /// Everything the client managed to send, in order.
    pub fn sent(&self) -> Vec<Envelope> {
        self.lock().sent.clone()
    }

    pub fn close_requests(&self) -> usize {
        self.lock().close_requests
    }

    /// Completes the connect attempt.
    pub fn accept(&self) {
        self.lock().state = LinkState::Ready;
        self.events.emit(TransportEvent::Ready);
    }

    /// Fails the connect attempt.
    pub fn refuse(&self, reason: &str) {
        self.lock().state = LinkState::Closed;
        self.events.emit(TransportEvent::ConnectFailed {
            reason: reason.to_string(),
        });
    }

    pub fn deliver(&self, envelope: Envelope) {
        self.events.emit(TransportEvent::Message(envelope));
    }

    /// Delivers a raw wire payload, decoding it the way a real link would.
    pub fn deliver_raw(&self, payload: &str) {
        self.events.emit(TransportEvent::inbound(payload));
    }

    /// The peer goes away; later sends fail.
    pub fn close_remote(&self, reason: &str) {
        self.lock().state = LinkState::Closed;
        self.events.emit(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }
}

pub struct MockTransport {
    link: MockLink,
}

impl Transport for MockTransport {
    fn state(&self) -> LinkState {
        self.link.state()
    }

    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let mut inner = self.link.lock();
        if inner.state != LinkState::Ready {
            return Err(TransportError::SendFailed(inner.state));
        }
        if inner.fail_after.is_some_and(|limit| inner.sent.len() >= limit) {
            inner.state = LinkState::Closed;
            return Err(TransportError::SendFailed(LinkState::Closed));
        }
        inner.sent.push(envelope.clone());
        Ok(())
    }

    fn close(&self) {
        let mut inner = self.link.lock();
        inner.close_requests += 1;
        if matches!(inner.state, LinkState::Pending | LinkState::Ready) {
            inner.state = LinkState::Closing;
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    fail_after: Option<usize>,
    opened: Arc<Mutex<Vec<MockLink>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links opened by this connector drop their connection when a send is
    /// attempted after `sends` envelopes went through.
    pub fn failing_after(sends: usize) -> Self {
        Self {
            fail_after: Some(sends),
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<MockLink> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<MockLink> {
        self.opened().pop()
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &Url, events: EventSink) -> Box<dyn Transport> {
        let link = MockLink {
            url: url.clone(),
            inner: Arc::new(Mutex::new(LinkInner {
                state: LinkState::Pending,
                sent: Vec::new(),
                fail_after: self.fail_after,
                close_requests: 0,
            })),
            events,
        };
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(link.clone());
        Box::new(MockTransport { link })
    }
}
