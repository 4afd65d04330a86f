//! Per-terminal session bookkeeping.
//!
//! Each registered terminal owns a display and at most one live session. A
//! new run on a terminal supersedes the previous one: its transport is closed
//! and the generation counter moves on, so notifications still in flight from
//! the old link are recognised by their key and dropped.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use url::Url;

use super::{Session, SessionEvent, SessionState, TransportOpener};
use crate::client::display::Display;
use crate::protocol::ChunkLimit;
use crate::transport::{Connector, EventSink, Transport, TransportEvent};

/// Banner shown on a terminal until its first run starts submitting.
pub const READY_BANNER: &str = "Click 'Run' to run your code\r\n";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalId(String);

impl TerminalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one run on one terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub terminal: TerminalId,
    pub generation: u64,
}

/// A transport notification together with the run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub key: SessionKey,
    pub event: TransportEvent,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("terminal '{0}' is not registered")]
    UnknownTerminal(TerminalId),
}

struct Slot<D> {
    display: D,
    generation: u64,
    session: Option<Session>,
}

struct KeyedOpener<'a, C> {
    connector: &'a C,
    key: SessionKey,
    events: mpsc::UnboundedSender<TaggedEvent>,
}

impl<C: Connector> TransportOpener for KeyedOpener<'_, C> {
    fn open(&self, url: &Url) -> Box<dyn Transport> {
        let key = self.key.clone();
        let events = self.events.clone();
        self.connector.open(
            url,
            EventSink::new(move |event| {
                // The receiver only goes away at shutdown.
                let _ = events.send(TaggedEvent {
                    key: key.clone(),
                    event,
                });
            }),
        )
    }
}

pub struct SessionRegistry<D: Display, C: Connector> {
    connector: C,
    endpoint: Url,
    chunk_limit: ChunkLimit,
    events: mpsc::UnboundedSender<TaggedEvent>,
    slots: HashMap<TerminalId, Slot<D>>,
}

impl<D: Display, C: Connector> SessionRegistry<D, C> {
    /// Creates an empty registry. Transport notifications for every session
    /// arrive on the returned receiver and must be handed back through
    /// [`SessionRegistry::handle_transport`].
    pub fn new(
        connector: C,
        endpoint: Url,
        chunk_limit: ChunkLimit,
    ) -> (Self, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                connector,
                endpoint,
                chunk_limit,
                events,
                slots: HashMap::new(),
            },
            rx,
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Binds a display to `id` and shows the ready banner. Re-registering a
    /// terminal supersedes whatever ran on it.
    pub fn register(&mut self, id: TerminalId, mut display: D) {
        display.write(READY_BANNER);
        let generation = match self.slots.remove(&id) {
            Some(mut previous) => {
                if let Some(session) = previous.session.as_mut() {
                    session.supersede();
                }
                previous.generation + 1
            }
            None => 0,
        };
        debug!(target: "workbook::registry", terminal = %id, "terminal registered");
        self.slots.insert(
            id,
            Slot {
                display,
                generation,
                session: None,
            },
        );
    }

    /// Starts a run of `source` on terminal `id`, replacing any run already
    /// in progress there.
    pub fn run(&mut self, id: &TerminalId, source: String) -> Result<SessionKey, RegistryError> {
        let slot = self
            .slots
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownTerminal(id.clone()))?;
        if let Some(mut previous) = slot.session.take() {
            previous.supersede();
        }
        slot.generation += 1;
        let key = SessionKey {
            terminal: id.clone(),
            generation: slot.generation,
        };
        let mut session = Session::new(key.clone());
        info!(
            target: "workbook::registry",
            terminal = %id,
            generation = key.generation,
            run_id = %session.run_id(),
            "starting run"
        );
        let opener = KeyedOpener {
            connector: &self.connector,
            key: key.clone(),
            events: self.events.clone(),
        };
        session.handle(
            SessionEvent::RunRequested {
                source,
                endpoint: self.endpoint.clone(),
                chunk_limit: self.chunk_limit,
            },
            &mut slot.display,
            &opener,
        );
        slot.session = Some(session);
        Ok(key)
    }

    /// Routes a transport notification to its session. Notifications from a
    /// superseded run are discarded.
    pub fn handle_transport(&mut self, tagged: TaggedEvent) {
        let TaggedEvent { key, event } = tagged;
        let current = self
            .slots
            .get(&key.terminal)
            .and_then(|slot| slot.session.as_ref())
            .is_some_and(|session| session.key() == &key);
        if !current {
            trace!(target: "workbook::registry", terminal = %key.terminal, generation = key.generation, ?event, "stale transport event dropped");
            return;
        }
        self.deliver(&key.terminal, event.into());
    }

    /// Routes user input (or a close request) to the live session on `id`.
    pub fn handle_input(
        &mut self,
        id: &TerminalId,
        event: SessionEvent,
    ) -> Result<(), RegistryError> {
        if !self.slots.contains_key(id) {
            return Err(RegistryError::UnknownTerminal(id.clone()));
        }
        self.deliver(id, event);
        Ok(())
    }

    fn deliver(&mut self, id: &TerminalId, event: SessionEvent) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        let Some(session) = slot.session.as_mut() else {
            trace!(target: "workbook::registry", terminal = %id, ?event, "no run on terminal; event ignored");
            return;
        };
        let opener = KeyedOpener {
            connector: &self.connector,
            key: session.key().clone(),
            events: self.events.clone(),
        };
        session.handle(event, &mut slot.display, &opener);
    }

    pub fn state(&self, id: &TerminalId) -> Option<&SessionState> {
        self.slots
            .get(id)
            .and_then(|slot| slot.session.as_ref())
            .map(Session::state)
    }

    pub fn display(&self, id: &TerminalId) -> Option<&D> {
        self.slots.get(id).map(|slot| &slot.display)
    }

    /// True once the run on `id` has reached `Closed`. A terminal with no run
    /// started yet is not finished.
    pub fn is_finished(&self, id: &TerminalId) -> bool {
        self.state(id).is_some_and(SessionState::is_closed)
    }
}
