//! Single-terminal front end.
//!
//! [`TerminalClient`] is the only place session state is touched while a run
//! is live. It pulls transport notifications and input events off two
//! channels in one loop, so the session never sees concurrent callers.

pub mod run;

use crossterm::event::{self, Event};
use std::io::{self, Read};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::client::adapter::{Clipboard, InputEvent, KeyInput, TerminalAdapter};
use crate::client::display::Display;
use crate::session::{SessionRegistry, SessionState, TaggedEvent, TerminalId};
use crate::transport::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Live keyboard. Keys reach the session as they arrive, so anything
    /// typed before the program is interactive is dropped.
    Keyboard,
    /// Scripted input such as piped stdin. Held back until the program is
    /// interactive.
    Piped,
}

pub struct TerminalClient<D: Display, C: Connector, K: Clipboard> {
    registry: SessionRegistry<D, C>,
    transport_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    terminal: TerminalId,
    adapter: TerminalAdapter<K>,
    mode: InputMode,
}

impl<D: Display, C: Connector, K: Clipboard> TerminalClient<D, C, K> {
    pub fn new(
        registry: SessionRegistry<D, C>,
        transport_rx: mpsc::UnboundedReceiver<TaggedEvent>,
        terminal: TerminalId,
        adapter: TerminalAdapter<K>,
        mode: InputMode,
    ) -> Self {
        Self {
            registry,
            transport_rx,
            terminal,
            adapter,
            mode,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<D, C> {
        &self.registry
    }

    /// Pumps transport notifications and input until the run on this
    /// terminal is closed.
    pub async fn run(&mut self, mut input: mpsc::UnboundedReceiver<InputEvent>) {
        let mut input_open = true;
        debug!(target: "workbook::client", terminal = %self.terminal, mode = ?self.mode, "client loop started");

        while !self.registry.is_finished(&self.terminal) {
            let accept_input = input_open && self.accepts_input();
            tokio::select! {
                Some(tagged) = self.transport_rx.recv() => {
                    self.registry.handle_transport(tagged);
                }
                next = input.recv(), if accept_input => match next {
                    Some(event) => self.forward(event),
                    None => {
                        debug!(target: "workbook::client", "input source closed");
                        input_open = false;
                    }
                },
                else => break,
            }
        }

        debug!(target: "workbook::client", terminal = %self.terminal, "client loop finished");
    }

    fn accepts_input(&self) -> bool {
        if self
            .registry
            .display(&self.terminal)
            .is_some_and(|display| display.is_blurred())
        {
            return false;
        }
        match self.mode {
            InputMode::Keyboard => true,
            InputMode::Piped => matches!(
                self.registry.state(&self.terminal),
                Some(SessionState::Interactive)
            ),
        }
    }

    fn forward(&mut self, input: InputEvent) {
        trace!(target: "workbook::client", ?input, "input event");
        let Some(event) = self.adapter.translate(input) else {
            return;
        };
        if let Err(err) = self.registry.handle_input(&self.terminal, event) {
            warn!(target: "workbook::client", error = %err, "input not delivered");
        }
    }
}

/// Reads key and paste events from the controlling terminal on a dedicated
/// thread. The thread ends at the first read error or once the receiver is
/// gone.
pub fn spawn_keyboard_reader() -> io::Result<mpsc::UnboundedReceiver<InputEvent>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("workbook-keyboard".into())
        .spawn(move || {
            loop {
                let input = match event::read() {
                    Ok(Event::Key(key)) => KeyInput::from_crossterm(key).map(InputEvent::Key),
                    Ok(Event::Paste(text)) => Some(InputEvent::Paste(text)),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(target: "workbook::client", error = %err, "keyboard read failed");
                        break;
                    }
                };
                if let Some(input) = input {
                    if tx.send(input).is_err() {
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Forwards everything readable from `reader` as one paste, then ends input
/// the way Ctrl-D would.
pub fn spawn_piped_reader<R: Read + Send + 'static>(
    mut reader: R,
) -> io::Result<mpsc::UnboundedReceiver<InputEvent>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("workbook-stdin".into())
        .spawn(move || {
            let mut text = String::new();
            if let Err(err) = reader.read_to_string(&mut text) {
                warn!(target: "workbook::client", error = %err, "stdin read failed");
            }
            if !text.is_empty() {
                let _ = tx.send(InputEvent::Paste(text));
            }
            let _ = tx.send(InputEvent::Key(KeyInput::ctrl('d')));
        })?;
    Ok(rx)
}
