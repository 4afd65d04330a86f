pub mod machine;
pub mod registry;
pub mod terminal;

use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::client::display::Display;
use crate::protocol::Envelope;
use crate::transport::{LinkState, Transport, TransportError};

pub use machine::{
    DONE_NOTICE, Effect, SessionEvent, SessionState, Transition, dispatch, normalize_keystroke,
    normalize_output, submission,
};
pub use registry::{
    READY_BANNER, RegistryError, SessionKey, SessionRegistry, TaggedEvent, TerminalId,
};

/// Failures a session absorbs. None of them escape the session: each is
/// logged and, where fatal, ends the run with the closed notice.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connect failed: {reason}")]
    ConnectFailed { reason: String },
    #[error(transparent)]
    SendFailed(#[from] TransportError),
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },
    #[error("code submission aborted after {sent} of {total} envelopes: {reason}")]
    AbortedSubmission {
        sent: usize,
        total: usize,
        reason: String,
    },
}

/// Opens the transport for a run. The registry supplies one that tags the
/// transport's notifications with the session key.
pub trait TransportOpener {
    fn open(&self, url: &Url) -> Box<dyn Transport>;
}

/// One run on one terminal: the machine state plus the transport it owns.
pub struct Session {
    key: SessionKey,
    run_id: Uuid,
    state: SessionState,
    transport: Option<Box<dyn Transport>>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            run_id: Uuid::new_v4(),
            state: SessionState::Idle,
            transport: None,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs `event` through the state machine and performs the resulting
    /// effects. Submission outcomes are fed back before returning.
    pub fn handle<D: Display + ?Sized>(
        &mut self,
        event: SessionEvent,
        display: &mut D,
        opener: &dyn TransportOpener,
    ) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let state = std::mem::replace(&mut self.state, SessionState::Idle);
            let from = state.name();
            let Transition { next, effects } = dispatch(state, event);
            if next.name() != from {
                debug!(
                    target: "workbook::session",
                    terminal = %self.key.terminal,
                    run_id = %self.run_id,
                    from,
                    to = next.name(),
                    "state changed"
                );
            }
            self.state = next;
            for effect in effects {
                self.apply(effect, display, opener, &mut pending);
            }
        }
    }

    /// Releases the transport of a run that a newer run replaces.
    pub fn supersede(&mut self) {
        if let Some(transport) = self.transport.take() {
            debug!(target: "workbook::session", terminal = %self.key.terminal, run_id = %self.run_id, "run superseded");
            transport.close();
        }
    }

    fn apply<D: Display + ?Sized>(
        &mut self,
        effect: Effect,
        display: &mut D,
        opener: &dyn TransportOpener,
        pending: &mut VecDeque<SessionEvent>,
    ) {
        match effect {
            Effect::OpenTransport(url) => {
                self.transport = Some(opener.open(&url));
            }
            Effect::Submit(envelopes) => {
                let total = envelopes.len();
                for (sent, envelope) in envelopes.iter().enumerate() {
                    if let Err(err) = self.send(envelope) {
                        pending.push_back(SessionEvent::SubmissionAborted {
                            sent,
                            total,
                            reason: err.to_string(),
                        });
                        return;
                    }
                }
                pending.push_back(SessionEvent::SubmissionComplete);
            }
            Effect::Send(envelope) => {
                if let Err(err) = self.send(&envelope) {
                    let error = SessionError::from(err);
                    warn!(
                        target: "workbook::session",
                        terminal = %self.key.terminal,
                        error = %error,
                        category = %envelope.category(),
                        "input dropped"
                    );
                }
            }
            Effect::Write(text) => display.write(&text),
            Effect::ClearDisplay => display.clear(),
            Effect::Blur => display.blur(),
            Effect::CloseTransport => {
                if let Some(transport) = self.transport.take() {
                    transport.close();
                }
            }
        }
    }

    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or(TransportError::SendFailed(LinkState::Closed))?;
        transport.send(envelope)?;
        debug!(
            target: "workbook::session",
            run_id = %self.run_id,
            category = %envelope.category(),
            body = envelope.body(),
            "sent envelope"
        );
        Ok(())
    }
}
