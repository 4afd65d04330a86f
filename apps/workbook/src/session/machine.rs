//! Run lifecycle as a pure transition function.
//!
//! [`dispatch`] takes the current state and one event and returns the next
//! state plus the side effects to perform, in order. It never touches the
//! transport or the display itself; [`super::Session`] executes the effects
//! and feeds submission outcomes back in as events.

use tracing::{debug, info, trace, warn};
use url::Url;

use super::SessionError;
use crate::protocol::{ChunkLimit, Envelope, split};
use crate::transport::TransportEvent;

/// Notice written when a run ends, whatever the cause.
pub const DONE_NOTICE: &str = "Done!\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting {
        source: String,
        chunk_limit: ChunkLimit,
    },
    SubmittingCode,
    Interactive,
    /// Input is over (or a close was requested); output is still rendered
    /// until the transport closes.
    Closing,
    Closed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting { .. } => "connecting",
            SessionState::SubmittingCode => "submitting_code",
            SessionState::Interactive => "interactive",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RunRequested {
        source: String,
        endpoint: Url,
        chunk_limit: ChunkLimit,
    },
    TransportReady,
    ConnectFailed {
        reason: String,
    },
    /// Every submission envelope was accepted by the transport.
    SubmissionComplete,
    SubmissionAborted {
        sent: usize,
        total: usize,
        reason: String,
    },
    Inbound(Envelope),
    InboundMalformed {
        reason: String,
    },
    Keystroke(String),
    Paste(String),
    EndOfInput,
    CloseRequested,
    TransportError {
        reason: String,
    },
    TransportClosed {
        reason: String,
    },
}

impl From<TransportEvent> for SessionEvent {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Ready => SessionEvent::TransportReady,
            TransportEvent::ConnectFailed { reason } => SessionEvent::ConnectFailed { reason },
            TransportEvent::Message(envelope) => SessionEvent::Inbound(envelope),
            TransportEvent::Malformed { reason } => SessionEvent::InboundMalformed { reason },
            TransportEvent::Error { reason } => SessionEvent::TransportError { reason },
            TransportEvent::Closed { reason } => SessionEvent::TransportClosed { reason },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTransport(Url),
    /// Send these envelopes in order, stopping at the first failure.
    Submit(Vec<Envelope>),
    Send(Envelope),
    Write(String),
    ClearDisplay,
    Blur,
    CloseTransport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: SessionState) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn closed() -> Self {
        Self::to(SessionState::Closed)
            .with(Effect::Write(DONE_NOTICE.to_string()))
            .with(Effect::Blur)
            .with(Effect::CloseTransport)
    }
}

/// Envelopes uploaded for one run: one `code` envelope per fragment, then the
/// program EOF marker.
pub fn submission(source: &str, chunk_limit: ChunkLimit) -> Vec<Envelope> {
    split(source, chunk_limit)
        .into_iter()
        .map(Envelope::code)
        .chain(std::iter::once(Envelope::program_eof()))
        .collect()
}

/// Output as the display needs it: the widget does not turn `\n` into a new
/// line on its own.
pub fn normalize_output(body: &str) -> String {
    body.replace('\n', "\r\n")
}

/// Keystroke text as echoed and sent: Enter (`\r`) becomes `\r\n`.
pub fn normalize_keystroke(key: &str) -> String {
    key.replace('\r', "\r\n")
}

fn forward_keystroke(transition: Transition, key: &str) -> Transition {
    let text = normalize_keystroke(key);
    transition
        .with(Effect::Write(text.clone()))
        .with(Effect::Send(Envelope::stdin(text)))
}

pub fn dispatch(state: SessionState, event: SessionEvent) -> Transition {
    use SessionEvent as E;
    use SessionState as S;

    match (state, event) {
        (S::Closed, event) => {
            trace!(target: "workbook::session", ?event, "session closed; event ignored");
            Transition::to(S::Closed)
        }
        (
            S::Idle,
            E::RunRequested {
                source,
                endpoint,
                chunk_limit,
            },
        ) => {
            info!(target: "workbook::session", %endpoint, source_chars = source.chars().count(), "run requested");
            Transition::to(S::Connecting {
                source,
                chunk_limit,
            })
            .with(Effect::OpenTransport(endpoint))
        }
        (
            S::Connecting {
                source,
                chunk_limit,
            },
            E::TransportReady,
        ) => {
            let envelopes = submission(&source, chunk_limit);
            debug!(target: "workbook::session", envelopes = envelopes.len(), "submitting code");
            Transition::to(S::SubmittingCode)
                .with(Effect::ClearDisplay)
                .with(Effect::Submit(envelopes))
        }
        (S::Connecting { .. }, E::ConnectFailed { reason }) => {
            let error = SessionError::ConnectFailed { reason };
            warn!(target: "workbook::session", error = %error, "run failed");
            Transition::closed()
        }
        (S::SubmittingCode, E::SubmissionComplete) => {
            info!(target: "workbook::session", "code submitted; session interactive");
            Transition::to(S::Interactive)
        }
        (
            S::SubmittingCode,
            E::SubmissionAborted {
                sent,
                total,
                reason,
            },
        ) => {
            let error = SessionError::AbortedSubmission {
                sent,
                total,
                reason,
            };
            warn!(target: "workbook::session", error = %error, "run failed");
            Transition::closed()
        }
        (state @ (S::SubmittingCode | S::Interactive | S::Closing), E::Inbound(envelope)) => {
            if envelope.category().is_output() {
                trace!(target: "workbook::session", category = %envelope.category(), bytes = envelope.body().len(), "inbound envelope");
            } else {
                debug!(target: "workbook::session", category = %envelope.category(), "rendering non-output envelope");
            }
            Transition::to(state).with(Effect::Write(normalize_output(envelope.body())))
        }
        (state, E::InboundMalformed { reason }) => {
            let error = SessionError::MalformedEnvelope { reason };
            warn!(target: "workbook::session", error = %error, "dropping inbound message");
            Transition::to(state)
        }
        (S::Interactive, E::Keystroke(key)) => forward_keystroke(Transition::to(S::Interactive), &key),
        (S::Interactive, E::Paste(text)) => {
            let mut buf = [0u8; 4];
            text.chars().fold(Transition::to(S::Interactive), |transition, ch| {
                forward_keystroke(transition, ch.encode_utf8(&mut buf))
            })
        }
        (S::Interactive, E::EndOfInput) => {
            debug!(target: "workbook::session", "stdin closed by user");
            Transition::to(S::Closing).with(Effect::Send(Envelope::stdin_eof()))
        }
        (S::Connecting { .. }, E::CloseRequested) => Transition::closed(),
        (S::SubmittingCode | S::Interactive | S::Closing, E::CloseRequested) => {
            info!(target: "workbook::session", "close requested");
            Transition::to(S::Closing).with(Effect::CloseTransport)
        }
        (S::Idle, event) => {
            trace!(target: "workbook::session", ?event, "no run in progress; event ignored");
            Transition::to(S::Idle)
        }
        (_, E::TransportError { reason }) => {
            warn!(target: "workbook::session", %reason, "transport error");
            Transition::closed()
        }
        (_, E::TransportClosed { reason }) => {
            info!(target: "workbook::session", %reason, "transport closed");
            Transition::closed()
        }
        (state, event) => {
            trace!(target: "workbook::session", state = state.name(), ?event, "event ignored");
            Transition::to(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Category, EofContext};

    fn endpoint() -> Url {
        Url::parse("ws://127.0.0.1:4400/echo").expect("url")
    }

    fn connecting(source: &str) -> SessionState {
        SessionState::Connecting {
            source: source.to_string(),
            chunk_limit: ChunkLimit::default(),
        }
    }

    fn sent(effects: &[Effect]) -> Vec<Envelope> {
        effects
            .iter()
            .flat_map(|effect| match effect {
                Effect::Send(envelope) => vec![envelope.clone()],
                Effect::Submit(envelopes) => envelopes.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn written(effects: &[Effect]) -> String {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Write(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn run_request_opens_transport() {
        let transition = dispatch(
            SessionState::Idle,
            SessionEvent::RunRequested {
                source: "print(1)".into(),
                endpoint: endpoint(),
                chunk_limit: ChunkLimit::default(),
            },
        );
        assert_eq!(transition.next, connecting("print(1)"));
        assert_eq!(transition.effects, vec![Effect::OpenTransport(endpoint())]);
    }

    #[test]
    fn ready_submits_fragments_then_program_eof() {
        let source = "y".repeat(1200);
        let transition = dispatch(connecting(&source), SessionEvent::TransportReady);
        assert_eq!(transition.next, SessionState::SubmittingCode);
        assert_eq!(transition.effects[0], Effect::ClearDisplay);

        let envelopes = sent(&transition.effects);
        let lengths: Vec<usize> = envelopes[..3].iter().map(|e| e.body().len()).collect();
        assert_eq!(lengths, vec![512, 512, 176]);
        assert!(envelopes[..3].iter().all(|e| e.category() == Category::Code));
        assert_eq!(envelopes[3].eof_context(), Some(EofContext::Program));
        assert_eq!(envelopes.len(), 4);
    }

    #[test]
    fn empty_source_submits_only_program_eof() {
        let transition = dispatch(connecting(""), SessionEvent::TransportReady);
        assert_eq!(sent(&transition.effects), vec![Envelope::program_eof()]);
    }

    #[test]
    fn connect_failure_closes_with_notice() {
        let transition = dispatch(
            connecting("x"),
            SessionEvent::ConnectFailed {
                reason: "refused".into(),
            },
        );
        assert_eq!(transition.next, SessionState::Closed);
        assert_eq!(written(&transition.effects), DONE_NOTICE);
        assert!(transition.effects.contains(&Effect::Blur));
    }

    #[test]
    fn aborted_submission_closes() {
        let transition = dispatch(
            SessionState::SubmittingCode,
            SessionEvent::SubmissionAborted {
                sent: 2,
                total: 4,
                reason: "send failed".into(),
            },
        );
        assert_eq!(transition.next, SessionState::Closed);
        assert!(sent(&transition.effects).is_empty());
        assert!(transition.effects.contains(&Effect::CloseTransport));
    }

    #[test]
    fn keystroke_echoes_and_sends_once() {
        let transition = dispatch(SessionState::Interactive, SessionEvent::Keystroke("k".into()));
        assert_eq!(transition.next, SessionState::Interactive);
        assert_eq!(
            transition.effects,
            vec![
                Effect::Write("k".into()),
                Effect::Send(Envelope::stdin("k")),
            ]
        );
    }

    #[test]
    fn enter_is_rewritten_to_crlf() {
        let transition = dispatch(SessionState::Interactive, SessionEvent::Keystroke("\r".into()));
        assert_eq!(written(&transition.effects), "\r\n");
        assert_eq!(sent(&transition.effects), vec![Envelope::stdin("\r\n")]);
    }

    #[test]
    fn end_of_input_sends_single_stdin_eof() {
        let transition = dispatch(SessionState::Interactive, SessionEvent::EndOfInput);
        assert_eq!(transition.next, SessionState::Closing);
        assert_eq!(sent(&transition.effects), vec![Envelope::stdin_eof()]);
        assert!(written(&transition.effects).is_empty());
    }

    #[test]
    fn closing_suppresses_input_but_renders_output() {
        let key = dispatch(SessionState::Closing, SessionEvent::Keystroke("a".into()));
        assert_eq!(key.next, SessionState::Closing);
        assert!(key.effects.is_empty());

        let output = dispatch(
            SessionState::Closing,
            SessionEvent::Inbound(Envelope::new(Category::Stdout, "bye\n")),
        );
        assert_eq!(written(&output.effects), "bye\r\n");
    }

    #[test]
    fn paste_forwards_each_character_in_order() {
        let transition = dispatch(SessionState::Interactive, SessionEvent::Paste("ab\r".into()));
        assert_eq!(
            sent(&transition.effects),
            vec![
                Envelope::stdin("a"),
                Envelope::stdin("b"),
                Envelope::stdin("\r\n"),
            ]
        );
        assert_eq!(written(&transition.effects), "ab\r\n");
    }

    #[test]
    fn output_newlines_become_crlf() {
        let transition = dispatch(
            SessionState::Interactive,
            SessionEvent::Inbound(Envelope::new(Category::Stdout, "a\nb")),
        );
        assert_eq!(transition.effects, vec![Effect::Write("a\r\nb".into())]);
    }

    #[test]
    fn output_during_submission_is_rendered() {
        let transition = dispatch(
            SessionState::SubmittingCode,
            SessionEvent::Inbound(Envelope::new(Category::Stderr, "early")),
        );
        assert_eq!(transition.next, SessionState::SubmittingCode);
        assert_eq!(written(&transition.effects), "early");
    }

    #[test]
    fn input_before_interactive_is_dropped() {
        for state in [connecting("x"), SessionState::SubmittingCode] {
            let transition = dispatch(state.clone(), SessionEvent::Keystroke("a".into()));
            assert_eq!(transition.next, state);
            assert!(transition.effects.is_empty());
        }
    }

    #[test]
    fn transport_close_ends_any_active_state() {
        for state in [
            connecting("x"),
            SessionState::SubmittingCode,
            SessionState::Interactive,
            SessionState::Closing,
        ] {
            let transition = dispatch(
                state,
                SessionEvent::TransportClosed {
                    reason: "code 1000".into(),
                },
            );
            assert_eq!(transition.next, SessionState::Closed);
            assert_eq!(written(&transition.effects), DONE_NOTICE);
        }
    }

    #[test]
    fn closed_is_terminal_and_quiet() {
        for event in [
            SessionEvent::TransportClosed { reason: "again".into() },
            SessionEvent::Keystroke("a".into()),
            SessionEvent::TransportReady,
        ] {
            let transition = dispatch(SessionState::Closed, event);
            assert_eq!(transition.next, SessionState::Closed);
            assert!(transition.effects.is_empty());
        }
    }

    #[test]
    fn close_request_waits_for_transport() {
        let transition = dispatch(SessionState::Interactive, SessionEvent::CloseRequested);
        assert_eq!(transition.next, SessionState::Closing);
        assert_eq!(transition.effects, vec![Effect::CloseTransport]);
    }

    #[test]
    fn malformed_inbound_keeps_state() {
        let transition = dispatch(
            SessionState::Interactive,
            SessionEvent::InboundMalformed { reason: "bad".into() },
        );
        assert_eq!(transition.next, SessionState::Interactive);
        assert!(transition.effects.is_empty());
    }
}
