//! Keyboard side of the terminal binding.
//!
//! Raw key events are first offered to [`intercept`]; the combinations it
//! claims (Ctrl-D, Ctrl-Shift-V and the local detach key) never reach default
//! key handling and become protocol actions instead. Everything else is
//! forwarded as keystroke text.

use copypasta::{ClipboardContext, ClipboardProvider};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::warn;

use crate::session::SessionEvent;

/// One key press as the display widget reports it: the text the key
/// produces plus modifier state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyInput {
    pub fn text(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            shift: false,
            alt: false,
        }
    }

    pub fn ctrl(letter: char) -> Self {
        Self {
            key: letter.to_string(),
            ctrl: true,
            shift: false,
            alt: false,
        }
    }

    pub fn ctrl_shift(letter: char) -> Self {
        Self {
            shift: true,
            ..Self::ctrl(letter)
        }
    }

    fn is_ctrl(&self, letter: char) -> bool {
        let mut chars = self.key.chars();
        self.ctrl
            && !self.alt
            && matches!((chars.next(), chars.next()), (Some(c), None) if c.eq_ignore_ascii_case(&letter))
    }

    /// Converts a crossterm key event. Releases and keys without a terminal
    /// encoding yield `None`.
    pub fn from_crossterm(event: KeyEvent) -> Option<Self> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
        let shift = event.modifiers.contains(KeyModifiers::SHIFT);
        let alt = event.modifiers.contains(KeyModifiers::ALT);

        let key = match event.code {
            KeyCode::Char(c) if ctrl => control_key(c).to_string(),
            KeyCode::Char(c) if alt => format!("\x1b{c}"),
            KeyCode::Char(c) => c.to_string(),
            KeyCode::Enter => "\r".into(),
            KeyCode::Tab => "\t".into(),
            KeyCode::BackTab => "\x1b[Z".into(),
            KeyCode::Backspace => "\x7f".into(),
            KeyCode::Esc => "\x1b".into(),
            KeyCode::Up => "\x1b[A".into(),
            KeyCode::Down => "\x1b[B".into(),
            KeyCode::Right => "\x1b[C".into(),
            KeyCode::Left => "\x1b[D".into(),
            KeyCode::Home => "\x1b[H".into(),
            KeyCode::End => "\x1b[F".into(),
            KeyCode::PageUp => "\x1b[5~".into(),
            KeyCode::PageDown => "\x1b[6~".into(),
            KeyCode::Delete => "\x1b[3~".into(),
            KeyCode::Insert => "\x1b[2~".into(),
            _ => return None,
        };
        Some(Self {
            key,
            ctrl,
            shift,
            alt,
        })
    }

    /// The bytes this key types when nothing intercepts it. Ctrl with a
    /// letter or one of `@[\]^_` maps to the matching C0 control character.
    pub fn typed_text(&self) -> Option<String> {
        if !self.ctrl {
            return Some(self.key.clone());
        }
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                let upper = c.to_ascii_uppercase();
                ('@'..='_')
                    .contains(&upper)
                    .then(|| char::from(upper as u8 & 0x1f).to_string())
            }
            _ => None,
        }
    }
}

/// In raw mode the terminal sends Ctrl-\\, Ctrl-], Ctrl-^ and Ctrl-_ as bytes
/// 0x1C-0x1F and Ctrl-Space as NUL; crossterm reports those as Ctrl with
/// `'4'..='7'` and `' '`. Map them back to the key the user pressed.
fn control_key(c: char) -> char {
    match c {
        ' ' | '2' => '@',
        '4' => '\\',
        '5' => ']',
        '6' => '^',
        '7' => '_',
        other => other,
    }
}

/// Raw input from the display: key presses and bracketed pastes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyInput),
    Paste(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    /// Default handling: the key is typed.
    PassThrough,
    /// Ctrl-D: end of interactive input.
    EndOfInput,
    /// Ctrl-Shift-V: paste the clipboard.
    Paste,
    /// Ctrl-]: leave the session.
    Detach,
}

pub fn intercept(key: &KeyInput) -> Interception {
    if key.is_ctrl('v') && key.shift {
        Interception::Paste
    } else if key.is_ctrl('d') && !key.shift {
        Interception::EndOfInput
    } else if key.is_ctrl(']') {
        Interception::Detach
    } else {
        Interception::PassThrough
    }
}

pub trait Clipboard {
    fn read(&mut self) -> Result<String, String>;
}

/// The desktop clipboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn read(&mut self) -> Result<String, String> {
        let mut ctx = ClipboardContext::new().map_err(|err| err.to_string())?;
        ctx.get_contents().map_err(|err| err.to_string())
    }
}

/// Translates display input into session events. Holds no protocol state.
pub struct TerminalAdapter<C: Clipboard> {
    clipboard: C,
}

impl<C: Clipboard> TerminalAdapter<C> {
    pub fn new(clipboard: C) -> Self {
        Self { clipboard }
    }

    pub fn translate(&mut self, input: InputEvent) -> Option<SessionEvent> {
        match input {
            InputEvent::Paste(text) => Some(SessionEvent::Paste(text)),
            InputEvent::Key(key) => match intercept(&key) {
                Interception::EndOfInput => Some(SessionEvent::EndOfInput),
                Interception::Detach => Some(SessionEvent::CloseRequested),
                Interception::Paste => match self.clipboard.read() {
                    Ok(text) => Some(SessionEvent::Paste(text)),
                    Err(err) => {
                        warn!(target: "workbook::input", error = %err, "clipboard unavailable; paste dropped");
                        None
                    }
                },
                Interception::PassThrough => key.typed_text().map(SessionEvent::Keystroke),
            },
        }
    }
}
