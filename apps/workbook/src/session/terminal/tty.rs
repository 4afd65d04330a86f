use std::io;

use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Puts the controlling terminal into raw mode with bracketed paste for the
/// lifetime of the guard. Raw mode lets the session see Ctrl-D and friends
/// as key events instead of having the line discipline act on them.
pub struct RawModeGuard {
    raw: bool,
    paste: bool,
}

impl RawModeGuard {
    pub fn new(enable: bool) -> Self {
        if !enable {
            return Self {
                raw: false,
                paste: false,
            };
        }
        let raw = match enable_raw_mode() {
            Ok(()) => true,
            Err(err) => {
                eprintln!("⚠️  failed to enable raw mode: {err}");
                false
            }
        };
        let paste = raw && execute!(io::stdout(), EnableBracketedPaste).is_ok();
        Self { raw, paste }
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.paste {
            let _ = execute!(io::stdout(), DisableBracketedPaste);
        }
        if self.raw {
            let _ = disable_raw_mode();
        }
    }
}
