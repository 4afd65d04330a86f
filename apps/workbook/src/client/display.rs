use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, Stdout, Write};
use tracing::warn;

/// The terminal surface a session renders into. The session only ever
/// writes text, clears, and gives up keyboard focus.
pub trait Display {
    fn write(&mut self, text: &str);
    fn clear(&mut self);
    /// Detaches the display from keyboard input.
    fn blur(&mut self);
    fn is_blurred(&self) -> bool;
}

/// Renders into a byte sink, normally the process stdout in raw mode.
pub struct TerminalDisplay<W: Write> {
    out: W,
    blurred: bool,
}

impl TerminalDisplay<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            blurred: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn flush_or_warn(&mut self, what: &str) {
        if let Err(err) = self.out.flush() {
            warn!(target: "workbook::display", error = %err, "{what} flush failed");
        }
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn write(&mut self, text: &str) {
        if let Err(err) = self.out.write_all(text.as_bytes()) {
            warn!(target: "workbook::display", error = %err, "display write failed");
            return;
        }
        self.flush_or_warn("write");
    }

    fn clear(&mut self) {
        if let Err(err) = queue!(self.out, Clear(ClearType::All), MoveTo(0, 0)) {
            warn!(target: "workbook::display", error = %err, "display clear failed");
            return;
        }
        self.flush_or_warn("clear");
    }

    fn blur(&mut self) {
        self.blurred = true;
        self.flush_or_warn("blur");
    }

    fn is_blurred(&self) -> bool {
        self.blurred
    }
}

/// In-memory display. `contents` is everything written since the last clear.
#[derive(Debug, Default, Clone)]
pub struct BufferDisplay {
    contents: String,
    clears: usize,
    blurred: bool,
}

impl BufferDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn clears(&self) -> usize {
        self.clears
    }
}

impl Display for BufferDisplay {
    fn write(&mut self, text: &str) {
        self.contents.push_str(text);
    }

    fn clear(&mut self) {
        self.contents.clear();
        self.clears += 1;
    }

    fn blur(&mut self) {
        self.blurred = true;
    }

    fn is_blurred(&self) -> bool {
        self.blurred
    }
}
