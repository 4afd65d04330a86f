//! Envelope codec shared by the client and the execution backend.
//!
//! Every websocket message carries exactly one envelope, encoded as a JSON
//! object with two string fields:
//!
//! ```json
//! {"category": "code", "body": "print('hi')"}
//! ```
//!
//! The category decides how the body is read; see [`Category`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A fragment of program source.
    Code,
    /// End of program upload or of interactive input; the body says which.
    Eof,
    /// Interactive keyboard input.
    Stdin,
    /// Process standard output.
    Stdout,
    /// Process standard error.
    Stderr,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Code => "code",
            Category::Eof => "EOF",
            Category::Stdin => "stdin",
            Category::Stdout => "stdout",
            Category::Stderr => "stderr",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "code" => Some(Category::Code),
            "EOF" => Some(Category::Eof),
            "stdin" => Some(Category::Stdin),
            "stdout" => Some(Category::Stdout),
            "stderr" => Some(Category::Stderr),
            _ => None,
        }
    }

    /// Categories the backend uses for process output.
    pub fn is_output(self) -> bool {
        matches!(self, Category::Stdout | Category::Stderr)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stream an `EOF` envelope terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofContext {
    Program,
    Stdin,
}

impl EofContext {
    pub fn as_str(self) -> &'static str {
        match self {
            EofContext::Program => "program",
            EofContext::Stdin => "stdin",
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("malformed envelope: unrecognized category '{0}'")]
    UnknownCategory(String),
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    category: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct InboundEnvelope {
    category: String,
    body: String,
}

/// One protocol message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    category: Category,
    body: String,
}

impl Envelope {
    pub fn new(category: Category, body: impl Into<String>) -> Self {
        Self {
            category,
            body: body.into(),
        }
    }

    pub fn code(fragment: impl Into<String>) -> Self {
        Self::new(Category::Code, fragment)
    }

    pub fn stdin(text: impl Into<String>) -> Self {
        Self::new(Category::Stdin, text)
    }

    pub fn eof(context: EofContext) -> Self {
        Self::new(Category::Eof, context.as_str())
    }

    pub fn program_eof() -> Self {
        Self::eof(EofContext::Program)
    }

    pub fn stdin_eof() -> Self {
        Self::eof(EofContext::Stdin)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The terminated stream for `EOF` envelopes; `None` for everything else
    /// and for `EOF` bodies this client does not know.
    pub fn eof_context(&self) -> Option<EofContext> {
        if self.category != Category::Eof {
            return None;
        }
        match self.body.as_str() {
            "program" => Some(EofContext::Program),
            "stdin" => Some(EofContext::Stdin),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(&WireEnvelope {
            category: self.category.as_str(),
            body: &self.body,
        })
        .map_err(EnvelopeError::Encode)
    }

    /// Parses one wire payload. Extra fields are ignored; a missing field or
    /// an unknown category is an error.
    pub fn decode(payload: &str) -> Result<Self, EnvelopeError> {
        let raw: InboundEnvelope =
            serde_json::from_str(payload).map_err(EnvelopeError::Malformed)?;
        let category = Category::parse(&raw.category)
            .ok_or_else(|| EnvelopeError::UnknownCategory(raw.category.clone()))?;
        Ok(Self {
            category,
            body: raw.body,
        })
    }
}
