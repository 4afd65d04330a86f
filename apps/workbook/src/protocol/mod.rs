pub mod chunk;
pub mod envelope;

pub use chunk::{ChunkError, ChunkLimit, DEFAULT_CHUNK_LIMIT, split};
pub use envelope::{Category, Envelope, EnvelopeError, EofContext};
