use thiserror::Error;

/// Fragment size used for code upload, in characters.
pub const DEFAULT_CHUNK_LIMIT: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk limit must be at least one character")]
    ZeroLimit,
}

/// Upper bound on fragment length, counted in `char`s so a fragment never
/// ends inside a multi-byte character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLimit(usize);

impl ChunkLimit {
    pub fn new(chars: usize) -> Result<Self, ChunkError> {
        if chars == 0 {
            return Err(ChunkError::ZeroLimit);
        }
        Ok(Self(chars))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for ChunkLimit {
    fn default() -> Self {
        Self(DEFAULT_CHUNK_LIMIT)
    }
}

/// Splits `text` into ordered fragments of at most `limit` characters.
///
/// Concatenating the fragments yields `text` again; empty input yields no
/// fragments at all.
pub fn split(text: &str, limit: ChunkLimit) -> Vec<&str> {
    let mut fragments = Vec::with_capacity(text.len() / limit.get() + 1);
    let mut start = 0;
    let mut count = 0;
    for (offset, _) in text.char_indices() {
        if count == limit.get() {
            fragments.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        fragments.push(&text[start..]);
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(n: usize) -> ChunkLimit {
        ChunkLimit::new(n).expect("limit")
    }

    #[test]
    fn empty_text_has_no_fragments() {
        assert!(split("", ChunkLimit::default()).is_empty());
    }

    #[test]
    fn twelve_hundred_chars_split_into_three() {
        let source = "x".repeat(1200);
        let lengths: Vec<usize> = split(&source, ChunkLimit::default())
            .iter()
            .map(|f| f.chars().count())
            .collect();
        assert_eq!(lengths, vec![512, 512, 176]);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_fragment() {
        let source = "ab".repeat(8);
        let fragments = split(&source, limit(4));
        assert_eq!(fragments.len(), 4);
        assert!(fragments.iter().all(|f| f.len() == 4));
    }

    #[test]
    fn fragments_reassemble_and_respect_limit() {
        let samples = [
            "local x = io.read()\nprint(x)\n",
            "héllo wörld · ünïcode ✓ ok",
            "🦀🦀🦀🦀🦀",
            "a",
        ];
        for sample in samples {
            for n in 1..=7 {
                let fragments = split(sample, limit(n));
                assert_eq!(fragments.concat(), sample);
                assert!(fragments.iter().all(|f| f.chars().count() <= n));
                assert!(fragments.iter().all(|f| !f.is_empty()));
            }
        }
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert_eq!(ChunkLimit::new(0), Err(ChunkError::ZeroLimit));
    }
}
