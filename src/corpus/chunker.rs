//! Sliding-window document chunking.
//!
//! Splits document text into overlapping windows sized for embedding.
//! Cuts prefer a paragraph or sentence boundary found within a small
//! lookback region behind the hard cut point, falling back to a hard
//! character cut. All arithmetic is in chars, not bytes, so multi-byte
//! text can never be split inside a code point.

use crate::config::ChunkingConfig;

/// A text window before chunk ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    /// Char offsets within the source text (start, end).
    pub char_range: (usize, usize),

    /// The window's text.
    pub text: String,
}

impl RawChunk {
    /// Window length in characters.
    pub fn char_count(&self) -> usize {
        self.char_range.1 - self.char_range.0
    }
}

/// Pure sliding-window chunker.
///
/// Windows hold at most `max_chars` characters and advance by
/// `max_chars - overlap_chars` per step, so consecutive windows from the
/// same document share `overlap_chars` characters. A document shorter
/// than `max_chars` yields exactly one chunk.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker with the given window parameters.
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split `text` into ordered, overlapping windows.
    pub fn chunk(&self, text: &str) -> Vec<RawChunk> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let max = self.config.max_chars;
        if chars.len() <= max {
            return vec![RawChunk {
                char_range: (0, chars.len()),
                text: text.to_string(),
            }];
        }

        let overlap = self.config.overlap_chars;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let hard_end = (start + max).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                self.preferred_cut(&chars, start, hard_end)
            };

            chunks.push(RawChunk {
                char_range: (start, end),
                text: chars[start..end].iter().collect(),
            });

            if end == chars.len() {
                break;
            }
            start = end.saturating_sub(overlap).max(start + 1);
        }

        chunks
    }

    /// Look back from the hard cut for a boundary to cut at instead.
    ///
    /// Paragraph breaks win over sentence ends and line breaks. Returns
    /// `hard_end` when the lookback region holds no boundary.
    fn preferred_cut(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let lookback = self.config.boundary_lookback.min(hard_end - start - 1);
        if lookback == 0 {
            return hard_end;
        }
        let floor = hard_end - lookback;

        let mut i = hard_end;
        while i > floor {
            if chars[i - 1] == '\n' && i >= 2 && chars[i - 2] == '\n' {
                return i;
            }
            i -= 1;
        }

        let mut i = hard_end;
        while i > floor {
            let c = chars[i - 1];
            if c == '\n' || (c == ' ' && i >= 2 && chars[i - 2] == '.') {
                return i;
            }
            i -= 1;
        }

        hard_end
    }
}
