//! Boundary-aware text chunker.
//!
//! Splits extracted document text into [`ChunkDescriptor`]s whose length
//! never exceeds `max_chars` characters. Chunks are exact slices of the
//! source text (minus surrounding whitespace), so their character offsets
//! map straight back onto the extracted text and its page table.
//!
//! # Algorithm
//!
//! Starting at the first non-whitespace character, look at the window of
//! the next `max_chars` characters. If the rest of the text fits, it is the
//! final chunk. Otherwise cut inside `[min_chars, max_chars]` at, in order
//! of preference:
//!
//! 1. the last paragraph break (`\n\n`),
//! 2. the last sentence end (`.`, `!` or `?` followed by whitespace),
//! 3. the last whitespace character,
//! 4. exactly `max_chars` characters (hard cut).
//!
//! The chunker is a plain iterator over borrowed input: producing the
//! sequence twice yields identical chunks.
//!
//! # Example
//!
//! ```rust
//! use grant_index_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Aims.\n\nMethods.", &[]).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use crate::error::{IndexError, IndexResult};
use crate::models::{ChunkDescriptor, PageOffset};

/// Hard upper bound on a chunk's length, in characters.
pub const DEFAULT_MAX_CHARS: usize = 1500;

/// Length below which the chunker will not cut at a natural boundary.
pub const DEFAULT_MIN_CHARS: usize = 500;

/// Chunk size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: usize,
    min_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

impl Chunker {
    /// Requires `0 < min_chars <= max_chars`.
    pub fn new(max_chars: usize, min_chars: usize) -> IndexResult<Self> {
        if max_chars == 0 {
            return Err(IndexError::Validation("max_chars must be > 0".to_string()));
        }
        if min_chars == 0 || min_chars > max_chars {
            return Err(IndexError::Validation(format!(
                "min_chars must be in 1..={}, got {}",
                max_chars, min_chars
            )));
        }
        Ok(Self {
            max_chars,
            min_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Lazily chunk `text`.
    ///
    /// `pages` is the extractor's page table (character offsets). When it
    /// is empty, chunks carry no offsets or page numbers.
    ///
    /// # Errors
    ///
    /// Empty or whitespace-only text is a validation error: there is
    /// nothing to index.
    pub fn chunks<'a>(&self, text: &'a str, pages: &'a [PageOffset]) -> IndexResult<Chunks<'a>> {
        if text.trim().is_empty() {
            return Err(IndexError::Validation(
                "document text is empty or whitespace-only".to_string(),
            ));
        }
        Ok(Chunks {
            text,
            pages,
            max_chars: self.max_chars,
            min_chars: self.min_chars,
            pos: 0,
            char_pos: 0,
            next_index: 0,
        })
    }
}

/// Chunk `text` with the default bounds and collect the result.
pub fn chunk_text(text: &str, pages: &[PageOffset]) -> IndexResult<Vec<ChunkDescriptor>> {
    Ok(Chunker::default().chunks(text, pages)?.collect())
}

/// Iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    pages: &'a [PageOffset],
    max_chars: usize,
    min_chars: usize,
    /// Byte position of the cursor.
    pos: usize,
    /// Character position of the cursor.
    char_pos: usize,
    next_index: usize,
}

impl<'a> Chunks<'a> {
    fn advance(&mut self, bytes: usize) {
        let end = self.pos + bytes;
        self.char_pos += self.text[self.pos..end].chars().count();
        self.pos = end;
    }

    /// Byte length of the next chunk's raw slice of `rest`.
    fn find_cut(&self, rest: &str) -> usize {
        let hard = match rest.char_indices().nth(self.max_chars) {
            Some((i, _)) => i,
            None => return rest.len(),
        };
        let soft = rest
            .char_indices()
            .nth(self.min_chars)
            .map(|(i, _)| i)
            .unwrap_or(hard)
            .min(hard);
        let tail = &rest[soft..hard];

        if let Some(i) = tail.rfind("\n\n") {
            return soft + i;
        }
        if let Some(i) = last_sentence_end(tail) {
            return soft + i;
        }
        if let Some(i) = tail.rfind(char::is_whitespace) {
            return soft + i;
        }
        hard
    }

    fn page_for(&self, char_offset: usize) -> Option<u32> {
        self.pages
            .iter()
            .find(|p| p.start_index <= char_offset && char_offset < p.end_index)
            .map(|p| p.page_number)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<ChunkDescriptor> {
        let rest = &self.text[self.pos..];
        let leading = rest.len() - rest.trim_start().len();
        self.advance(leading);
        if self.pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.pos..];
        let cut = self.find_cut(rest);
        let body = rest[..cut].trim_end();
        let start = self.char_pos;
        let end = start + body.chars().count();

        let (start_offset, end_offset, page_number) = if self.pages.is_empty() {
            (None, None, None)
        } else {
            (Some(start), Some(end), self.page_for(start))
        };

        let chunk = ChunkDescriptor {
            chunk_index: self.next_index,
            text: body.to_string(),
            start_offset,
            end_offset,
            page_number,
        };
        self.next_index += 1;
        self.advance(cut);
        Some(chunk)
    }
}

/// Byte index just past the last sentence terminator followed by whitespace.
fn last_sentence_end(s: &str) -> Option<usize> {
    let mut found = None;
    let mut iter = s.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = iter.peek() {
                if next.is_whitespace() {
                    found = Some(i + c.len_utf8());
                }
            }
        }
    }
    found
}
