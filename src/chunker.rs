//! Splits documents into overlapping chunks bounded by a character budget.

use std::collections::BTreeMap;

use tracing::debug;

use crate::executor::{OffloadError, WorkerPool};
use crate::parser::{Document, FILE_NAME_KEY};

/// A bounded slice of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Copied from the parent document; always carries `file_name`.
    pub metadata: BTreeMap<String, String>,
    /// Index of this chunk within its document.
    pub position: usize,
}

impl Chunk {
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.metadata
            .get(FILE_NAME_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Break points tried, best first, when a window has to be cut.
const SEPARATORS: &[&[char]] = &[&['\n', '\n'], &['\n'], &['.', ' '], &[' ']];

/// Fixed-size overlapping splitter. Sizes are counted in `char`s.
#[derive(Clone, Debug)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    pool: WorkerPool,
}

impl Chunker {
    /// `overlap` is clamped below `chunk_size` so every window makes progress.
    pub fn new(chunk_size: usize, overlap: usize, pool: WorkerPool) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            pool,
        }
    }

    /// Split documents into chunks on the CPU worker pool.
    pub async fn split(&self, documents: Vec<Document>) -> Result<Vec<Chunk>, OffloadError> {
        let this = self.clone();
        self.pool.run(move || this.split_documents(&documents)).await
    }

    /// Blocking variant of [`Chunker::split`].
    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            let pieces = self.split_text(&doc.text);
            debug!("Split {} into {} chunks", doc.file_name(), pieces.len());
            chunks.extend(pieces.into_iter().enumerate().map(|(position, text)| Chunk {
                text,
                metadata: doc.metadata.clone(),
                position,
            }));
        }
        chunks
    }

    /// Split one text.
    ///
    /// Text no longer than `chunk_size` comes back unchanged as a single
    /// chunk. Otherwise each chunk ends at the best break point in the back
    /// half of its window, and the next chunk starts exactly `overlap` chars
    /// before that end.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = start + self.chunk_size;
            if hard_end >= chars.len() {
                chunks.push(chars[start..].iter().collect());
                break;
            }

            let min_end = start + (self.chunk_size / 2).max(self.overlap + 1);
            let end = find_break(&chars, min_end, hard_end);
            chunks.push(chars[start..end].iter().collect());
            start = end - self.overlap;
        }
        chunks
    }
}

/// Latest cut point in `min_end..=hard_end` that falls right after a
/// separator, trying separators in order. Falls back to `hard_end`.
fn find_break(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    for sep in SEPARATORS {
        for end in (min_end..=hard_end).rev() {
            if end >= sep.len() && chars[end - sep.len()..end] == **sep {
                return end;
            }
        }
    }
    hard_end
}
