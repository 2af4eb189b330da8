//! Chunking entry point with size-based fallback.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use chatscribe_llm::Embedder;
use chatscribe_shared::{Chunk, ChunkingConfig};

use crate::semantic::semantic_chunks;
use crate::sentence::{split_sentences, split_words};

/// Splits normalized conversation text into generation-sized chunks.
///
/// Semantic breakpoints are used when an embedder is attached and the config
/// enables them; any embedding failure degrades to size-based chunking.
#[derive(Clone)]
pub struct Chunker {
    embedder: Option<Arc<dyn Embedder>>,
    config: ChunkingConfig,
}

impl Chunker {
    /// A size-based chunker. Attach an embedder with [`Chunker::with_embedder`].
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            embedder: None,
            config,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Chunk `text`. Non-empty input always yields at least one chunk.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn chunk(&self, text: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        if let Some(embedder) = self.embedder.as_ref().filter(|_| self.config.semantic) {
            match semantic_chunks(
                text,
                embedder.as_ref(),
                self.config.buffer_size,
                self.config.breakpoint_multiplier,
            )
            .await
            {
                Ok(chunks) if !chunks.is_empty() => {
                    debug!(chunks = chunks.len(), "semantic chunking");
                    return chunks;
                }
                Ok(_) => warn!("semantic chunking produced nothing, using size-based chunks"),
                Err(e) => warn!(error = %e, "semantic chunking failed, using size-based chunks"),
            }
        }

        let chunks = size_chunks(text, self.config.target_chars, self.config.overlap_chars);
        debug!(chunks = chunks.len(), "size-based chunking");
        chunks
    }
}

/// Pack sentences into chunks of about `target_chars`, seeding each chunk
/// after the first with the last `overlap_chars` characters of the previous.
pub fn size_chunks(text: &str, target_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let target = target_chars.max(1);
    let overlap = overlap_chars.min(target.saturating_sub(1));

    let pieces: Vec<String> = split_sentences(text)
        .into_iter()
        .flat_map(|sentence| split_words(sentence, target))
        .collect();

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    // Whether `current` holds anything beyond carried-over overlap.
    let mut fresh = false;

    for piece in pieces {
        let piece_len = piece.chars().count();
        if fresh && current_len + 1 + piece_len > target {
            let seed = tail_chars(&current, overlap);
            chunks.push(Chunk::new(std::mem::replace(&mut current, seed)));
            current_len = current.chars().count();
            fresh = false;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(&piece);
        current_len += piece_len;
        fresh = true;
    }

    if fresh {
        chunks.push(Chunk::new(current));
    }
    chunks
}

/// The last `n` characters of `text`, without leading whitespace.
fn tail_chars(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let total = text.chars().count();
    let tail: String = text.chars().skip(total.saturating_sub(n)).collect();
    tail.trim_start().to_string()
}
