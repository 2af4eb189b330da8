//! Conversation text preparation: normalization, sentence splitting and chunking.

mod chunk;
mod normalize;
mod semantic;
mod sentence;

pub use chunk::{Chunker, size_chunks};
pub use normalize::normalize;
pub use semantic::{breakpoints, cosine_distance, percentile, semantic_chunks};
pub use sentence::{split_sentences, split_words};
