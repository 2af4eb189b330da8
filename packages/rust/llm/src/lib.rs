//! Model capabilities consumed by the article pipeline.
//!
//! The pipeline never talks HTTP itself. It depends on two narrow traits:
//! - [`Embedder`]: text in, fixed-dimension vectors out (batched)
//! - [`Generator`]: prompt in, either a whole completion or an ordered stream
//!   of text increments
//!
//! [`OpenAiClient`] implements both against any OpenAI-compatible API.

mod openai;
mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;

use chatscribe_shared::Result;

pub use openai::OpenAiClient;
pub use sse::SseDecoder;

/// Ordered text increments of one streamed completion.
///
/// Dropping the stream abandons the completion and releases its connection.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every input, returning one vector per input in input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Text generation capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run a prompt to completion and return the whole reply.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Start a completion and return its increments as they arrive.
    async fn stream(&self, prompt: &str) -> Result<TextStream>;
}
