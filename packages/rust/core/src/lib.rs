//! Article generation for Chatscribe.
//!
//! Ties transcript extraction, text chunking and the model capabilities into
//! one streamed run ([`Pipeline`]). Sections are written in order, each
//! prompted with a running summary of the article so far.

pub mod article;
pub mod cluster;
pub mod context;
pub mod overlap;
pub mod pipeline;
pub mod prompts;
pub mod sections;

pub use pipeline::{Pipeline, PipelineOptions};
