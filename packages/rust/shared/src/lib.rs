//! Shared types, error model, and configuration for Chatscribe.
//!
//! This crate is the foundation depended on by all other Chatscribe crates.
//! It provides:
//! - [`ChatscribeError`]: the unified error type
//! - Domain types ([`Message`], [`Chunk`], [`ProgressEvent`], [`RunningSummary`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChunkingConfig, DefaultsConfig, FetchConfig, GenerationConfig, ProviderConfig,
    ServerConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key, validate_api_key,
};
pub use error::{ChatscribeError, ExtractError, Result};
pub use types::{
    Chunk, Message, ProgressEvent, Role, RunId, RunningSummary, SUCCESS_STATUS, Transcript,
};
