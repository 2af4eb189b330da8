//! Error types for Chatscribe.
//!
//! Library crates use [`ChatscribeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Chatscribe operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatscribeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching the shared conversation page.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The page markup did not contain a usable conversation.
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// The embedding capability failed or returned malformed vectors.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Chunk clustering could not run.
    #[error("clustering error: {message}")]
    Clustering { message: String },

    /// The generation capability failed (API, stream, or response parsing).
    #[error("generation error: {0}")]
    Generation(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Reasons a conversation could not be pulled out of page markup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// No `<script>` element contained a parseable JSON object.
    #[error("no JSON found in script tags")]
    NoJson,

    /// A key on the conversation path was absent or had the wrong type.
    #[error("missing key `{path}`")]
    MissingKey { path: String },

    /// The conversation was present but held no usable message text.
    #[error("no messages found")]
    NoMessages,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ChatscribeError>;

impl ChatscribeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a clustering error from any displayable message.
    pub fn clustering(msg: impl Into<String>) -> Self {
        Self::Clustering {
            message: msg.into(),
        }
    }

    /// Clustering was asked to run over nothing.
    pub fn empty_input() -> Self {
        Self::clustering("empty input: no chunks or embeddings to cluster")
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ChatscribeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ChatscribeError::from(ExtractError::MissingKey {
            path: "props.pageProps".into(),
        });
        assert_eq!(err.to_string(), "extract error: missing key `props.pageProps`");
    }

    #[test]
    fn empty_input_is_a_clustering_error() {
        let err = ChatscribeError::empty_input();
        assert!(matches!(err, ChatscribeError::Clustering { .. }));
        assert!(err.to_string().contains("empty input"));
    }
}
