//! Error types for match orchestration.

use std::path::PathBuf;

use thiserror::Error;

use domination_core::error::GameError;

/// Error type for running matches and batches.
#[derive(Error, Debug)]
pub enum MatchError {
    /// Engine error: bad settings, unparseable field, broken replay.
    #[error(transparent)]
    Game(#[from] GameError),
    /// No built-in agent with this name.
    #[error("Unknown agent '{0}' (expected one of: noop, random, capture)")]
    UnknownAgent(String),
    /// Failed to read or write a file.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A ranking sink rejected a result.
    #[error("Ranking sink error: {0}")]
    Sink(String),
}

impl MatchError {
    /// Wrap an IO error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, MatchError>;
