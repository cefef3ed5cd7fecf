//! Error types for the match engine.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all engine errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Settings failed validation. Fatal for the match being configured.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Field text could not be parsed.
    #[error("Failed to parse field at line {line}: {message}")]
    FieldParse {
        /// 1-based line number of the offending row.
        line: usize,
        /// Error message.
        message: String,
    },

    /// Invalid game state for the requested operation.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// No path exists between two points on the navigation mesh.
    #[error("No path from ({from_x:.1}, {from_y:.1}) to ({to_x:.1}, {to_y:.1})")]
    NoPath {
        /// Start x.
        from_x: f64,
        /// Start y.
        from_y: f64,
        /// Goal x.
        to_x: f64,
        /// Goal y.
        to_y: f64,
    },

    /// Replay data could not be encoded, decoded or is incompatible.
    #[error("Replay error: {0}")]
    Replay(String),

    /// Filesystem error while loading or saving engine data.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl GameError {
    /// Wrap an IO error together with the path that caused it.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// A fault reported by an agent's decision logic.
///
/// Agent faults never abort a match: the engine flags the agent's side,
/// logs the message and substitutes a no-op action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AgentError(pub String);

impl AgentError {
    /// Create an agent error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
