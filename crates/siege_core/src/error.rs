//! Error types for the defence simulation.

use thiserror::Error;

use crate::components::EntityId;
use crate::orders::OrderError;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Data file could not be read.
    #[error("Failed to read data file '{path}': {message}")]
    DataReadError {
        /// Path to the file that failed to read.
        path: String,
        /// Error message.
        message: String,
    },

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or a label for inline data) that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// An order could not be applied.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
