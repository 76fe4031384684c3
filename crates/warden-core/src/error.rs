//! Domain-specific error types following panic-free policy.

use crate::GameId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// A configured regular expression failed to compile
    #[error("Invalid pattern for {game} ({name}): {reason}")]
    InvalidPattern {
        game: GameId,
        name: String,
        reason: String,
    },

    /// A pattern is missing a named capture group it must provide
    #[error("Pattern for {game} ({name}) is missing capture group '{group}'")]
    MissingCaptureGroup {
        game: GameId,
        name: String,
        group: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
