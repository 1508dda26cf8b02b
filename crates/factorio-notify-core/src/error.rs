//! Error types for `factorio-notify` core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `factorio-notify` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event recognition pattern failed to compile
    #[error("Invalid event pattern: {0}")]
    Pattern(#[from] regex::Error),
}
