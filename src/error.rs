//! Error types for the Gatekeeper service.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
///
/// Authentication/authorization denials and rate-limit refusals are not
/// errors; they are verdicts carried in their own types. This enum covers
/// infrastructure and configuration faults only.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Directory service lookup failures.
    #[error("Directory error: {0}")]
    Directory(String),

    /// Token issuing failures.
    #[error("Token error: {0}")]
    Token(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
