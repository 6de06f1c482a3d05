//! CLI error types.

use std::fmt;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced by the CLI layer.
#[derive(Debug)]
pub enum CliError {
    /// Configuration error (bad arguments, unusable credentials files).
    Config(String),
    /// Error from the provider library.
    Provider(String),
    /// Unexpected internal failure.
    Internal(String),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Provider(msg) => write!(f, "{}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<calwidget_providers::HelperError> for CliError {
    fn from(err: calwidget_providers::HelperError) -> Self {
        Self::Provider(err.to_string())
    }
}
