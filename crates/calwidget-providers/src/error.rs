//! Error types for the OAuth helper.
//!
//! Every fatal condition the helper can hit maps onto one of a small set of
//! categories; the CLI turns any of them into a diagnostic on stderr and a
//! non-zero exit, so the categories exist for messages and tests rather than
//! for differentiated exit codes.

use std::fmt;
use thiserror::Error;

/// The category of a helper error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperErrorCode {
    /// Missing or malformed credentials/config, unknown provider.
    ConfigurationError,
    /// No free local port for the OAuth callback listener.
    PortExhaustion,
    /// The user (or the provider) denied or blocked the consent screen.
    AuthorizationDenied,
    /// Token acquisition, exchange or callback capture failed.
    AuthenticationFailed,
    /// Transport error or non-2xx from a provider endpoint.
    NetworkError,
    /// The provider returned something we could not parse.
    InvalidResponse,
    /// Unexpected internal state.
    InternalError,
}

impl HelperErrorCode {
    /// Returns a stable lowercase name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::PortExhaustion => "port_exhaustion",
            Self::AuthorizationDenied => "authorization_denied",
            Self::AuthenticationFailed => "authentication_failed",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for HelperErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by the token flows, discovery or event fetching.
#[derive(Debug, Error)]
pub struct HelperError {
    code: HelperErrorCode,
    message: String,
    /// The provider this error came from (e.g. "google", "nextcloud").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HelperError {
    /// Creates a new error with the given code and message.
    pub fn new(code: HelperErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(HelperErrorCode::ConfigurationError, message)
    }

    /// Creates a port exhaustion error.
    pub fn port_exhaustion(message: impl Into<String>) -> Self {
        Self::new(HelperErrorCode::PortExhaustion, message)
    }

    /// Creates an authorization-denied error.
    pub fn authorization_denied(message: impl Into<String>) -> Self {
        Self::new(HelperErrorCode::AuthorizationDenied, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(HelperErrorCode::AuthenticationFailed, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(HelperErrorCode::NetworkError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(HelperErrorCode::InvalidResponse, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(HelperErrorCode::InternalError, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> HelperErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

impl fmt::Display for HelperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for helper operations.
pub type HelperResult<T> = Result<T, HelperError>;
