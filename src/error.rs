//! Error types for provider resolution and authentication flows.
//!
//! Every failure in this crate is surfaced as an [`Error`] value. The
//! registry only ever produces [`Error::NoSuchProvider`]; everything else
//! comes from provider implementations and is passed through untouched.

use thiserror::Error;

/// Message carried by [`Error::NoAuthUrl`].
pub const NO_AUTH_URL_ERROR_MESSAGE: &str = "an AuthURL has not been set";

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the registry and by provider implementations.
#[derive(Error, Debug)]
pub enum Error {
    /// No provider is registered under the requested name.
    #[error("no provider for {name} exists")]
    NoSuchProvider {
        /// The name that was looked up.
        name: String,
    },

    /// The provider has no authorization URL to send the user to.
    #[error("{}", NO_AUTH_URL_ERROR_MESSAGE)]
    NoAuthUrl,

    /// The provider is configured in a way that can never succeed.
    #[error("provider '{provider}' is misconfigured: {message}")]
    Configuration {
        /// Provider name.
        provider: String,
        /// What is wrong with it.
        message: String,
    },

    /// `refresh_token` was called on a provider that cannot refresh.
    #[error("provider '{provider}' does not support refresh tokens")]
    RefreshUnsupported {
        /// Provider name.
        provider: String,
    },

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Session data is malformed or belongs to another provider.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// The session has not reached the step the operation needs.
    #[error("incomplete session: {0}")]
    IncompleteSession(String),

    /// The identity provider rejected a request.
    #[error("provider '{provider}' rejected the request: {message}")]
    Upstream {
        /// Provider name.
        provider: String,
        /// HTTP status, when the rejection came with one.
        status: Option<u16>,
        /// Error text returned by the provider.
        message: String,
    },

    /// Outbound HTTP failure.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error raised by a provider implemented outside this crate.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Create a [`Error::NoSuchProvider`] error.
    pub fn no_such_provider(name: impl Into<String>) -> Self {
        Self::NoSuchProvider { name: name.into() }
    }

    /// Create a [`Error::Configuration`] error.
    pub fn configuration(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a [`Error::Upstream`] error.
    pub fn upstream(
        provider: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Upstream {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Whether this error stems from configuration rather than a transient
    /// condition. Retrying such a request cannot succeed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoAuthUrl
                | Self::Configuration { .. }
                | Self::RefreshUnsupported { .. }
                | Self::Config(_)
        )
    }

    /// Whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Upstream {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
