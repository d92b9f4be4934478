//! Outbound HTTP transport selection for providers.
//!
//! Providers never construct HTTP clients ad hoc. They either receive one
//! from the host (through an [`ExchangeContext`]) or fall back to a single
//! shared default client.

use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{Error, Result};

/// Shared fallback client, built on first use.
static DEFAULT_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// The process-wide default HTTP client.
pub fn default_http_client() -> &'static reqwest::Client {
    DEFAULT_CLIENT.get_or_init(reqwest::Client::new)
}

/// Return `client` if supplied, otherwise the shared default client.
///
/// `reqwest::Client` is reference counted, so the returned value shares its
/// connection pool with the original.
pub fn http_client_with_fallback(client: Option<&reqwest::Client>) -> reqwest::Client {
    client.map_or_else(|| default_http_client().clone(), Clone::clone)
}

/// Build an HTTP client with a request timeout.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Execution context for token exchanges.
///
/// Carries an optional transport override supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct ExchangeContext {
    http_client: Option<reqwest::Client>,
}

impl ExchangeContext {
    /// The transport override, if one was supplied.
    pub fn http_client_override(&self) -> Option<&reqwest::Client> {
        self.http_client.as_ref()
    }

    /// Whether a transport override is present.
    pub fn has_override(&self) -> bool {
        self.http_client.is_some()
    }

    /// The client to use: the override, or the shared default.
    pub fn http_client(&self) -> reqwest::Client {
        http_client_with_fallback(self.http_client.as_ref())
    }
}

/// Build an [`ExchangeContext`] around an optional host-supplied client.
///
/// With `None`, the context carries no override.
pub fn context_for_client(client: Option<reqwest::Client>) -> ExchangeContext {
    ExchangeContext {
        http_client: client,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_without_client_has_no_override() {
        let ctx = context_for_client(None);
        assert!(!ctx.has_override());
        assert!(ctx.http_client_override().is_none());

        let default_ctx = ExchangeContext::default();
        assert!(!default_ctx.has_override());
    }

    #[test]
    fn test_context_with_client_keeps_override() {
        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let ctx = context_for_client(Some(client));
        assert!(ctx.has_override());
        assert!(ctx.http_client_override().is_some());
    }

    #[test]
    fn test_default_client_is_shared() {
        let first: *const reqwest::Client = default_http_client();
        let second: *const reqwest::Client = default_http_client();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fallback_resolves_both_ways() {
        let mut server = mockito::Server::new_async().await;
        let supplied_mock = server
            .mock("GET", "/ping")
            .match_header("user-agent", "host-client")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;
        let default_mock = server
            .mock("GET", "/ping")
            .match_header("user-agent", mockito::Matcher::Missing)
            .with_status(200)
            .expect(2)
            .create_async()
            .await;
        let url = format!("{}/ping", server.url());

        let client = reqwest::Client::builder()
            .user_agent("host-client")
            .build()
            .unwrap();
        http_client_with_fallback(Some(&client)).get(&url).send().await.unwrap();
        context_for_client(Some(client)).http_client().get(&url).send().await.unwrap();

        http_client_with_fallback(None).get(&url).send().await.unwrap();
        context_for_client(None).http_client().get(&url).send().await.unwrap();

        supplied_mock.assert_async().await;
        default_mock.assert_async().await;
    }
}
