//! # authmux
//!
//! A pluggable authentication façade: authenticate users against many
//! third-party identity providers through one [`Provider`] contract, and
//! resolve providers by name at request time through a concurrent
//! [`ProviderRegistry`].
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use authmux::providers::FauxProvider;
//! use authmux::{CallbackParams, Provider, ProviderRegistry};
//!
//! # async fn example() -> authmux::Result<()> {
//! let registry = ProviderRegistry::new();
//! registry.register([Arc::new(FauxProvider::new()) as Arc<dyn Provider>]);
//!
//! // Begin: resolve the provider and send the user to its auth URL.
//! let provider = registry.get("faux")?;
//! let session = provider.begin_auth("anti-forgery-state").await?;
//! let redirect = session.auth_url()?;
//! let stored = session.marshal();
//!
//! // Callback: rebuild the session and finish the flow.
//! let mut session = provider.unmarshal_session(&stored)?;
//! provider
//!     .authorize(session.as_mut(), &CallbackParams::from_query("code=xyz"))
//!     .await?;
//! let user = provider.fetch_user(session.as_ref()).await?;
//! println!("{} logged in via {}", user.user_id, redirect);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`provider`] - the provider and session contract
//! - [`registry`] - name to provider resolution
//! - [`providers`] - built-in providers
//! - [`transport`] - HTTP client selection for providers
//! - [`config`] - building providers from TOML and the environment

pub mod config;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod transport;
pub mod types;

pub use config::{AuthConfig, ProviderKind, ProviderSettings};
pub use error::{Error, Result, NO_AUTH_URL_ERROR_MESSAGE};
pub use provider::{session_as, session_as_mut, CallbackParams, Provider, Session};
pub use registry::{
    clear_providers, get_provider, get_providers, remove_provider, use_providers,
    ProviderRegistry, Providers,
};
pub use transport::{context_for_client, http_client_with_fallback, ExchangeContext};
pub use types::{Token, User};
