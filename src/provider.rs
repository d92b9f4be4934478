//! Identity provider contract.
//!
//! Every third-party integration implements [`Provider`]. Calling code
//! resolves a provider by name and drives it through the same four steps
//! regardless of which service sits behind it:
//!
//! ```text
//! unauthenticated ──begin_auth──▶ pending (Session)
//!        ┌──────────── marshal / redirect round trip ───────────┐
//!        ▼                                                       │
//! unmarshal_session ──▶ pending (rebuilt) ──authorize──▶ token held
//!                                                  │
//!                                             fetch_user
//!                                                  ▼
//!                                     authenticated (User) | failed
//! ```
//!
//! A [`Session`] is opaque to everything but the provider that created it.
//! Only that provider looks inside it, through [`session_as`] and
//! [`session_as_mut`].
//!
//! # Example
//!
//! ```rust
//! use authmux::providers::FauxProvider;
//! use authmux::{CallbackParams, Provider};
//!
//! # async fn example() -> authmux::Result<()> {
//! let provider = FauxProvider::new();
//!
//! let session = provider.begin_auth("state-token").await?;
//! let redirect_to = session.auth_url()?;
//! let stored = session.marshal();
//!
//! // ... user comes back from `redirect_to` ...
//! let mut session = provider.unmarshal_session(&stored)?;
//! provider
//!     .authorize(session.as_mut(), &CallbackParams::from_query("code=abc&state=state-token"))
//!     .await?;
//! let user = provider.fetch_user(session.as_ref()).await?;
//! assert_eq!(user.provider, "faux");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{Error, Result};
use crate::types::{Token, User};

/// Provider-defined state spanning one authentication attempt.
///
/// Produced by [`Provider::begin_auth`], carried across the redirect in its
/// [`marshal`](Session::marshal)ed form and rebuilt by
/// [`Provider::unmarshal_session`].
pub trait Session: Send + Sync + Debug {
    /// URL the user must be sent to in order to authenticate.
    fn auth_url(&self) -> Result<String>;

    /// Serialize the session. The owning provider's `unmarshal_session`
    /// must rebuild an equivalent session from this string.
    fn marshal(&self) -> String;

    /// Access to the concrete type, for the owning provider only.
    fn as_any(&self) -> &dyn Any;

    /// Mutable access to the concrete type, for the owning provider only.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Query parameters the identity provider redirected back with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    values: HashMap<String, String>,
}

impl CallbackParams {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (with or without the leading `?`).
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            values: url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// Add a parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl From<HashMap<String, String>> for CallbackParams {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

/// Contract every identity provider implements.
///
/// Implementations own their configuration (client credentials, scopes,
/// endpoints) and perform all network I/O themselves. The registry stores
/// them as `Arc<dyn Provider>`, so every method that may run concurrently
/// takes `&self`.
///
/// # Renaming
///
/// [`set_name`](Provider::set_name) takes `&mut self`. Once a provider is
/// registered it is shared behind an `Arc` and can no longer be renamed;
/// build a new instance and register that instead.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Name the provider is registered under.
    fn name(&self) -> &str;

    /// Change the name. Only possible while the provider is exclusively owned.
    fn set_name(&mut self, name: &str);

    /// Start an authentication attempt tagged with an anti-forgery `state`.
    ///
    /// Fails with [`Error::NoAuthUrl`] when the provider has no
    /// authorization URL configured.
    async fn begin_auth(&self, state: &str) -> Result<Box<dyn Session>>;

    /// Rebuild a session from the output of [`Session::marshal`].
    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn Session>>;

    /// Complete the mid-flow exchange using the callback parameters and
    /// store the result in `session`. Returns the access token.
    async fn authorize(&self, session: &mut dyn Session, params: &CallbackParams)
        -> Result<String>;

    /// Fetch the authenticated user's profile.
    ///
    /// The session must already hold an access token, either from
    /// [`authorize`](Provider::authorize) or from a previous round trip.
    async fn fetch_user(&self, session: &dyn Session) -> Result<User>;

    /// Exchange a refresh token for a new access token.
    ///
    /// # Default Implementation
    ///
    /// Returns [`Error::RefreshUnsupported`]. Providers that support refresh
    /// override this together with
    /// [`refresh_token_available`](Provider::refresh_token_available).
    async fn refresh_token(&self, _refresh_token: &str) -> Result<Token> {
        Err(Error::RefreshUnsupported {
            provider: self.name().to_string(),
        })
    }

    /// Whether the upstream protocol supports refresh tokens at all.
    fn refresh_token_available(&self) -> bool {
        false
    }

    /// Toggle verbose diagnostic output.
    fn set_debug(&self, enabled: bool);
}

/// Downcast a session to the concrete type of the provider named `provider`.
pub fn session_as<'a, S: Session + 'static>(
    session: &'a dyn Session,
    provider: &str,
) -> Result<&'a S> {
    session
        .as_any()
        .downcast_ref::<S>()
        .ok_or_else(|| foreign_session(provider))
}

/// Mutable variant of [`session_as`].
pub fn session_as_mut<'a, S: Session + 'static>(
    session: &'a mut dyn Session,
    provider: &str,
) -> Result<&'a mut S> {
    session
        .as_any_mut()
        .downcast_mut::<S>()
        .ok_or_else(|| foreign_session(provider))
}

fn foreign_session(provider: &str) -> Error {
    Error::InvalidSession(format!("session was not created by provider '{provider}'"))
}
