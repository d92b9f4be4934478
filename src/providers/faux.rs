//! Deterministic provider for tests.
//!
//! [`FauxProvider`] walks through the full authentication protocol without
//! touching the network. Host applications register it in their own test
//! suites to exercise begin/callback handling. **Never use in production.**

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::provider::{session_as, session_as_mut, CallbackParams, Provider, Session};
use crate::types::{Token, User};

const DEFAULT_AUTH_URL: &str = "http://example.com/auth/";
const FAUX_ACCESS_TOKEN: &str = "1234567890";

/// Session created by [`FauxProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FauxSession {
    /// Name of the provider that created the session.
    pub provider: String,
    /// Session identifier.
    pub id: String,
    /// Authorization URL, `None` when the provider has none configured.
    pub auth_url: Option<String>,
    /// State passed to `begin_auth`.
    pub state: String,
    /// Access token, set by `authorize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Expiry of the access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session for FauxSession {
    fn auth_url(&self) -> Result<String> {
        self.auth_url.clone().ok_or(Error::NoAuthUrl)
    }

    fn marshal(&self) -> String {
        // Serializing plain strings and timestamps cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Network-free provider returning a fixed user.
#[derive(Debug)]
pub struct FauxProvider {
    name: String,
    auth_url: Option<String>,
    user: User,
    refresh: bool,
    debug: AtomicBool,
}

impl Default for FauxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FauxProvider {
    /// Create a provider named `"faux"` returning Homer Simpson.
    pub fn new() -> Self {
        Self {
            name: "faux".to_string(),
            auth_url: Some(DEFAULT_AUTH_URL.to_string()),
            user: User {
                user_id: "homer".to_string(),
                email: Some("homer@example.com".to_string()),
                name: Some("Homer Simpson".to_string()),
                first_name: Some("Homer".to_string()),
                last_name: Some("Simpson".to_string()),
                nick_name: Some("Homer".to_string()),
                location: Some("Springfield".to_string()),
                ..Default::default()
            },
            refresh: false,
            debug: AtomicBool::new(false),
        }
    }

    /// Set the provider name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the authorization URL.
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = Some(auth_url.into());
        self
    }

    /// Remove the authorization URL, making `begin_auth` fail.
    pub fn without_auth_url(mut self) -> Self {
        self.auth_url = None;
        self
    }

    /// Set the user id returned by `fetch_user`.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user.user_id = user_id.into();
        self
    }

    /// Replace the user template returned by `fetch_user`.
    pub fn with_user(mut self, user: User) -> Self {
        self.user = user;
        self
    }

    /// Advertise refresh token support.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Whether debug output is enabled.
    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Provider for FauxProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    async fn begin_auth(&self, state: &str) -> Result<Box<dyn Session>> {
        let auth_url = self.auth_url.clone().ok_or(Error::NoAuthUrl)?;
        if self.is_debug() {
            tracing::debug!(provider = %self.name, state = %state, "Beginning faux authentication");
        }
        Ok(Box::new(FauxSession {
            provider: self.name.clone(),
            id: "id".to_string(),
            auth_url: Some(auth_url),
            state: state.to_string(),
            access_token: None,
            expires_at: None,
        }))
    }

    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn Session>> {
        let session: FauxSession = serde_json::from_str(data)
            .map_err(|e| Error::InvalidSession(format!("malformed faux session: {}", e)))?;
        if session.provider != self.name {
            return Err(Error::InvalidSession(format!(
                "session belongs to provider '{}', not '{}'",
                session.provider, self.name
            )));
        }
        Ok(Box::new(session))
    }

    async fn authorize(
        &self,
        session: &mut dyn Session,
        params: &CallbackParams,
    ) -> Result<String> {
        let session = session_as_mut::<FauxSession>(session, &self.name)?;
        if let Some(error) = params.get("error") {
            return Err(Error::upstream(&self.name, None, error));
        }
        session.access_token = Some(FAUX_ACCESS_TOKEN.to_string());
        session.expires_at = Some(Utc::now() + Duration::hours(1));
        Ok(FAUX_ACCESS_TOKEN.to_string())
    }

    async fn fetch_user(&self, session: &dyn Session) -> Result<User> {
        let session = session_as::<FauxSession>(session, &self.name)?;
        let access_token = session.access_token.clone().ok_or_else(|| {
            Error::IncompleteSession(format!(
                "{} cannot get user information without an access token",
                self.name
            ))
        })?;

        Ok(User {
            provider: self.name.clone(),
            access_token,
            expires_at: session.expires_at,
            ..self.user.clone()
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token> {
        if !self.refresh {
            return Err(Error::RefreshUnsupported {
                provider: self.name.clone(),
            });
        }
        Ok(Token::bearer(FAUX_ACCESS_TOKEN)
            .with_refresh_token(refresh_token)
            .expires_in(Duration::hours(1)))
    }

    fn refresh_token_available(&self) -> bool {
        self.refresh
    }

    fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }
}
