//! Generic OAuth2 authorization-code provider.
//!
//! Works with any service exposing the standard authorization, token and
//! profile endpoints. Nothing here is specific to one service: the
//! endpoints, credentials and scopes all come from [`OAuth2Config`].
//! Profile documents are mapped from the common OpenID Connect claim names
//! (`sub`, `email`, `name`, `given_name`, ...); the full document is kept
//! in [`User::raw_data`].

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::provider::{session_as, session_as_mut, CallbackParams, Provider, Session};
use crate::transport::ExchangeContext;
use crate::types::{Token, User};

/// Configuration for a [`OAuth2Provider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Config {
    /// Name the provider registers under.
    pub name: String,
    /// Client ID.
    pub client_id: String,
    /// Client secret (for confidential clients).
    pub client_secret: Option<String>,
    /// Callback URL registered with the service.
    pub redirect_url: String,
    /// Authorization endpoint. `begin_auth` fails while this is unset.
    pub auth_url: Option<String>,
    /// Token endpoint.
    pub token_url: String,
    /// Profile endpoint queried by `fetch_user`.
    pub profile_url: Option<String>,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Send a PKCE S256 challenge with the authorization request.
    pub use_pkce: bool,
    /// Whether the service supports the refresh token grant.
    pub refresh_supported: bool,
}

impl OAuth2Config {
    /// Create a configuration with the required fields.
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        redirect_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_url: redirect_url.into(),
            auth_url: None,
            token_url: token_url.into(),
            profile_url: None,
            scopes: Vec::new(),
            use_pkce: false,
            refresh_supported: false,
        }
    }

    /// Set the authorization endpoint.
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = Some(auth_url.into());
        self
    }

    /// Set the profile endpoint.
    pub fn with_profile_url(mut self, profile_url: impl Into<String>) -> Self {
        self.profile_url = Some(profile_url.into());
        self
    }

    /// Set client secret (for confidential clients).
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Set the requested scopes.
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Enable PKCE.
    pub fn with_pkce(mut self) -> Self {
        self.use_pkce = true;
        self
    }

    /// Declare refresh token support.
    pub fn with_refresh(mut self) -> Self {
        self.refresh_supported = true;
        self
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Convert into a [`Token`], rejecting lifetimes that overflow a timestamp.
    fn into_token(self, provider: &str) -> Result<Token> {
        let expiry = match self.expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        Error::upstream(provider, None, format!("invalid expires_in: {}", secs))
                    })?,
            ),
            None => None,
        };

        Ok(Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token,
            expiry,
            id_token: self.id_token,
            scope: self.scope,
        })
    }
}

/// Session created by [`OAuth2Provider`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuth2Session {
    /// Name of the provider that created the session.
    pub provider: String,
    /// Authorization URL the user is sent to.
    pub auth_url: String,
    /// PKCE verifier, kept until the code exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// Access token, set by `authorize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Refresh token, set by `authorize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// OpenID Connect ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl Session for OAuth2Session {
    fn auth_url(&self) -> Result<String> {
        if self.auth_url.is_empty() {
            return Err(Error::NoAuthUrl);
        }
        Ok(self.auth_url.clone())
    }

    fn marshal(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// OAuth2 authorization-code provider driven entirely by configuration.
///
/// # Example
///
/// ```rust,ignore
/// use authmux::providers::{OAuth2Config, OAuth2Provider};
///
/// let config = OAuth2Config::new(
///     "acme",
///     "client-id",
///     "https://app.example.com/auth/acme/callback",
///     "https://acme.example.com/oauth/token",
/// )
/// .with_auth_url("https://acme.example.com/oauth/authorize")
/// .with_profile_url("https://acme.example.com/api/me")
/// .with_scopes(["openid", "email"])
/// .with_pkce();
///
/// let provider = OAuth2Provider::new(config);
/// let session = provider.begin_auth("state").await?;
/// ```
pub struct OAuth2Provider {
    config: OAuth2Config,
    context: ExchangeContext,
    debug: AtomicBool,
}

impl std::fmt::Debug for OAuth2Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Provider")
            .field("name", &self.config.name)
            .field("client_id", &self.config.client_id)
            .field("auth_url", &self.config.auth_url)
            .field("token_url", &self.config.token_url)
            .field("has_transport_override", &self.context.has_override())
            .finish()
    }
}

impl OAuth2Provider {
    /// Create a provider using the shared default HTTP client.
    pub fn new(config: OAuth2Config) -> Self {
        Self::with_context(config, ExchangeContext::default())
    }

    /// Create a provider whose exchanges go through `context`.
    pub fn with_context(config: OAuth2Config, context: ExchangeContext) -> Self {
        Self {
            config,
            context,
            debug: AtomicBool::new(false),
        }
    }

    /// The provider configuration.
    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    fn authorization_url(&self, state: &str, code_challenge: Option<&str>) -> Result<String> {
        let auth_url = self.config.auth_url.as_deref().ok_or(Error::NoAuthUrl)?;
        let mut url = url::Url::parse(auth_url).map_err(|e| {
            Error::configuration(&self.config.name, format!("invalid auth_url: {}", e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_url)
                .append_pair("response_type", "code")
                .append_pair("state", state);
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }

        Ok(url.into())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        if self.is_debug() {
            tracing::debug!(
                provider = %self.config.name,
                token_url = %self.config.token_url,
                grant_type = form.iter().find(|(k, _)| *k == "grant_type").map(|(_, v)| *v),
                "Requesting token"
            );
        }

        let mut request = self
            .context
            .http_client()
            .post(&self.config.token_url)
            .form(form);

        if let Some(ref secret) = self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                provider = %self.config.name,
                status = status.as_u16(),
                "Token endpoint rejected request"
            );
            return Err(Error::upstream(
                &self.config.name,
                Some(status.as_u16()),
                error_text,
            ));
        }

        Ok(response.json::<TokenResponse>().await?)
    }

    async fn fetch_profile(
        &self,
        profile_url: &str,
        access_token: &str,
    ) -> Result<HashMap<String, serde_json::Value>> {
        if self.is_debug() {
            tracing::debug!(provider = %self.config.name, profile_url = %profile_url, "Fetching profile");
        }

        let response = self
            .context
            .http_client()
            .get(profile_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::upstream(
                &self.config.name,
                Some(status.as_u16()),
                error_text,
            ));
        }

        Ok(response.json().await?)
    }
}

/// Create a PKCE verifier and its S256 challenge.
fn pkce_pair() -> (String, String) {
    let verifier = format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    );
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

/// Read the `sub` claim from an ID token payload.
///
/// The signature is not checked. The token came straight from the token
/// endpoint, and the value only fills in a missing user id.
fn id_token_subject(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: HashMap<String, serde_json::Value> = serde_json::from_slice(&bytes).ok()?;
    claim(&claims, &["sub"])
}

fn claim(raw: &HashMap<String, serde_json::Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match raw.get(*key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
impl Provider for OAuth2Provider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn set_name(&mut self, name: &str) {
        self.config.name = name.to_string();
    }

    async fn begin_auth(&self, state: &str) -> Result<Box<dyn Session>> {
        let (code_verifier, code_challenge) = if self.config.use_pkce {
            let (verifier, challenge) = pkce_pair();
            (Some(verifier), Some(challenge))
        } else {
            (None, None)
        };

        let auth_url = self.authorization_url(state, code_challenge.as_deref())?;
        if self.is_debug() {
            tracing::debug!(provider = %self.config.name, auth_url = %auth_url, "Built authorization URL");
        }

        Ok(Box::new(OAuth2Session {
            provider: self.config.name.clone(),
            auth_url,
            code_verifier,
            ..Default::default()
        }))
    }

    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn Session>> {
        let session: OAuth2Session = serde_json::from_str(data).map_err(|e| {
            Error::InvalidSession(format!(
                "malformed session for provider '{}': {}",
                self.config.name, e
            ))
        })?;
        if session.provider != self.config.name {
            return Err(Error::InvalidSession(format!(
                "session belongs to provider '{}', not '{}'",
                session.provider, self.config.name
            )));
        }
        Ok(Box::new(session))
    }

    async fn authorize(
        &self,
        session: &mut dyn Session,
        params: &CallbackParams,
    ) -> Result<String> {
        let session = session_as_mut::<OAuth2Session>(session, &self.config.name)?;

        if let Some(error) = params.get("error") {
            let message = match params.get("error_description") {
                Some(description) => format!("{}: {}", error, description),
                None => error.to_string(),
            };
            return Err(Error::upstream(&self.config.name, None, message));
        }

        let code = params.get("code").ok_or_else(|| {
            Error::InvalidSession("callback is missing the authorization code".to_string())
        })?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(ref verifier) = session.code_verifier {
            form.push(("code_verifier", verifier.as_str()));
        }

        let token = self
            .request_token(&form)
            .await?
            .into_token(&self.config.name)?;
        tracing::info!(provider = %self.config.name, "Authorization code exchanged");

        session.access_token = Some(token.access_token.clone());
        session.refresh_token = token.refresh_token;
        session.expires_at = token.expiry;
        session.id_token = token.id_token;
        session.code_verifier = None;

        Ok(token.access_token)
    }

    async fn fetch_user(&self, session: &dyn Session) -> Result<User> {
        let session = session_as::<OAuth2Session>(session, &self.config.name)?;
        let access_token = session.access_token.clone().ok_or_else(|| {
            Error::IncompleteSession(format!(
                "{} cannot get user information without an access token",
                self.config.name
            ))
        })?;

        // Without a profile endpoint the user id comes from the ID token, and
        // stays empty when there is none.
        let mut user = User {
            provider: self.config.name.clone(),
            user_id: session
                .id_token
                .as_deref()
                .and_then(id_token_subject)
                .unwrap_or_default(),
            access_token,
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at,
            id_token: session.id_token.clone(),
            ..Default::default()
        };

        let Some(ref profile_url) = self.config.profile_url else {
            return Ok(user);
        };

        let raw = self.fetch_profile(profile_url, &user.access_token).await?;
        if let Some(user_id) = claim(&raw, &["sub", "id", "user_id"]) {
            user.user_id = user_id;
        }
        user.email = claim(&raw, &["email"]);
        user.name = claim(&raw, &["name"]);
        user.first_name = claim(&raw, &["given_name", "first_name"]);
        user.last_name = claim(&raw, &["family_name", "last_name"]);
        user.nick_name = claim(&raw, &["preferred_username", "nickname", "login"]);
        user.description = claim(&raw, &["description", "bio"]);
        user.avatar_url = claim(&raw, &["picture", "avatar_url"]);
        user.location = claim(&raw, &["location", "locale"]);
        user.raw_data = raw;

        Ok(user)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token> {
        if !self.config.refresh_supported {
            return Err(Error::RefreshUnsupported {
                provider: self.config.name.clone(),
            });
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        let token = self
            .request_token(&form)
            .await?
            .into_token(&self.config.name)?;
        tracing::info!(provider = %self.config.name, "Access token refreshed");
        Ok(token)
    }

    fn refresh_token_available(&self) -> bool {
        self.config.refresh_supported
    }

    fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuth2Config {
        OAuth2Config::new(
            "acme",
            "client id",
            "https://app.example.com/callback",
            "https://acme.example.com/token",
        )
        .with_auth_url("https://acme.example.com/authorize")
        .with_scopes(["openid", "email"])
    }

    fn query(url: &str) -> HashMap<String, String> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    #[tokio::test]
    async fn test_begin_auth_builds_url() {
        let provider = OAuth2Provider::new(config());
        let session = provider.begin_auth("st@te").await.unwrap();
        let url = session.auth_url().unwrap();
        assert!(url.starts_with("https://acme.example.com/authorize?"));

        let params = query(&url);
        assert_eq!(params["client_id"], "client id");
        assert_eq!(params["redirect_uri"], "https://app.example.com/callback");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid email");
        assert_eq!(params["state"], "st@te");
        assert!(!params.contains_key("code_challenge"));
    }

    #[tokio::test]
    async fn test_begin_auth_with_pkce() {
        let provider = OAuth2Provider::new(config().with_pkce());
        let session = provider.begin_auth("state").await.unwrap();
        let own = session_as::<OAuth2Session>(session.as_ref(), "acme").unwrap();

        let verifier = own.code_verifier.clone().unwrap();
        assert_eq!(verifier.len(), 64);

        let params = query(&own.auth_url);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(
            params["code_challenge"],
            URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
        );
    }

    #[tokio::test]
    async fn test_begin_auth_without_auth_url() {
        let mut cfg = config();
        cfg.auth_url = None;
        let provider = OAuth2Provider::new(cfg);
        let err = provider.begin_auth("state").await.unwrap_err();
        assert!(matches!(err, Error::NoAuthUrl));
    }

    #[tokio::test]
    async fn test_begin_auth_with_invalid_auth_url() {
        let provider = OAuth2Provider::new(config().with_auth_url("not a url"));
        let err = provider.begin_auth("state").await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unmarshal_malformed_data() {
        let provider = OAuth2Provider::new(config());
        let err = provider.unmarshal_session("{\"id\": 3}").unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_unmarshal_rejects_faux_session() {
        let provider = OAuth2Provider::new(config());
        let faux = crate::providers::FauxProvider::new().with_name("acme");
        let data = faux.begin_auth("state").await.unwrap().marshal();

        let err = provider.unmarshal_session(&data).unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_unmarshal_rejects_other_oauth2_provider() {
        let a = OAuth2Provider::new(config());
        let mut other = config();
        other.name = "other".to_string();
        let b = OAuth2Provider::new(other);

        let mut session = session_as::<OAuth2Session>(
            a.begin_auth("state").await.unwrap().as_ref(),
            "acme",
        )
        .unwrap()
        .clone();
        session.access_token = Some("secret-a".to_string());

        let err = b.unmarshal_session(&session.marshal()).unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
        assert!(a.unmarshal_session(&session.marshal()).is_ok());
    }

    #[test]
    fn test_token_response_with_overflowing_lifetime() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"at","expires_in":9223372036854775807}"#,
        )
        .unwrap();
        let err = response.into_token("acme").unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
        assert!(err.to_string().contains("invalid expires_in"));
    }

    #[test]
    fn test_token_response_lifetime() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at","expires_in":3600}"#).unwrap();
        let token = response.into_token("acme").unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert!(!token.is_expired());
    }

    #[test]
    fn test_id_token_subject() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"user-9","aud":"client"}"#);
        let id_token = format!("eyJhbGciOiJub25lIn0.{}.sig", payload);
        assert_eq!(id_token_subject(&id_token).as_deref(), Some("user-9"));
        assert_eq!(id_token_subject("opaque"), None);
        assert_eq!(id_token_subject("a.!!!.c"), None);
    }

    #[tokio::test]
    async fn test_authorize_rejects_foreign_session() {
        let provider = OAuth2Provider::new(config());
        let faux = crate::providers::FauxProvider::new();
        let mut session = faux.begin_auth("state").await.unwrap();

        let err = provider
            .authorize(session.as_mut(), &CallbackParams::new().with("code", "c"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_authorize_requires_code() {
        let provider = OAuth2Provider::new(config());
        let mut session = provider.begin_auth("state").await.unwrap();
        let err = provider
            .authorize(session.as_mut(), &CallbackParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_authorize_surfaces_callback_error() {
        let provider = OAuth2Provider::new(config());
        let mut session = provider.begin_auth("state").await.unwrap();
        let params = CallbackParams::from_query(
            "error=access_denied&error_description=user%20cancelled",
        );
        let err = provider
            .authorize(session.as_mut(), &params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access_denied: user cancelled"));
    }

    #[tokio::test]
    async fn test_refresh_unsupported() {
        let provider = OAuth2Provider::new(config());
        assert!(!provider.refresh_token_available());
        let err = provider.refresh_token("refresh").await.unwrap_err();
        assert!(matches!(err, Error::RefreshUnsupported { .. }));
    }

    #[test]
    fn test_claim_lookup() {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_value(
            serde_json::json!({ "id": 42, "login": "octo", "email": "" }),
        )
        .unwrap();
        assert_eq!(claim(&raw, &["sub", "id"]).as_deref(), Some("42"));
        assert_eq!(claim(&raw, &["login"]).as_deref(), Some("octo"));
        assert_eq!(claim(&raw, &["email"]), None);
    }

    #[test]
    fn test_debug_output_hides_secret() {
        let provider = OAuth2Provider::new(config().with_client_secret("s3cr3t"));
        let debug_str = format!("{:?}", provider);
        assert!(debug_str.contains("acme"));
        assert!(!debug_str.contains("s3cr3t"));
    }
}
