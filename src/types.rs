//! Data returned by providers: the authenticated [`User`] and OAuth [`Token`]s.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Profile of an authenticated user.
///
/// A snapshot taken at `fetch_user` time. Fields the provider does not
/// expose are left as `None`; the untouched profile document is kept in
/// [`raw_data`](User::raw_data).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Name of the provider that authenticated the user.
    pub provider: String,

    /// Provider-scoped user identifier.
    pub user_id: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Handle or preferred username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,

    /// Free-form profile description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Avatar image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Location or locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Access token obtained during the flow.
    pub access_token: String,

    /// Token secret (OAuth1 providers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,

    /// Refresh token, if the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// OpenID Connect ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Profile document as returned by the provider.
    #[serde(default)]
    pub raw_data: HashMap<String, serde_json::Value>,
}

/// OAuth access token obtained from a code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The access token.
    pub access_token: String,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// Refresh token, if issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// OpenID Connect ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scope (space-separated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// Create a bearer token without expiry.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expiry: None,
            id_token: None,
            scope: None,
        }
    }

    /// Set the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the expiry relative to now.
    pub fn expires_in(mut self, lifetime: Duration) -> Self {
        self.expiry = Some(Utc::now() + lifetime);
        self
    }

    /// Check if the token is expired. Tokens without expiry never expire.
    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|expiry| Utc::now() >= expiry)
    }

    /// Check if the token expires within `threshold`.
    pub fn expires_soon(&self, threshold: Duration) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - Utc::now() < threshold)
    }

    /// Value for an `Authorization` header.
    pub fn to_header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_defaults() {
        let token = Token::bearer("abc");
        assert_eq!(token.token_type, "Bearer");
        assert!(!token.is_expired());
        assert!(!token.expires_soon(Duration::seconds(60)));
        assert_eq!(token.to_header_value(), "Bearer abc");
    }

    #[test]
    fn test_token_expiry() {
        let expired = Token::bearer("abc").expires_in(Duration::seconds(-5));
        assert!(expired.is_expired());
        assert!(expired.expires_soon(Duration::seconds(60)));

        let fresh = Token::bearer("abc").expires_in(Duration::hours(1));
        assert!(!fresh.is_expired());
        assert!(!fresh.expires_soon(Duration::seconds(60)));
        assert!(fresh.expires_soon(Duration::hours(2)));
    }

    #[test]
    fn test_user_skips_empty_fields() {
        let user = User {
            provider: "faux".to_string(),
            user_id: "42".to_string(),
            access_token: "token".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["provider"], "faux");
        assert!(json.get("email").is_none());

        let back: User = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }
}
