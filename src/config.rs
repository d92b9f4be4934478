//! Provider configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.authmux.toml`)
//! 2. Environment variables (with `AUTHMUX_` prefix)
//!
//! Environment variables override TOML configuration. Client secrets are
//! usually supplied through the environment only.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [http]
//! timeout_secs = 10
//!
//! [[providers]]
//! name = "acme"
//! kind = "oauth2"
//! client_id = "my-client-id"
//! redirect_url = "https://app.example.com/auth/acme/callback"
//! auth_url = "https://acme.example.com/oauth/authorize"
//! token_url = "https://acme.example.com/oauth/token"
//! profile_url = "https://acme.example.com/api/me"
//! scopes = ["openid", "email"]
//! pkce = true
//! refresh = true
//!
//! [[providers]]
//! name = "faux"
//! kind = "faux"
//! ```
//!
//! Per-provider environment overrides use the upper-cased provider name
//! with `-` replaced by `_`: `AUTHMUX_ACME_CLIENT_ID`,
//! `AUTHMUX_ACME_CLIENT_SECRET`, `AUTHMUX_ACME_REDIRECT_URL`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::providers::{FauxProvider, OAuth2Config, OAuth2Provider};
use crate::registry::ProviderRegistry;
use crate::transport::{build_http_client, context_for_client};

const DEFAULT_CONFIG_FILE: &str = ".authmux.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HTTP client settings.
    pub http: HttpConfig,

    /// Configured providers.
    pub providers: Vec<ProviderSettings>,
}

/// HTTP client settings shared by all configured providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Which implementation backs a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// [`OAuth2Provider`].
    #[default]
    OAuth2,
    /// [`FauxProvider`].
    Faux,
}

/// Settings for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registry name.
    pub name: String,
    /// Implementation.
    pub kind: ProviderKind,
    /// Client ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Callback URL.
    pub redirect_url: String,
    /// Authorization endpoint.
    pub auth_url: Option<String>,
    /// Token endpoint.
    pub token_url: String,
    /// Profile endpoint.
    pub profile_url: Option<String>,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Use PKCE.
    pub pkce: bool,
    /// Refresh token support.
    pub refresh: bool,
}

impl AuthConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML configuration file
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("AUTHMUX_HTTP_TIMEOUT_SECS") {
            if let Ok(v) = timeout.parse() {
                self.http.timeout_secs = v;
            }
        }

        for provider in &mut self.providers {
            let prefix = env_prefix(&provider.name);

            if let Ok(client_id) = std::env::var(format!("{prefix}_CLIENT_ID")) {
                provider.client_id = client_id;
            }
            if let Ok(secret) = std::env::var(format!("{prefix}_CLIENT_SECRET")) {
                provider.client_secret = Some(secret);
            }
            if let Ok(redirect_url) = std::env::var(format!("{prefix}_REDIRECT_URL")) {
                provider.redirect_url = redirect_url;
            }
        }
    }

    /// Build every configured provider.
    ///
    /// OAuth2 providers share one HTTP client built from [`HttpConfig`].
    pub fn build_providers(&self) -> Result<Vec<Arc<dyn Provider>>> {
        let needs_http = self
            .providers
            .iter()
            .any(|p| p.kind == ProviderKind::OAuth2);
        let client = if needs_http {
            Some(build_http_client(Duration::from_secs(
                self.http.timeout_secs,
            ))?)
        } else {
            None
        };

        self.providers
            .iter()
            .map(|settings| settings.build(client.clone()))
            .collect()
    }

    /// Build every configured provider and register it.
    ///
    /// Nothing is registered if any provider fails to build. Returns the
    /// number of providers registered.
    pub fn register_into(&self, registry: &ProviderRegistry) -> Result<usize> {
        let providers = self.build_providers()?;
        let count = providers.len();
        registry.register(providers);
        tracing::info!(count, "Registered configured providers");
        Ok(count)
    }
}

impl ProviderSettings {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("provider entry without a name".to_string()));
        }
        if self.kind == ProviderKind::Faux {
            return Ok(());
        }
        if self.client_id.is_empty() {
            return Err(Error::configuration(&self.name, "client_id is required"));
        }
        if self.redirect_url.is_empty() {
            return Err(Error::configuration(&self.name, "redirect_url is required"));
        }
        url::Url::parse(&self.token_url).map_err(|e| {
            Error::configuration(&self.name, format!("invalid token_url: {}", e))
        })?;
        Ok(())
    }

    fn build(&self, http_client: Option<reqwest::Client>) -> Result<Arc<dyn Provider>> {
        self.validate()?;

        let provider: Arc<dyn Provider> = match self.kind {
            ProviderKind::Faux => {
                let mut faux = FauxProvider::new().with_name(&self.name).with_refresh(self.refresh);
                if let Some(ref auth_url) = self.auth_url {
                    faux = faux.with_auth_url(auth_url);
                }
                Arc::new(faux)
            },
            ProviderKind::OAuth2 => {
                let config = OAuth2Config {
                    name: self.name.clone(),
                    client_id: self.client_id.clone(),
                    client_secret: self.client_secret.clone(),
                    redirect_url: self.redirect_url.clone(),
                    auth_url: self.auth_url.clone(),
                    token_url: self.token_url.clone(),
                    profile_url: self.profile_url.clone(),
                    scopes: self.scopes.clone(),
                    use_pkce: self.pkce,
                    refresh_supported: self.refresh,
                };
                Arc::new(OAuth2Provider::with_context(
                    config,
                    context_for_client(http_client),
                ))
            },
        };

        tracing::debug!(provider = %self.name, kind = ?self.kind, "Built provider");
        Ok(provider)
    }
}

fn env_prefix(name: &str) -> String {
    format!("AUTHMUX_{}", name.to_uppercase().replace('-', "_"))
}
