use std::sync::Arc;

use crate::cipher::SecretCipher;
use crate::client::ProtocolClient;
use crate::config::Config;
use crate::error::Error;
use crate::oauth::TokenManager;

const DEFAULT_PATH: &str = "/api/tax-cert";

/// Tax certificate route configuration.
///
/// Use [`from_env()`](RouteConfig::from_env) for convention-based setup,
/// or [`new()`](RouteConfig::new) with `with_*` methods for full control.
pub struct RouteConfig {
    pub(super) client: ProtocolClient,
    pub(super) cipher: SecretCipher,
    pub(super) path: String,
}

impl RouteConfig {
    #[must_use]
    pub fn new(client: ProtocolClient, cipher: SecretCipher) -> Self {
        Self {
            client,
            cipher,
            path: DEFAULT_PATH.into(),
        }
    }

    /// Build every core component from [`Config::from_env`].
    ///
    /// A missing public key or client credential does not fail here; the
    /// affected requests fail on their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an env var is malformed.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::from_config(&Config::from_env()?))
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let tokens = Arc::new(TokenManager::new(config));
        let client = ProtocolClient::new(config, tokens);
        let cipher = SecretCipher::new(config.public_key());
        Self::new(client, cipher)
    }

    /// Route path (default `/api/tax-cert`). A missing leading `/` is added.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RouteConfig {
        RouteConfig::from_config(&Config::new("id", "secret", ""))
    }

    #[test]
    fn test_default_path() {
        assert_eq!(config().path(), "/api/tax-cert");
    }

    #[test]
    fn test_with_path_adds_leading_slash() {
        assert_eq!(config().with_path("issue").path(), "/issue");
        assert_eq!(config().with_path("/issue").path(), "/issue");
    }
}
