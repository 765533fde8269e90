use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_OAUTH_BASE_URL: &str = "https://oauth.codef.io";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Path of the issuance endpoint, relative to the API base URL.
pub const TAX_CERT_PATH: &str = "/v1/kr/public/nt/proof-issue/tax-cert-all";

/// Path of the token endpoint, relative to the OAuth base URL.
pub const TOKEN_PATH: &str = "/oauth/token";

/// Provider deployment the client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Default API base URL for this environment.
    #[must_use]
    pub fn api_base_url(self) -> &'static str {
        match self {
            Self::Development => "https://development.codef.io",
            Self::Production => "https://api.codef.io",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::Config(format!("unknown environment: {other:?}"))),
        }
    }
}

/// CODEF client configuration.
///
/// Incomplete values are accepted on purpose: [`validate`](Config::validate)
/// reports what is missing, and each call fails on its own when it needs a
/// value that is not there.
///
/// ```rust,ignore
/// use codef_taxcert::Config;
///
/// let config = Config::new("client-id", "client-secret", public_key_pem)
///     .with_timeout(std::time::Duration::from_secs(10));
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) oauth_base_url: Url,
    pub(crate) api_base_url: Url,
    pub(crate) timeout: Duration,
    pub(crate) public_key: String,
    pub(crate) environment: Environment,
}

impl Config {
    /// Create a configuration for the development environment.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        let environment = Environment::default();
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            oauth_base_url: parse_builtin(DEFAULT_OAUTH_BASE_URL),
            api_base_url: parse_builtin(environment.api_base_url()),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            public_key: public_key.into(),
            environment,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Env vars
    /// - `CODEF_CLIENT_ID` (or `CODEF_DEMO_CLIENT_ID`)
    /// - `CODEF_CLIENT_SECRET` (or `CODEF_DEMO_CLIENT_SECRET`)
    /// - `CODEF_PUBLIC_KEY`: RSA public key, PEM or bare base64 SPKI
    /// - `CODEF_ENV`: `development` (default) or `production`
    /// - `CODEF_OAUTH_BASE_URL`: default `https://oauth.codef.io`
    /// - `CODEF_API_BASE_URL`: default depends on `CODEF_ENV`
    /// - `CODEF_API_TIMEOUT`: request timeout in milliseconds (default 30000)
    ///
    /// Unset or empty values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL, the timeout or the environment name is malformed.
    pub fn from_env() -> Result<Self, Error> {
        let environment = match env_non_empty("CODEF_ENV") {
            Some(name) => name.parse()?,
            None => Environment::default(),
        };

        let client_id = env_non_empty("CODEF_CLIENT_ID")
            .or_else(|| env_non_empty("CODEF_DEMO_CLIENT_ID"))
            .unwrap_or_default();
        let client_secret = env_non_empty("CODEF_CLIENT_SECRET")
            .or_else(|| env_non_empty("CODEF_DEMO_CLIENT_SECRET"))
            .unwrap_or_default();
        let public_key = env_non_empty("CODEF_PUBLIC_KEY").unwrap_or_default();

        let mut config = Self::new(client_id, client_secret, public_key).with_environment(environment);

        if let Some(url_str) = env_non_empty("CODEF_OAUTH_BASE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("CODEF_OAUTH_BASE_URL: {e}")))?;
            config = config.with_oauth_base_url(url);
        }
        if let Some(url_str) = env_non_empty("CODEF_API_BASE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("CODEF_API_BASE_URL: {e}")))?;
            config = config.with_api_base_url(url);
        }
        if let Some(ms) = env_non_empty("CODEF_API_TIMEOUT") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("CODEF_API_TIMEOUT: {e}")))?;
            config = config.with_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Switch environment; also resets the API base URL to that environment's default.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self.api_base_url = parse_builtin(environment.api_base_url());
        self
    }

    #[must_use]
    pub fn with_oauth_base_url(mut self, url: Url) -> Self {
        self.oauth_base_url = url;
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = url;
        self
    }

    /// Timeout applied to every provider-facing request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// OAuth client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Base URL of the token endpoint host.
    #[must_use]
    pub fn oauth_base_url(&self) -> &Url {
        &self.oauth_base_url
    }

    /// Base URL the issuance path is joined to.
    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    /// Per-request timeout for token and issuance calls.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// RSA public key text, PEM or base64 SPKI. Empty when unset.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Environment that picked the default API base URL.
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Full token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> String {
        join_url(&self.oauth_base_url, TOKEN_PATH)
    }

    /// Full issuance endpoint URL.
    #[must_use]
    pub fn tax_cert_url(&self) -> String {
        join_url(&self.api_base_url, TAX_CERT_PATH)
    }

    /// Check that every required value is present.
    #[must_use]
    pub fn validate(&self) -> ConfigReport {
        let mut errors = Vec::new();
        if self.client_id.trim().is_empty() {
            errors.push("client id is not set (CODEF_CLIENT_ID)".to_string());
        }
        if self.client_secret.trim().is_empty() {
            errors.push("client secret is not set (CODEF_CLIENT_SECRET)".to_string());
        }
        if self.oauth_base_url.host_str().is_none_or(str::is_empty) {
            errors.push("OAuth base URL has no host (CODEF_OAUTH_BASE_URL)".to_string());
        }
        if self.api_base_url.host_str().is_none_or(str::is_empty) {
            errors.push("API base URL has no host (CODEF_API_BASE_URL)".to_string());
        }
        if self.public_key.trim().is_empty() {
            errors.push("RSA public key is not set (CODEF_PUBLIC_KEY)".to_string());
        }
        ConfigReport { errors }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret_set", &!self.client_secret.is_empty())
            .field("oauth_base_url", &self.oauth_base_url.as_str())
            .field("api_base_url", &self.api_base_url.as_str())
            .field("timeout", &self.timeout)
            .field("public_key_set", &!self.public_key.is_empty())
            .field("environment", &self.environment)
            .finish()
    }
}

/// Result of [`Config::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub errors: Vec<String>,
}

impl ConfigReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn join_url(base: &Url, path: &str) -> String {
    format!("{}{path}", base.as_str().trim_end_matches('/'))
}

fn parse_builtin(url: &'static str) -> Url {
    url.parse().expect("valid default URL")
}
