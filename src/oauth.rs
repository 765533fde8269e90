use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::Error;
use crate::types::AccessToken;

/// Safety margin subtracted from a token's declared expiry.
pub const RENEWAL_SKEW: Duration = Duration::minutes(5);

/// Cached OAuth session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub access_token: AccessToken,
    pub token_type: String,
    /// Renewal time plus the provider-declared lifetime.
    pub expires_at: OffsetDateTime,
}

impl SessionToken {
    /// Usable while `now < expires_at - RENEWAL_SKEW`.
    #[must_use]
    pub fn is_usable_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at - RENEWAL_SKEW
    }
}

/// Token response from the provider's token endpoint.
#[derive(Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Snapshot of the cached session, without the token itself.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TokenInfo {
    pub has_token: bool,
    pub token_type: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub is_valid: bool,
}

/// Owns the provider OAuth session: acquires, caches and renews one bearer token.
///
/// Share it behind an `Arc`. Concurrent callers that find the token stale
/// produce a single renewal request and all receive its result, including
/// its failure.
///
/// ```rust,ignore
/// let tokens = Arc::new(TokenManager::new(&config));
/// let header = tokens.authorization_header_value().await?;
/// ```
pub struct TokenManager {
    client_id: String,
    client_secret: String,
    token_url: String,
    timeout: std::time::Duration,
    http: reqwest::Client,
    slot: RwLock<Option<SessionToken>>,
    /// Reason the most recent renewal failed, `None` after a success.
    renewal: Mutex<Option<String>>,
    /// Finished renewal attempts; bumped while `renewal` is held.
    attempts: AtomicU64,
}

impl TokenManager {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url(),
            timeout: config.timeout,
            http: reqwest::Client::new(),
            slot: RwLock::new(None),
            renewal: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Return the cached token, renewing it first if it is absent or stale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the provider rejects the exchange or
    /// answers without a usable token, or [`Error::Http`] on transport
    /// failure (including timeout).
    pub async fn get_valid_token(&self) -> Result<AccessToken, Error> {
        if let Some(token) = self.usable_token(OffsetDateTime::now_utc()) {
            return Ok(token);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.renewal.lock().await;
        // Another caller may have renewed while we waited.
        if let Some(token) = self.usable_token(OffsetDateTime::now_utc()) {
            return Ok(token);
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(reason) = last_failure.as_ref() {
                return Err(Error::Auth(reason.clone()));
            }
        }

        let renewed = self.renew().await;
        self.attempts.fetch_add(1, Ordering::Release);
        match renewed {
            Ok(session) => {
                *last_failure = None;
                let token = session.access_token.clone();
                *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Access token renewal failed");
                *last_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// `"Bearer {token}"`, renewing first if needed.
    ///
    /// # Errors
    ///
    /// See [`get_valid_token`](TokenManager::get_valid_token).
    pub async fn authorization_header_value(&self) -> Result<String, Error> {
        let token = self.get_valid_token().await?;
        Ok(format!("Bearer {}", token.as_str()))
    }

    /// Whether a cached token is usable right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    /// Whether a cached token is usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.usable_token(now).is_some()
    }

    /// Snapshot of the cached session.
    #[must_use]
    pub fn token_info(&self) -> TokenInfo {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        let now = OffsetDateTime::now_utc();
        TokenInfo {
            has_token: slot.is_some(),
            token_type: slot.as_ref().map(|s| s.token_type.clone()),
            expires_at: slot.as_ref().map(|s| s.expires_at),
            is_valid: slot.as_ref().is_some_and(|s| s.is_usable_at(now)),
        }
    }

    /// Declared expiry of the cached token.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.expires_at)
    }

    /// Time until the declared expiry; zero when absent or already past.
    #[must_use]
    pub fn time_remaining(&self) -> Duration {
        self.expires_at()
            .map(|at| at - OffsetDateTime::now_utc())
            .filter(|d| d.is_positive())
            .unwrap_or(Duration::ZERO)
    }

    /// Drop the cached token; the next call renews.
    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("Cleared cached access token");
    }

    fn usable_token(&self, now: OffsetDateTime) -> Option<AccessToken> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|s| s.is_usable_at(now))
            .map(|s| s.access_token.clone())
    }

    async fn renew(&self) -> Result<SessionToken, Error> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(Error::Auth("client credentials are not configured".into()));
        }

        let renewed_at = OffsetDateTime::now_utc();
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .timeout(self.timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token renewal").await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("token renewal: unreadable response: {e}")))?;

        if body.access_token.is_empty() {
            return Err(Error::Auth("token renewal: response has no access_token".into()));
        }
        let ttl = match body.expires_in {
            Some(secs) if secs > 0 => Duration::seconds(secs),
            _ => {
                return Err(Error::Auth(
                    "token renewal: response has no usable expires_in".into(),
                ));
            }
        };

        tracing::info!(
            token_type = %body.token_type,
            expires_in = ttl.whole_seconds(),
            scope = body.scope.as_deref().unwrap_or(""),
            "Access token renewed"
        );

        Ok(SessionToken {
            access_token: AccessToken::from(body.access_token),
            token_type: body.token_type,
            expires_at: renewed_at + ttl,
        })
    }

    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Auth(format!("{operation} failed (HTTP {status}): {body}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use wiremock::matchers::{body_string, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn manager(server: &MockServer) -> TokenManager {
        let config = Config::new("client", "secret", "key")
            .with_oauth_base_url(server.uri().parse().unwrap());
        TokenManager::new(&config)
    }

    fn token_body(token: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": 604_799,
            "scope": "read"
        })
    }

    fn session(expires_at: OffsetDateTime) -> SessionToken {
        SessionToken {
            access_token: AccessToken::from("t".to_string()),
            token_type: "bearer".into(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_renews_with_basic_auth_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header_exists("authorization"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("abc")))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert!(!tokens.is_valid());
        assert_eq!(tokens.get_valid_token().await.unwrap().as_str(), "abc");
        assert_eq!(tokens.get_valid_token().await.unwrap().as_str(), "abc");
        assert!(tokens.is_valid());
        assert_eq!(
            tokens.authorization_header_value().await.unwrap(),
            "Bearer abc"
        );
        assert!(tokens.time_remaining() > Duration::days(6));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_renewal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("shared"))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(manager(&server));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = Arc::clone(&tokens);
                tokio::spawn(async move { tokens.get_valid_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_str(), "shared");
        }
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let err = manager(&server).get_valid_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string("invalid_client")
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(manager(&server));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = Arc::clone(&tokens);
                tokio::spawn(async move { tokens.get_valid_token().await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::Auth(ref m) if m.contains("401")));
        }
    }

    #[tokio::test]
    async fn test_next_call_after_failure_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("recovered")))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert!(matches!(tokens.get_valid_token().await, Err(Error::Auth(_))));
        assert_eq!(tokens.get_valid_token().await.unwrap().as_str(), "recovered");
    }

    #[tokio::test]
    async fn test_renewal_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("late"))
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = Config::new("client", "secret", "key")
            .with_oauth_base_url(server.uri().parse().unwrap())
            .with_timeout(std::time::Duration::from_millis(200));
        let err = TokenManager::new(&config).get_valid_token().await.unwrap_err();
        assert!(matches!(err, Error::Http(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_missing_token_field_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"expires_in": 10})),
            )
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert!(matches!(tokens.get_valid_token().await, Err(Error::Auth(_))));
        assert!(!tokens.token_info().has_token);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let config = Config::new("", "", "key").with_oauth_base_url(server.uri().parse().unwrap());
        let err = TokenManager::new(&config).get_valid_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_clear_forces_renewal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("again")))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        tokens.get_valid_token().await.unwrap();
        tokens.clear();
        assert_eq!(tokens.time_remaining(), Duration::ZERO);
        assert!(tokens.expires_at().is_none());
        tokens.get_valid_token().await.unwrap();
    }

    #[test]
    fn test_token_info_reports_without_secret() {
        let tokens = TokenManager::new(&Config::new("id", "secret", "key"));
        let expires_at = OffsetDateTime::now_utc() + Duration::hours(1);
        *tokens.slot.write().unwrap() = Some(session(expires_at));

        let info = tokens.token_info();
        assert!(info.has_token);
        assert!(info.is_valid);
        assert_eq!(info.token_type.as_deref(), Some("bearer"));
        assert_eq!(info.expires_at, Some(expires_at));
    }

    proptest! {
        #[test]
        fn test_validity_window(ttl in 301_i64..86_400, offset in 0_i64..90_000) {
            let t0 = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
            let token = session(t0 + Duration::seconds(ttl));
            let now = t0 + Duration::seconds(offset);
            prop_assert_eq!(token.is_usable_at(now), offset < ttl - 300);

            let tokens = TokenManager::new(&Config::new("id", "secret", "key"));
            *tokens.slot.write().unwrap() = Some(token);
            prop_assert_eq!(tokens.is_valid_at(now), offset < ttl - 300);
        }
    }
}
