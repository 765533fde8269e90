use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::error::Error;
use crate::oauth::TokenManager;
use crate::request::{IssuanceRequest, StepUpRequest};
use crate::response::{Outcome, Phase};

/// Drives the two-phase issuance protocol against the provider.
///
/// Secrets in the requests must already be encrypted (see
/// [`SecretCipher`](crate::SecretCipher)); the client only attaches the
/// bearer token, posts, and classifies the answer.
///
/// ```rust,ignore
/// let tokens = Arc::new(TokenManager::new(&config));
/// let client = ProtocolClient::new(&config, tokens);
///
/// match client.submit_first(&request).await? {
///     Outcome::StepUpRequired { challenge, .. } => {
///         // wait for the user to confirm on their phone, then:
///         let done = client.submit_step_up(&challenge.approve(request)).await?;
///     }
///     Outcome::Complete(result) => { /* ... */ }
/// }
/// ```
pub struct ProtocolClient {
    endpoint: String,
    timeout: std::time::Duration,
    tokens: Arc<TokenManager>,
    http: reqwest::Client,
}

impl ProtocolClient {
    /// Incomplete configuration is logged, not rejected; calls fail on their own.
    #[must_use]
    pub fn new(config: &Config, tokens: Arc<TokenManager>) -> Self {
        let report = config.validate();
        if !report.is_valid() {
            tracing::warn!(errors = ?report.errors, "CODEF configuration is incomplete");
        }
        Self {
            endpoint: config.tax_cert_url(),
            timeout: config.timeout,
            tokens,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Phase 1: submit a fresh issuance request.
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] if no token can be obtained, [`Error::Http`] on
    /// transport failure or timeout, [`Error::Provider`] for an unparseable
    /// body or an unrecognized code on a non-2xx status.
    pub async fn submit_first(&self, request: &IssuanceRequest) -> Result<Outcome, Error> {
        tracing::info!(login_type = %request.login_type(), "Submitting tax certificate request");
        self.post(request, Phase::First).await
    }

    /// Phase 2: answer a step-up challenge. Never yields another challenge.
    ///
    /// # Errors
    ///
    /// Same as [`submit_first`](ProtocolClient::submit_first).
    pub async fn submit_step_up(&self, request: &StepUpRequest) -> Result<Outcome, Error> {
        let continuation = request.continuation();
        if continuation.is_expired() {
            tracing::warn!(
                transaction_id = %continuation.transaction_id,
                expired_at = %continuation.expires_at(),
                "Continuation is past its approval window; submitting anyway"
            );
        }
        tracing::info!(
            transaction_id = %continuation.transaction_id,
            approval = request.approval().code(),
            "Submitting step-up response"
        );
        self.post(request, Phase::StepUp).await
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T, phase: Phase) -> Result<Outcome, Error> {
        let token = self.tokens.get_valid_token().await?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;

        let (outcome, diagnostics) = Outcome::classify(status, &text, phase)?;
        for diagnostic in &diagnostics {
            tracing::warn!(
                field = %diagnostic.field,
                error = %diagnostic.error,
                "Response field left undecoded"
            );
        }
        tracing::info!(
            status,
            code = %outcome.code(),
            step_up = outcome.challenge().is_some(),
            "Provider response classified"
        );
        Ok(outcome)
    }
}
