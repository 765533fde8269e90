use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use super::config::RouteConfig;
use super::error::RouteError;
use super::state::RouteState;
use super::types::{PreparedRequest, TaxCertPayload};
use crate::response::ProviderResult;

/// Create the tax certificate router.
pub fn tax_cert_routes(config: RouteConfig) -> Router {
    let state = RouteState {
        client: Arc::new(config.client),
        cipher: Arc::new(config.cipher),
    };

    Router::new()
        .route(&config.path, post(issue))
        .with_state(state)
}

async fn issue(
    State(state): State<RouteState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ProviderResult>), RouteError> {
    let payload: TaxCertPayload = serde_json::from_slice(&body)
        .map_err(|e| RouteError::BadRequest(format!("malformed request body: {e}")))?;

    tracing::info!(
        login_type = ?payload.login_type,
        is_two_way = payload.is_two_way,
        "Tax certificate request received"
    );

    let outcome = match payload.prepare(&state.cipher)? {
        PreparedRequest::First(request) => state.client.submit_first(&request).await?,
        PreparedRequest::StepUp(request) => state.client.submit_step_up(&request).await?,
    };

    let status = StatusCode::from_u16(outcome.http_status()).unwrap_or(StatusCode::OK);
    Ok((status, Json(outcome.into_result())))
}
