//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use deposit_payments::{signature::SIGNATURE_HEADER, DepositRequestBody, PaymentError};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub checkout_url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

const fn status_for(error: &PaymentError) -> StatusCode {
    match error {
        PaymentError::InvalidRequest(_)
        | PaymentError::InvalidAmount(_)
        | PaymentError::InvalidSignature(_)
        | PaymentError::WebhookParse(_) => StatusCode::BAD_REQUEST,
        PaymentError::Upstream(_) => StatusCode::BAD_GATEWAY,
        PaymentError::Config(_) | PaymentError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: &PaymentError) -> ApiError {
    (
        status_for(error),
        Json(ErrorResponse {
            error: error.user_message().into(),
            code: error.code().into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.stripe_configured,
    })
}

/// Start a deposit: validate and open a Stripe checkout session
pub async fn create_deposit(
    State(state): State<AppState>,
    payload: Result<Json<DepositRequestBody>, JsonRejection>,
) -> Result<Json<DepositResponse>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Malformed deposit request");
        api_error(&PaymentError::InvalidRequest(rejection.body_text()))
    })?;

    let intent = state
        .issuer
        .create_deposit(body)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(DepositResponse {
        checkout_url: intent.checkout_url,
    }))
}

/// Stripe webhook handler
///
/// Takes the body as raw bytes; it is only decoded after the signature
/// over those exact bytes checks out.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.webhooks.handle(&body, signature).await {
        Ok(_) => Json(WebhookAck { received: true }).into_response(),
        Err(e) => (
            status_for(&e),
            format!("Webhook Error: {}", e.user_message()),
        )
            .into_response(),
    }
}
