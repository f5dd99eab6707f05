//! Payment gateway webhook intake.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::{error, warn};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    use_cases::gateway_webhook::WebhookOutcome,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", post(handle_gateway_webhook))
}

async fn handle_gateway_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match app_state.webhook_use_cases.handle(&body, signature).await {
        Ok(outcome) => Ok(outcome_resp(outcome)),
        Err(e @ (AppError::InvalidSignature | AppError::InvalidInput(_))) => Err(e),
        // Transient failures answer 5xx so the gateway redelivers.
        Err(e) if e.is_retryable() => {
            error!(error = %e, retryable = true, "Webhook processing failed, asking for redelivery");
            Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            warn!(error = %e, retryable = false, "Webhook could not be applied, acknowledging");
            Ok(outcome_resp(WebhookOutcome::Ignored))
        }
    }
}

fn outcome_resp(outcome: WebhookOutcome) -> Response {
    (StatusCode::OK, Json(json!({ "outcome": outcome }))).into_response()
}
