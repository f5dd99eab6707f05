use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        let code = self.code();
        match self {
            AppError::InvalidInput(msg) | AppError::BusinessRule(msg) | AppError::Billing(msg) => {
                error_resp(status, code, Some(msg), Map::new())
            }
            AppError::MissingTenant | AppError::InvalidSignature | AppError::PaymentMethodRequired => {
                error_resp(status, code, Some(self.to_string()), Map::new())
            }
            AppError::DowngradeBlocked { ref violations } => {
                let mut extra = Map::new();
                extra.insert("violations".into(), json!(violations));
                error_resp(status, code, Some(self.to_string()), extra)
            }
            AppError::UsageLimitReached {
                resource,
                current,
                limit,
            } => {
                let mut extra = Map::new();
                extra.insert("resource".into(), json!(resource));
                extra.insert("current".into(), json!(current));
                extra.insert("limit".into(), json!(limit));
                error_resp(status, code, Some(self.to_string()), extra)
            }
            AppError::FeatureUnavailable {
                ref feature,
                ref required_plan,
            } => {
                let mut extra = Map::new();
                extra.insert("feature".into(), json!(feature));
                extra.insert("required_plan".into(), json!(required_plan));
                error_resp(status, code, Some(self.to_string()), extra)
            }
            AppError::UnknownFeature(ref feature) => {
                let mut extra = Map::new();
                extra.insert("feature".into(), json!(feature));
                error_resp(status, code, Some(self.to_string()), extra)
            }
            AppError::NotFound => error_resp(status, code, None, Map::new()),
            AppError::Database(_)
            | AppError::PriceNotConfigured { .. }
            | AppError::FreePlanMissing(_)
            | AppError::Configuration(_)
            | AppError::InvalidSubscriptionState(_)
            | AppError::Internal(_) => error_resp(status, code, None, Map::new()),
        }
    }
}

fn status_of(error: &AppError) -> StatusCode {
    match error {
        AppError::InvalidInput(_)
        | AppError::InvalidSignature
        | AppError::Billing(_)
        | AppError::UnknownFeature(_) => StatusCode::BAD_REQUEST,
        AppError::MissingTenant => StatusCode::UNAUTHORIZED,
        AppError::PaymentMethodRequired | AppError::UsageLimitReached { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        AppError::FeatureUnavailable { .. } => StatusCode::FORBIDDEN,
        AppError::NotFound => StatusCode::NOT_FOUND,
        AppError::BusinessRule(_) | AppError::DowngradeBlocked { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AppError::Database(_)
        | AppError::PriceNotConfigured { .. }
        | AppError::FreePlanMissing(_)
        | AppError::Configuration(_)
        | AppError::InvalidSubscriptionState(_)
        | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_resp(
    status: StatusCode,
    code: ErrorCode,
    message: Option<String>,
    extra: Map<String, Value>,
) -> Response {
    let mut body = Map::new();
    body.insert("code".into(), json!(code.as_str()));
    if let Some(msg) = message {
        body.insert("message".into(), json!(msg));
    }
    body.extend(extra);
    (status, Json(Value::Object(body))).into_response()
}
