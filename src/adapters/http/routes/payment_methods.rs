use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{TenantContext, tenant_context_middleware},
    },
    app_error::AppResult,
    domain::entities::payment_method::PaymentMethod,
    use_cases::payment_methods::NewPaymentMethod,
};

#[derive(Serialize)]
struct PaymentMethodsResponse {
    items: Vec<PaymentMethod>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(add))
        .route("/{id}/default", post(set_default))
        .route("/{id}", delete(remove))
        .route_layer(middleware::from_fn(tenant_context_middleware))
}

async fn list(
    State(app_state): State<AppState>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    let items = app_state.payment_method_use_cases.list(tenant_id).await?;
    Ok(Json(PaymentMethodsResponse { items }))
}

async fn add(
    State(app_state): State<AppState>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Json(payload): Json<NewPaymentMethod>,
) -> AppResult<impl IntoResponse> {
    let method = app_state
        .payment_method_use_cases
        .add(tenant_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(method)))
}

async fn set_default(
    State(app_state): State<AppState>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    app_state
        .payment_method_use_cases
        .set_default(tenant_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(
    State(app_state): State<AppState>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    app_state
        .payment_method_use_cases
        .remove(tenant_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
