use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{TenantContext, tenant_context_middleware},
    },
    app_error::AppResult,
    use_cases::feature_gate::{FeatureGate, FeatureStatus},
};

#[derive(Serialize)]
struct FeaturesResponse {
    items: Vec<FeatureStatus>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/grouped", get(grouped))
        .route("/{key}", get(status))
        .route_layer(middleware::from_fn(tenant_context_middleware))
}

async fn list(
    State(gate): State<Arc<FeatureGate>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    let items = gate.list_features(tenant_id).await?;
    Ok(Json(FeaturesResponse { items }))
}

async fn grouped(
    State(gate): State<Arc<FeatureGate>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(gate.grouped_features(tenant_id).await?))
}

async fn status(
    State(gate): State<Arc<FeatureGate>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(gate.feature_status(tenant_id, &key).await?))
}
