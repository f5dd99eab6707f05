use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::post,
};

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{TenantContext, tenant_context_middleware},
    },
    app_error::{AppError, AppResult},
    domain::entities::resource::Resource,
    use_cases::{usage::UsageMeter, usage_limits::UsageLimitService},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reservations", post(reserve).delete(release))
        .route("/{resource}/check", post(check))
        .route_layer(middleware::from_fn(tenant_context_middleware))
}

/// Count a booking against the period quota; 402 once the plan limit is reached.
async fn reserve(
    State(meter): State<Arc<UsageMeter>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    let record = meter.reserve(tenant_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn release(
    State(meter): State<Arc<UsageMeter>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(meter.release(tenant_id).await?))
}

async fn check(
    State(limits): State<Arc<UsageLimitService>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Path(resource): Path<String>,
) -> AppResult<impl IntoResponse> {
    let resource: Resource = resource
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Unknown resource '{}'", resource)))?;
    limits.ensure_can_create(tenant_id, resource).await?;
    Ok(StatusCode::NO_CONTENT)
}
