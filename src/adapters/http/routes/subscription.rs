use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{TenantContext, tenant_context_middleware},
    },
    app_error::AppResult,
    domain::entities::billing_cycle::BillingCycle,
    use_cases::subscription::{
        CreateSubscriptionInput, DowngradeInput, SubscriptionUseCases, UpgradeInput,
    },
};

#[derive(Deserialize)]
struct ProrationQuery {
    plan: String,
    billing_cycle: Option<BillingCycle>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).post(create))
        .route("/upgrade", post(upgrade))
        .route("/upgrade-immediate", post(upgrade_immediate))
        .route("/downgrade", post(downgrade).delete(cancel_downgrade))
        .route("/cancel", post(cancel))
        .route("/resume", post(resume))
        .route("/usage", get(usage))
        .route("/proration", get(proration))
        .route_layer(middleware::from_fn(tenant_context_middleware))
}

async fn show(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.show(tenant_id).await?))
}

async fn create(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Json(payload): Json<CreateSubscriptionInput>,
) -> AppResult<impl IntoResponse> {
    let view = use_cases.create(tenant_id, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn upgrade(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Json(payload): Json<UpgradeInput>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.upgrade(tenant_id, payload, false).await?))
}

async fn upgrade_immediate(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Json(payload): Json<UpgradeInput>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.upgrade(tenant_id, payload, true).await?))
}

async fn downgrade(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Json(payload): Json<DowngradeInput>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.downgrade(tenant_id, payload).await?))
}

async fn cancel_downgrade(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.cancel_scheduled_downgrade(tenant_id).await?))
}

async fn cancel(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.cancel(tenant_id).await?))
}

async fn resume(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.resume(tenant_id).await?))
}

async fn usage(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(use_cases.usage(tenant_id).await?))
}

async fn proration(
    State(use_cases): State<Arc<SubscriptionUseCases>>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
    Query(query): Query<ProrationQuery>,
) -> AppResult<impl IntoResponse> {
    let preview = use_cases
        .proration_preview(tenant_id, &query.plan, query.billing_cycle)
        .await?;
    Ok(Json(preview))
}
