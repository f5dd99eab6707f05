use axum::{
    Extension, Json, Router, extract::State, middleware, response::IntoResponse, routing::get,
};
use serde::Serialize;

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{TenantContext, tenant_context_middleware},
    },
    app_error::AppResult,
    domain::entities::invoice::Invoice,
};

#[derive(Serialize)]
struct InvoicesResponse {
    items: Vec<Invoice>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route_layer(middleware::from_fn(tenant_context_middleware))
}

async fn list(
    State(app_state): State<AppState>,
    Extension(TenantContext(tenant_id)): Extension<TenantContext>,
) -> AppResult<impl IntoResponse> {
    let items = app_state.invoice_ledger.list(tenant_id).await?;
    Ok(Json(InvoicesResponse { items }))
}
