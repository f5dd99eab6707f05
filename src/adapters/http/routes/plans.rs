use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    use_cases::plan_catalog::{PlanCatalog, PlanSummary},
};

#[derive(Serialize)]
struct PlansResponse {
    items: Vec<PlanSummary>,
}

/// Public catalog endpoints. No tenant context needed.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/compare", get(compare))
        .route("/{slug}", get(detail))
}

async fn list(State(catalog): State<Arc<PlanCatalog>>) -> AppResult<impl IntoResponse> {
    let items = catalog.list_public().await?;
    Ok(Json(PlansResponse { items }))
}

async fn compare(State(catalog): State<Arc<PlanCatalog>>) -> AppResult<impl IntoResponse> {
    Ok(Json(catalog.compare().await?))
}

async fn detail(
    State(catalog): State<Arc<PlanCatalog>>,
    Path(slug): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(catalog.detail(&slug).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::Value;

    use crate::test_utils::{TestContext, basic_plan, free_plan, pro_plan};

    fn build_test_router(app_state: AppState) -> Router<()> {
        router().with_state(app_state)
    }

    #[tokio::test]
    async fn list_hides_private_plans_and_keeps_order() {
        let ctx = TestContext::with_plans(vec![
            pro_plan(|_| {}),
            free_plan(|_| {}),
            basic_plan(|p| p.is_public = false),
        ]);
        let server = TestServer::new(build_test_router(ctx.app_state())).unwrap();

        let response = server.get("/").await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        let slugs: Vec<&str> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["slug"].as_str().unwrap())
            .collect();
        assert_eq!(slugs, vec!["free", "pro"]);
    }

    #[tokio::test]
    async fn detail_renders_discount_and_unlimited() {
        let ctx = TestContext::new();
        let server = TestServer::new(build_test_router(ctx.app_state())).unwrap();

        let response = server.get("/pro").await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        // 20 * 12 = 240 against 200 yearly
        assert_eq!(body["yearly_discount_percent"], 17);
        assert_eq!(body["limits"]["reservations"], "unlimited");
        assert_eq!(body["limits"]["users"], 10);
    }

    #[tokio::test]
    async fn unknown_plan_returns_404() {
        let ctx = TestContext::new();
        let server = TestServer::new(build_test_router(ctx.app_state())).unwrap();

        server.get("/platinum").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn compare_has_one_column_per_plan() {
        let ctx = TestContext::new();
        let server = TestServer::new(build_test_router(ctx.app_state())).unwrap();

        let response = server.get("/compare").await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["plans"].as_array().unwrap().len(), 3);
        assert_eq!(body["limits"]["users"].as_array().unwrap().len(), 3);
    }
}
