use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    domain::entities::plan::{FeatureValue, Plan},
    use_cases::plan_catalog::PlanRepo,
};

fn row_to_plan(row: PgRow) -> Plan {
    let id: Uuid = row.get("id");
    let id_str = id.to_string();
    let features: BTreeMap<String, FeatureValue> =
        parse_json_with_fallback(&row.get("features"), "features", "plan", &id_str);
    let limits: BTreeMap<String, i64> =
        parse_json_with_fallback(&row.get("limits"), "limits", "plan", &id_str);

    Plan {
        id,
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        monthly_price: row.get("monthly_price"),
        yearly_price: row.get("yearly_price"),
        currency: row.get("currency"),
        features,
        limits,
        sort_order: row.get("sort_order"),
        trial_days: row.get("trial_days"),
        is_active: row.get("is_active"),
        is_public: row.get("is_public"),
        gateway_monthly_price_id: row.get("gateway_monthly_price_id"),
        gateway_yearly_price_id: row.get("gateway_yearly_price_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, slug, name, description, monthly_price, yearly_price, currency,
    features, limits, sort_order, trial_days, is_active, is_public,
    gateway_monthly_price_id, gateway_yearly_price_id, created_at, updated_at
"#;

#[async_trait]
impl PlanRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>> {
        let row = sqlx::query(&format!("SELECT {} FROM plans WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_plan))
    }

    async fn get_by_slug(&self, slug: &str) -> AppResult<Option<Plan>> {
        let row = sqlx::query(&format!("SELECT {} FROM plans WHERE slug = $1", SELECT_COLS))
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_plan))
    }

    async fn list_active(&self) -> AppResult<Vec<Plan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM plans WHERE is_active = true ORDER BY sort_order, slug",
            SELECT_COLS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_plan).collect())
    }
}
