use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    domain::entities::tenant::Tenant,
    use_cases::subscription::TenantRepo,
};

fn row_to_tenant(row: PgRow) -> Tenant {
    Tenant {
        id: row.get("id"),
        name: row.get("name"),
        owner_email: row.get("owner_email"),
        gateway_customer_id: row.get("gateway_customer_id"),
    }
}

const SELECT_COLS: &str = "id, name, owner_email, gateway_customer_id";

#[async_trait]
impl TenantRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Tenant>> {
        let row = sqlx::query(&format!("SELECT {} FROM tenants WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_tenant))
    }

    async fn get_by_gateway_customer_id(&self, customer_id: &str) -> AppResult<Option<Tenant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tenants WHERE gateway_customer_id = $1",
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_tenant))
    }

    async fn set_gateway_customer_id(&self, id: Uuid, customer_id: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE tenants SET gateway_customer_id = $2 WHERE id = $1")
            .bind(id)
            .bind(customer_id)
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
