use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    domain::entities::payment_method::{PaymentMethod, PaymentMethodKind},
    use_cases::payment_methods::{NewPaymentMethod, PaymentMethodRepo},
};

fn row_to_payment_method(row: PgRow) -> PaymentMethod {
    PaymentMethod {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        gateway_payment_method_id: row.get("gateway_payment_method_id"),
        kind: row.get("kind"),
        brand: row.get("brand"),
        last4: row.get("last4"),
        exp_month: row.get("exp_month"),
        exp_year: row.get("exp_year"),
        is_default: row.get("is_default"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, tenant_id, gateway_payment_method_id, kind, brand, last4,
    exp_month, exp_year, is_default, created_at
"#;

/// Months as `year * 12 + month` so expiry ranges compare as integers.
fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month() as i32
}

#[async_trait]
impl PaymentMethodRepo for PostgresPersistence {
    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<PaymentMethod>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payment_methods WHERE tenant_id = $1 ORDER BY created_at, id",
            SELECT_COLS
        ))
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_payment_method).collect())
    }

    async fn get_default(&self, tenant_id: Uuid) -> AppResult<Option<PaymentMethod>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_methods WHERE tenant_id = $1 AND is_default = true LIMIT 1",
            SELECT_COLS
        ))
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_payment_method))
    }

    async fn upsert(&self, tenant_id: Uuid, input: &NewPaymentMethod) -> AppResult<PaymentMethod> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO payment_methods
                   (id, tenant_id, gateway_payment_method_id, kind, brand, last4, exp_month, exp_year)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (gateway_payment_method_id)
               DO UPDATE SET kind = EXCLUDED.kind,
                             brand = EXCLUDED.brand,
                             last4 = EXCLUDED.last4,
                             exp_month = EXCLUDED.exp_month,
                             exp_year = EXCLUDED.exp_year
               WHERE payment_methods.tenant_id = EXCLUDED.tenant_id
               RETURNING {}"#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(&input.gateway_payment_method_id)
        .bind(input.kind)
        .bind(&input.brand)
        .bind(&input.last4)
        .bind(input.exp_month)
        .bind(input.exp_year)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row_to_payment_method(row))
    }

    async fn set_default(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        // Lock the tenant's methods so concurrent calls serialize.
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM payment_methods WHERE tenant_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::from)?;
        if !ids.contains(&id) {
            return Err(AppError::NotFound);
        }

        sqlx::query("UPDATE payment_methods SET is_default = (id = $2) WHERE tenant_id = $1")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM payment_methods WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn list_cards_expiring(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<PaymentMethod>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM payment_methods
               WHERE kind = $1
                 AND exp_year IS NOT NULL AND exp_month IS NOT NULL
                 AND exp_year * 12 + exp_month BETWEEN $2 AND $3
                 AND ($4::uuid IS NULL OR id > $4)
               ORDER BY id
               LIMIT $5"#,
            SELECT_COLS
        ))
        .bind(PaymentMethodKind::Card)
        .bind(month_index(from))
        .bind(month_index(to))
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_payment_method).collect())
    }
}
