use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    domain::entities::{resource::Resource, usage_record::UsageRecord},
    use_cases::usage::{Recount, ResourceCounter, UsageRepo},
};

fn row_to_usage(row: PgRow) -> UsageRecord {
    UsageRecord {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        period: row.get("period"),
        reservations_count: row.get("reservations_count"),
        reservations_limit: row.get("reservations_limit"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str =
    "id, tenant_id, period, reservations_count, reservations_limit, created_at, updated_at";

const INSERT_IF_MISSING: &str = r#"
    INSERT INTO usage_records (id, tenant_id, period, reservations_count, reservations_limit)
    VALUES ($1, $2, $3, 0, $4)
    ON CONFLICT (tenant_id, period) DO NOTHING
"#;

/// Create the period row if needed, then lock it and return its count.
/// The limit snapshot is only written on insert.
async fn lock_usage_row(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    period: &str,
    limit_snapshot: i64,
) -> AppResult<i64> {
    sqlx::query(INSERT_IF_MISSING)
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(period)
        .bind(limit_snapshot)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from)?;

    let current: i64 = sqlx::query_scalar(
        "SELECT reservations_count FROM usage_records WHERE tenant_id = $1 AND period = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(period)
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::from)?;
    Ok(current)
}

async fn store_count(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    period: &str,
    count: i64,
) -> AppResult<UsageRecord> {
    let row = sqlx::query(&format!(
        r#"UPDATE usage_records
           SET reservations_count = $3, updated_at = NOW()
           WHERE tenant_id = $1 AND period = $2
           RETURNING {}"#,
        SELECT_COLS
    ))
    .bind(tenant_id)
    .bind(period)
    .bind(count.max(0))
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::from)?;
    Ok(row_to_usage(row))
}

impl PostgresPersistence {
    async fn mutate_usage(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
        next: impl FnOnce(i64) -> i64 + Send,
    ) -> AppResult<UsageRecord> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;
        let current = lock_usage_row(&mut *tx, tenant_id, period, limit_snapshot).await?;
        let record = store_count(&mut *tx, tenant_id, period, next(current)).await?;
        tx.commit().await.map_err(AppError::from)?;
        Ok(record)
    }
}

#[async_trait]
impl UsageRepo for PostgresPersistence {
    async fn get_or_create(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord> {
        sqlx::query(INSERT_IF_MISSING)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(period)
            .bind(limit_snapshot)
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM usage_records WHERE tenant_id = $1 AND period = $2",
            SELECT_COLS
        ))
        .bind(tenant_id)
        .bind(period)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row_to_usage(row))
    }

    async fn increment(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord> {
        self.mutate_usage(tenant_id, period, limit_snapshot, |count| count + 1)
            .await
    }

    async fn decrement(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord> {
        self.mutate_usage(tenant_id, period, limit_snapshot, |count| count - 1)
            .await
    }

    async fn recount(
        &self,
        tenant_id: Uuid,
        period: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit_snapshot: i64,
    ) -> AppResult<Recount> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;
        let previous = lock_usage_row(&mut *tx, tenant_id, period, limit_snapshot).await?;

        let actual: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3",
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let record = store_count(&mut *tx, tenant_id, period, actual).await?;
        tx.commit().await.map_err(AppError::from)?;
        Ok(Recount { previous, record })
    }

    async fn list_for_period(
        &self,
        period: &str,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<UsageRecord>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM usage_records
               WHERE period = $1 AND ($2::uuid IS NULL OR id > $2)
               ORDER BY id
               LIMIT $3"#,
            SELECT_COLS
        ))
        .bind(period)
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_usage).collect())
    }
}

fn live_count_sql(resource: Resource) -> &'static str {
    match resource {
        Resource::Users => {
            "SELECT COUNT(*) FROM tenant_users WHERE tenant_id = $1 AND deleted_at IS NULL"
        }
        Resource::Services => {
            "SELECT COUNT(*) FROM services WHERE tenant_id = $1 AND deleted_at IS NULL"
        }
        Resource::Clients => {
            "SELECT COUNT(*) FROM clients WHERE tenant_id = $1 AND deleted_at IS NULL"
        }
        Resource::Reservations => "SELECT COUNT(*) FROM reservations WHERE tenant_id = $1",
    }
}

#[async_trait]
impl ResourceCounter for PostgresPersistence {
    async fn count_live(&self, tenant_id: Uuid, resource: Resource) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(live_count_sql(resource))
            .bind(tenant_id)
            .fetch_one(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(count)
    }
}
