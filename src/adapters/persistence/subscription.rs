use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    domain::entities::subscription::{GatewayStatus, Subscription},
    use_cases::subscription::{NewSubscription, SubscriptionRepo},
};

fn row_to_subscription(row: PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        plan_id: row.get("plan_id"),
        gateway_subscription_id: row.get("gateway_subscription_id"),
        gateway_status: row.get("gateway_status"),
        billing_cycle: row.get("billing_cycle"),
        trial_ends_at: row.get("trial_ends_at"),
        ends_at: row.get("ends_at"),
        scheduled_plan_id: row.get("scheduled_plan_id"),
        scheduled_change_at: row.get("scheduled_change_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, tenant_id, plan_id, gateway_subscription_id, gateway_status, billing_cycle,
    trial_ends_at, ends_at, scheduled_plan_id, scheduled_change_at, created_at, updated_at
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO subscriptions
        (id, tenant_id, plan_id, gateway_subscription_id, gateway_status, billing_cycle, trial_ends_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

/// Candidate queries share the live filter and keyset paging by id.
const PAGE_SUFFIX: &str = "AND ($2::uuid IS NULL OR id > $2) ORDER BY id LIMIT $3";

impl PostgresPersistence {
    async fn list_live_where(
        &self,
        condition: &str,
        at: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE ends_at IS NULL AND {} {}",
            SELECT_COLS, condition, PAGE_SUFFIX
        ))
        .bind(at)
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    async fn list_live_between(
        &self,
        condition: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE ends_at IS NULL AND {} \
             AND ($3::uuid IS NULL OR id > $3) ORDER BY id LIMIT $4",
            SELECT_COLS, condition
        ))
        .bind(from)
        .bind(to)
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_subscription).collect())
    }
}

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn current_for_tenant(&self, tenant_id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
            SELECT_COLS
        ))
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn get_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE gateway_subscription_id = $1",
            SELECT_COLS
        ))
        .bind(gateway_subscription_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn create(&self, input: &NewSubscription) -> AppResult<Subscription> {
        let row = sqlx::query(&format!("{} RETURNING {}", INSERT_SQL, SELECT_COLS))
            .bind(Uuid::new_v4())
            .bind(input.tenant_id)
            .bind(input.plan_id)
            .bind(&input.gateway_subscription_id)
            .bind(input.gateway_status)
            .bind(input.billing_cycle)
            .bind(input.trial_ends_at)
            .fetch_one(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row_to_subscription(row))
    }

    async fn update(&self, sub: &Subscription) -> AppResult<Subscription> {
        let row = sqlx::query(&format!(
            r#"UPDATE subscriptions
               SET plan_id = $2,
                   gateway_status = $3,
                   billing_cycle = $4,
                   trial_ends_at = $5,
                   ends_at = $6,
                   scheduled_plan_id = $7,
                   scheduled_change_at = $8,
                   updated_at = clock_timestamp()
               WHERE id = $1
               RETURNING {}"#,
            SELECT_COLS
        ))
        .bind(sub.id)
        .bind(sub.plan_id)
        .bind(sub.gateway_status)
        .bind(sub.billing_cycle)
        .bind(sub.trial_ends_at)
        .bind(sub.ends_at)
        .bind(sub.scheduled_plan_id)
        .bind(sub.scheduled_change_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        row.map(row_to_subscription).ok_or(AppError::NotFound)
    }

    async fn supersede(
        &self,
        old_id: Uuid,
        ended_at: DateTime<Utc>,
        replacement: &NewSubscription,
    ) -> AppResult<Subscription> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let ended = sqlx::query(
            r#"UPDATE subscriptions
               SET ends_at = $2,
                   gateway_status = $3,
                   scheduled_plan_id = NULL,
                   scheduled_change_at = NULL,
                   updated_at = $2
               WHERE id = $1"#,
        )
        .bind(old_id)
        .bind(ended_at)
        .bind(GatewayStatus::Canceled)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;
        if ended.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        let row = sqlx::query(&format!("{} RETURNING {}", INSERT_SQL, SELECT_COLS))
            .bind(Uuid::new_v4())
            .bind(replacement.tenant_id)
            .bind(replacement.plan_id)
            .bind(&replacement.gateway_subscription_id)
            .bind(replacement.gateway_status)
            .bind(replacement.billing_cycle)
            .bind(replacement.trial_ends_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(row_to_subscription(row))
    }

    async fn list_expired_trials(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        self.list_live_where(
            "gateway_status = 'trialing' AND trial_ends_at <= $1",
            now,
            after,
            limit,
        )
        .await
    }

    async fn list_due_downgrades(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        self.list_live_where(
            "scheduled_plan_id IS NOT NULL AND scheduled_change_at <= $1",
            now,
            after,
            limit,
        )
        .await
    }

    async fn list_trials_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        self.list_live_between(
            "gateway_status = 'trialing' AND trial_ends_at >= $1 AND trial_ends_at < $2",
            from,
            to,
            after,
            limit,
        )
        .await
    }

    async fn list_downgrades_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        self.list_live_between(
            "scheduled_plan_id IS NOT NULL AND scheduled_change_at >= $1 AND scheduled_change_at < $2",
            from,
            to,
            after,
            limit,
        )
        .await
    }
}
