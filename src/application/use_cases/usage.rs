use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::notifier::BillingNotifier,
    domain::entities::{
        notification::{BillingNotification, NotificationKind},
        resource::Resource,
        usage_record::{UsageRecord, period_bounds, period_of},
    },
};

use super::usage_limits::{UsageLimitService, is_at_limit, is_near_limit, usage_percentage};

/// Per-period usage counters.
///
/// Mutations lock the `(tenant, period)` row, create it lazily with
/// `limit_snapshot`, and return the row as it stands after the update.
#[async_trait]
pub trait UsageRepo: Send + Sync {
    async fn get_or_create(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord>;

    async fn increment(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord>;

    /// Floors at zero.
    async fn decrement(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord>;

    /// Replace the counter with the reservations created in `[from, to)`,
    /// counted while the row is locked.
    async fn recount(
        &self,
        tenant_id: Uuid,
        period: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit_snapshot: i64,
    ) -> AppResult<Recount>;

    /// Rows of `period` with id greater than `after`, ordered by id.
    async fn list_for_period(
        &self,
        period: &str,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<UsageRecord>>;
}

#[derive(Debug, Clone)]
pub struct Recount {
    /// Counter value before the recount.
    pub previous: i64,
    pub record: UsageRecord,
}

/// Read access to the tenant's own resource tables.
#[async_trait]
pub trait ResourceCounter: Send + Sync {
    /// Rows currently existing for a non-metered resource.
    async fn count_live(&self, tenant_id: Uuid, resource: Resource) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct UsageMeter {
    usage_repo: Arc<dyn UsageRepo>,
    limits: UsageLimitService,
    notifier: Arc<dyn BillingNotifier>,
}

impl UsageMeter {
    pub fn new(
        usage_repo: Arc<dyn UsageRepo>,
        limits: UsageLimitService,
        notifier: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            usage_repo,
            limits,
            notifier,
        }
    }

    fn require_metered(resource: Resource) -> AppResult<()> {
        if resource.is_metered() {
            Ok(())
        } else {
            Err(AppError::InvalidInput(format!(
                "{} is counted live, not metered",
                resource
            )))
        }
    }

    pub async fn current(&self, tenant_id: Uuid) -> AppResult<UsageRecord> {
        let limit = self
            .limits
            .limit_for(tenant_id, Resource::Reservations)
            .await?;
        self.usage_repo
            .get_or_create(tenant_id, &period_of(Utc::now()), limit)
            .await
    }

    pub async fn increment(&self, tenant_id: Uuid, resource: Resource) -> AppResult<UsageRecord> {
        Self::require_metered(resource)?;
        let limit = self.limits.limit_for(tenant_id, resource).await?;
        let record = self
            .usage_repo
            .increment(tenant_id, &period_of(Utc::now()), limit)
            .await?;
        self.notify_thresholds(tenant_id, resource, record.reservations_count, limit)
            .await;
        Ok(record)
    }

    pub async fn decrement(&self, tenant_id: Uuid, resource: Resource) -> AppResult<UsageRecord> {
        Self::require_metered(resource)?;
        let limit = self.limits.limit_for(tenant_id, resource).await?;
        self.usage_repo
            .decrement(tenant_id, &period_of(Utc::now()), limit)
            .await
    }

    /// Count a new reservation, refusing it once the plan limit is reached.
    pub async fn reserve(&self, tenant_id: Uuid) -> AppResult<UsageRecord> {
        self.limits
            .ensure_can_create(tenant_id, Resource::Reservations)
            .await?;
        self.increment(tenant_id, Resource::Reservations).await
    }

    /// Give back a reservation that was canceled in the current period.
    pub async fn release(&self, tenant_id: Uuid) -> AppResult<UsageRecord> {
        self.decrement(tenant_id, Resource::Reservations).await
    }

    /// Rebuild a period's counter from the reservations table.
    pub async fn recalculate(&self, tenant_id: Uuid, period: &str) -> AppResult<UsageRecord> {
        let (from, to) = period_bounds(period)
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid period '{}'", period)))?;
        let limit = self
            .limits
            .limit_for(tenant_id, Resource::Reservations)
            .await?;

        let Recount { previous, record } = self
            .usage_repo
            .recount(tenant_id, period, from, to, limit)
            .await?;

        if previous != record.reservations_count {
            info!(
                tenant_id = %tenant_id,
                period,
                stored = previous,
                actual = record.reservations_count,
                "Repaired usage counter drift"
            );
        }
        Ok(record)
    }

    /// Announce the first crossing into the warning band and into the limit.
    async fn notify_thresholds(&self, tenant_id: Uuid, resource: Resource, count: i64, limit: i64) {
        let threshold = self.limits.warning_threshold();
        let before = usage_percentage(count - 1, limit);
        let after = usage_percentage(count, limit);

        let kind = if is_at_limit(after) && !is_at_limit(before) {
            NotificationKind::UsageLimitReached
        } else if is_near_limit(after, threshold) && !is_near_limit(before, threshold) {
            NotificationKind::UsageWarning
        } else {
            return;
        };

        let payload = serde_json::json!({
            "resource": resource,
            "current": count,
            "limit": limit,
            "percentage": after,
        });
        if let Err(e) = self
            .notifier
            .dispatch(BillingNotification::new(tenant_id, kind, payload))
            .await
        {
            warn!(tenant_id = %tenant_id, error = %e, "Failed to dispatch usage notification");
        }
    }
}
