use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::{
        helpers::batch::{BatchReport, ItemOutcome, Keyed, process_in_batches},
        ports::notifier::BillingNotifier,
        settings::BillingSettings,
    },
    domain::entities::{
        notification::{BillingNotification, NotificationKind},
        payment_method::{PaymentMethod, PaymentMethodKind},
        subscription::{GatewayStatus, Subscription},
        subscription_state::days_until,
        usage_record::{UsageRecord, period_of},
    },
};

use super::{
    billing_adapter::BillingAdapter,
    payment_methods::PaymentMethodRepo,
    plan_catalog::PlanCatalog,
    subscription::{SubscriptionRepo, SubscriptionUseCases, TenantRepo},
    usage::{UsageMeter, UsageRepo},
};

impl Keyed for Subscription {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Keyed for PaymentMethod {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Keyed for UsageRecord {
    fn key(&self) -> Uuid {
        self.id
    }
}

/// Scheduled passes run by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    ExpireTrials,
    ApplyScheduledDowngrades,
    RemindTrialsEnding,
    RemindScheduledDowngrades,
    RemindExpiringCards,
    RecalculateUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFailureOutcome {
    Notified,
    DowngradedToFree,
    Skipped,
}

#[derive(Clone)]
pub struct ReconciliationJobs {
    subscriptions: Arc<dyn SubscriptionRepo>,
    tenants: Arc<dyn TenantRepo>,
    payment_methods: Arc<dyn PaymentMethodRepo>,
    usage: Arc<dyn UsageRepo>,
    catalog: PlanCatalog,
    billing: BillingAdapter,
    lifecycle: SubscriptionUseCases,
    meter: UsageMeter,
    notifier: Arc<dyn BillingNotifier>,
    settings: BillingSettings,
}

impl ReconciliationJobs {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepo>,
        tenants: Arc<dyn TenantRepo>,
        payment_methods: Arc<dyn PaymentMethodRepo>,
        usage: Arc<dyn UsageRepo>,
        catalog: PlanCatalog,
        billing: BillingAdapter,
        lifecycle: SubscriptionUseCases,
        meter: UsageMeter,
        notifier: Arc<dyn BillingNotifier>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            subscriptions,
            tenants,
            payment_methods,
            usage,
            catalog,
            billing,
            lifecycle,
            meter,
            notifier,
            settings,
        }
    }

    pub async fn run(&self, kind: JobKind, now: DateTime<Utc>) -> BatchReport {
        match kind {
            JobKind::ExpireTrials => self.expire_trials(now).await,
            JobKind::ApplyScheduledDowngrades => self.apply_scheduled_downgrades(now).await,
            JobKind::RemindTrialsEnding => self.remind_trials_ending(now).await,
            JobKind::RemindScheduledDowngrades => self.remind_scheduled_downgrades(now).await,
            JobKind::RemindExpiringCards => self.remind_expiring_cards(now.date_naive()).await,
            JobKind::RecalculateUsage => self.recalculate_usage(now).await,
        }
    }

    async fn notify(&self, tenant_id: Uuid, kind: NotificationKind, payload: serde_json::Value) {
        let notification = BillingNotification::new(tenant_id, kind, payload);
        if let Err(e) = self.notifier.dispatch(notification).await {
            warn!(tenant_id = %tenant_id, kind = %kind, error = %e, "Failed to dispatch notification");
        }
    }

    async fn tenant_exists(&self, tenant_id: Uuid) -> AppResult<bool> {
        Ok(self.tenants.get_by_id(tenant_id).await?.is_some())
    }

    // ------------------------------------------------------------------------
    // Trial expiry
    // ------------------------------------------------------------------------

    /// Convert or end every trial whose end has passed.
    pub async fn expire_trials(&self, now: DateTime<Utc>) -> BatchReport {
        process_in_batches(
            JobKind::ExpireTrials.as_ref(),
            self.settings.job_chunk_size,
            move |after, limit| self.subscriptions.list_expired_trials(now, after, limit),
            move |sub| Box::pin(self.expire_trial(sub)),
        )
        .await
    }

    async fn expire_trial(&self, sub: Subscription) -> AppResult<ItemOutcome> {
        if !self.tenant_exists(sub.tenant_id).await? {
            return Ok(ItemOutcome::Skipped("tenant missing".into()));
        }
        let Some(plan) = self.catalog.get(sub.plan_id).await? else {
            return Ok(ItemOutcome::Skipped("plan missing".into()));
        };

        let converted = self
            .payment_methods
            .get_default(sub.tenant_id)
            .await?
            .is_some();
        if converted {
            let mut updated = sub.clone();
            updated.gateway_status = GatewayStatus::Active;
            self.subscriptions.update(&updated).await?;
        } else {
            self.lifecycle.downgrade_to_free(&sub, true).await?;
        }

        info!(tenant_id = %sub.tenant_id, plan = %plan.slug, converted, "Trial expired");
        self.notify(
            sub.tenant_id,
            NotificationKind::TrialEnded,
            serde_json::json!({ "plan": plan.slug, "converted": converted }),
        )
        .await;
        Ok(ItemOutcome::Processed)
    }

    // ------------------------------------------------------------------------
    // Scheduled downgrades
    // ------------------------------------------------------------------------

    pub async fn apply_scheduled_downgrades(&self, now: DateTime<Utc>) -> BatchReport {
        process_in_batches(
            JobKind::ApplyScheduledDowngrades.as_ref(),
            self.settings.job_chunk_size,
            move |after, limit| self.subscriptions.list_due_downgrades(now, after, limit),
            move |sub| Box::pin(self.apply_scheduled_downgrade(sub)),
        )
        .await
    }

    async fn apply_scheduled_downgrade(&self, sub: Subscription) -> AppResult<ItemOutcome> {
        if !self.tenant_exists(sub.tenant_id).await? {
            return Ok(ItemOutcome::Skipped("tenant missing".into()));
        }
        let Some(target_id) = sub.scheduled_plan_id else {
            return Ok(ItemOutcome::Skipped("no scheduled plan".into()));
        };
        let Some(target) = self.catalog.get(target_id).await? else {
            return Ok(ItemOutcome::Skipped("scheduled plan missing".into()));
        };
        let from = self
            .catalog
            .get(sub.plan_id)
            .await?
            .map(|p| p.slug)
            .unwrap_or_default();

        if self.catalog.is_free(&target) {
            self.lifecycle.downgrade_to_free(&sub, true).await?;
        } else {
            let price_id = self.billing.resolve_price_id(&target, sub.billing_cycle)?;
            let remote = self.billing.swap(&sub, &price_id).await?;
            let mut updated = sub.clone();
            updated.plan_id = target.id;
            updated.gateway_status = remote.status;
            updated.clear_scheduled_change();
            self.subscriptions.update(&updated).await?;
        }

        info!(tenant_id = %sub.tenant_id, from = %from, to = %target.slug, "Scheduled downgrade applied");
        self.notify(
            sub.tenant_id,
            NotificationKind::SubscriptionDowngraded,
            serde_json::json!({ "from_plan": from, "to_plan": target.slug }),
        )
        .await;
        Ok(ItemOutcome::Processed)
    }

    // ------------------------------------------------------------------------
    // Payment failures
    // ------------------------------------------------------------------------

    /// Notify about a failed charge; after the final attempt the tenant
    /// falls back to the free plan.
    pub async fn handle_payment_failure(
        &self,
        tenant_id: Uuid,
        attempt_count: i32,
    ) -> AppResult<PaymentFailureOutcome> {
        if !self.tenant_exists(tenant_id).await? {
            warn!(tenant_id = %tenant_id, "Payment failure for unknown tenant");
            return Ok(PaymentFailureOutcome::Skipped);
        }
        let max_attempts = self.settings.max_payment_attempts;
        self.notify(
            tenant_id,
            NotificationKind::PaymentFailed,
            serde_json::json!({ "attempt": attempt_count, "max_attempts": max_attempts }),
        )
        .await;

        if attempt_count < max_attempts {
            return Ok(PaymentFailureOutcome::Notified);
        }
        let Some(sub) = self.subscriptions.current_for_tenant(tenant_id).await? else {
            return Ok(PaymentFailureOutcome::Notified);
        };
        if sub.is_free() {
            return Ok(PaymentFailureOutcome::Notified);
        }

        self.lifecycle.downgrade_to_free(&sub, true).await?;
        warn!(
            tenant_id = %tenant_id,
            attempts = attempt_count,
            "Payment attempts exhausted, moved to free plan"
        );
        self.notify(
            tenant_id,
            NotificationKind::SubscriptionDowngraded,
            serde_json::json!({
                "to_plan": self.catalog.free_plan_slug(),
                "reason": "payment_failed",
            }),
        )
        .await;
        Ok(PaymentFailureOutcome::DowngradedToFree)
    }

    // ------------------------------------------------------------------------
    // Reminders
    // ------------------------------------------------------------------------

    /// Window covering one daily run, ending `days` ahead of `now`.
    fn reminder_window(now: DateTime<Utc>, days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let to = now + Duration::days(days);
        (to - Duration::days(1), to)
    }

    pub async fn remind_trials_ending(&self, now: DateTime<Utc>) -> BatchReport {
        let (from, to) = Self::reminder_window(now, self.settings.trial_reminder_days);
        process_in_batches(
            JobKind::RemindTrialsEnding.as_ref(),
            self.settings.job_chunk_size,
            move |after, limit| {
                self.subscriptions
                    .list_trials_ending_between(from, to, after, limit)
            },
            move |sub| Box::pin(self.remind_trial_ending(sub, now)),
        )
        .await
    }

    async fn remind_trial_ending(&self, sub: Subscription, now: DateTime<Utc>) -> AppResult<ItemOutcome> {
        if !self.tenant_exists(sub.tenant_id).await? {
            return Ok(ItemOutcome::Skipped("tenant missing".into()));
        }
        let Some(trial_ends_at) = sub.trial_ends_at else {
            return Ok(ItemOutcome::Skipped("no trial end".into()));
        };
        let plan = self.catalog.get(sub.plan_id).await?.map(|p| p.slug);
        self.notify(
            sub.tenant_id,
            NotificationKind::TrialEnding,
            serde_json::json!({
                "plan": plan,
                "trial_ends_at": trial_ends_at,
                "days_left": days_until(trial_ends_at, now),
            }),
        )
        .await;
        Ok(ItemOutcome::Processed)
    }

    pub async fn remind_scheduled_downgrades(&self, now: DateTime<Utc>) -> BatchReport {
        let (from, to) = Self::reminder_window(now, self.settings.downgrade_reminder_days);
        process_in_batches(
            JobKind::RemindScheduledDowngrades.as_ref(),
            self.settings.job_chunk_size,
            move |after, limit| self.subscriptions.list_downgrades_between(from, to, after, limit),
            move |sub| Box::pin(self.remind_scheduled_downgrade(sub, now)),
        )
        .await
    }

    async fn remind_scheduled_downgrade(
        &self,
        sub: Subscription,
        now: DateTime<Utc>,
    ) -> AppResult<ItemOutcome> {
        if !self.tenant_exists(sub.tenant_id).await? {
            return Ok(ItemOutcome::Skipped("tenant missing".into()));
        }
        let (Some(target_id), Some(change_at)) = (sub.scheduled_plan_id, sub.scheduled_change_at)
        else {
            return Ok(ItemOutcome::Skipped("no scheduled change".into()));
        };
        let Some(target) = self.catalog.get(target_id).await? else {
            return Ok(ItemOutcome::Skipped("scheduled plan missing".into()));
        };
        self.notify(
            sub.tenant_id,
            NotificationKind::DowngradeReminder,
            serde_json::json!({
                "to_plan": target.slug,
                "effective_at": change_at,
                "days_left": days_until(change_at, now),
            }),
        )
        .await;
        Ok(ItemOutcome::Processed)
    }

    /// Remind owners whose card stops working exactly `card_expiry_reminder_days` from `today`.
    pub async fn remind_expiring_cards(&self, today: NaiveDate) -> BatchReport {
        let days = self.settings.card_expiry_reminder_days;
        let from = first_of_month(today);
        let to = first_of_month(today + Duration::days(days));
        process_in_batches(
            JobKind::RemindExpiringCards.as_ref(),
            self.settings.job_chunk_size,
            move |after, limit| {
                self.payment_methods
                    .list_cards_expiring(from, to, after, limit)
            },
            move |method| Box::pin(self.remind_expiring_card(method, today, days)),
        )
        .await
    }

    async fn remind_expiring_card(
        &self,
        method: PaymentMethod,
        today: NaiveDate,
        days: i64,
    ) -> AppResult<ItemOutcome> {
        if method.kind != PaymentMethodKind::Card {
            return Ok(ItemOutcome::Skipped("not a card".into()));
        }
        if method.days_until_expiry(today) != Some(days) {
            return Ok(ItemOutcome::Skipped("outside reminder day".into()));
        }
        if !self.tenant_exists(method.tenant_id).await? {
            return Ok(ItemOutcome::Skipped("tenant missing".into()));
        }
        self.notify(
            method.tenant_id,
            NotificationKind::CardExpiring,
            serde_json::json!({
                "brand": method.brand,
                "last4": method.last4,
                "expires_on": method.expires_on(),
                "is_default": method.is_default,
            }),
        )
        .await;
        Ok(ItemOutcome::Processed)
    }

    // ------------------------------------------------------------------------
    // Usage counters
    // ------------------------------------------------------------------------

    /// Rebuild every counter of the period containing `now` from the
    /// reservations table.
    pub async fn recalculate_usage(&self, now: DateTime<Utc>) -> BatchReport {
        let period = period_of(now);
        let period = period.as_str();
        process_in_batches(
            JobKind::RecalculateUsage.as_ref(),
            self.settings.job_chunk_size,
            move |after, limit| self.usage.list_for_period(period, after, limit),
            move |record| Box::pin(self.recalculate_record(record)),
        )
        .await
    }

    async fn recalculate_record(&self, record: UsageRecord) -> AppResult<ItemOutcome> {
        if !self.tenant_exists(record.tenant_id).await? {
            return Ok(ItemOutcome::Skipped("tenant missing".into()));
        }
        self.meter
            .recalculate(record.tenant_id, &record.period)
            .await?;
        Ok(ItemOutcome::Processed)
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
