use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::notifier::BillingNotifier,
    domain::entities::{
        billing_cycle::BillingCycle,
        notification::{BillingNotification, NotificationKind},
        plan::Plan,
        subscription::{GatewayStatus, Subscription},
        subscription_state::{SubscriptionAction, SubscriptionState, classify},
        tenant::Tenant,
    },
};

use super::{
    billing_adapter::BillingAdapter,
    plan_catalog::{PlanCatalog, PlanSummary},
    proration::{self, Proration},
    usage_limits::{UsageLimitService, UsageSummary},
};

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSubscriptionInput {
    #[validate(length(min = 1, max = 64))]
    pub plan: String,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpgradeInput {
    #[validate(length(min = 1, max = 64))]
    pub plan: String,
    /// Keeps the current cycle when absent.
    pub billing_cycle: Option<BillingCycle>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DowngradeInput {
    #[validate(length(min = 1, max = 64))]
    pub plan: String,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub gateway_subscription_id: String,
    pub gateway_status: GatewayStatus,
    pub billing_cycle: BillingCycle,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Repository traits
// ============================================================================

#[async_trait]
pub trait TenantRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Tenant>>;
    async fn get_by_gateway_customer_id(&self, customer_id: &str) -> AppResult<Option<Tenant>>;
    async fn set_gateway_customer_id(&self, id: Uuid, customer_id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;
    /// The tenant's most recently created subscription.
    async fn current_for_tenant(&self, tenant_id: Uuid) -> AppResult<Option<Subscription>>;
    async fn get_by_gateway_id(&self, gateway_subscription_id: &str)
    -> AppResult<Option<Subscription>>;
    async fn create(&self, input: &NewSubscription) -> AppResult<Subscription>;
    /// Persist every mutable field of `sub`.
    async fn update(&self, sub: &Subscription) -> AppResult<Subscription>;
    /// End `old_id` at `ended_at` and insert `replacement`, in one transaction.
    async fn supersede(
        &self,
        old_id: Uuid,
        ended_at: DateTime<Utc>,
        replacement: &NewSubscription,
    ) -> AppResult<Subscription>;

    // Reconciliation candidates. All exclude subscriptions with `ends_at` set
    // and are paged by ascending id.

    async fn list_expired_trials(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>>;

    async fn list_due_downgrades(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>>;

    async fn list_trials_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>>;

    async fn list_downgrades_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>>;
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: String,
    pub available_actions: &'static [SubscriptionAction],
    pub can_upgrade: bool,
    pub can_downgrade: bool,
    pub can_cancel: bool,
    pub can_resume: bool,
    pub has_access: bool,
}

impl StateView {
    pub fn new(state: &SubscriptionState, now: DateTime<Utc>) -> Self {
        Self {
            name: state.name(),
            display_name: state.display_name(),
            description: state.description(now),
            available_actions: state.available_actions(),
            can_upgrade: state.can_upgrade(),
            can_downgrade: state.can_downgrade(),
            can_cancel: state.can_cancel(),
            can_resume: state.can_resume(),
            has_access: state.has_access(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub subscription: Subscription,
    pub plan: PlanSummary,
    pub state: StateView,
    pub is_free: bool,
    pub scheduled_plan: Option<PlanSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProrationPreview {
    pub current_plan: String,
    pub target_plan: String,
    pub billing_cycle: BillingCycle,
    #[serde(flatten)]
    pub proration: Proration,
    /// The gateway computes the amount actually charged.
    pub advisory: bool,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct SubscriptionUseCases {
    subscriptions: Arc<dyn SubscriptionRepo>,
    tenants: Arc<dyn TenantRepo>,
    catalog: PlanCatalog,
    limits: UsageLimitService,
    billing: BillingAdapter,
    notifier: Arc<dyn BillingNotifier>,
}

struct Loaded {
    sub: Subscription,
    state: SubscriptionState,
    plan: Plan,
}

impl SubscriptionUseCases {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepo>,
        tenants: Arc<dyn TenantRepo>,
        catalog: PlanCatalog,
        limits: UsageLimitService,
        billing: BillingAdapter,
        notifier: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            subscriptions,
            tenants,
            catalog,
            limits,
            billing,
            notifier,
        }
    }

    async fn load(&self, tenant_id: Uuid) -> AppResult<Loaded> {
        let sub = self
            .subscriptions
            .current_for_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::BusinessRule("No subscription found".into()))?;
        let state = classify(&sub, Utc::now())?;
        let plan = self.catalog.get(sub.plan_id).await?.ok_or_else(|| {
            AppError::Configuration(format!("Plan {} of subscription {} is missing", sub.plan_id, sub.id))
        })?;
        Ok(Loaded { sub, state, plan })
    }

    async fn view(&self, sub: Subscription, plan: &Plan) -> AppResult<SubscriptionView> {
        let now = Utc::now();
        let state = classify(&sub, now)?;
        let scheduled_plan = match sub.scheduled_plan_id {
            Some(id) => self.catalog.get(id).await?.as_ref().map(PlanSummary::from),
            None => None,
        };
        Ok(SubscriptionView {
            is_free: sub.is_free(),
            state: StateView::new(&state, now),
            plan: plan.into(),
            scheduled_plan,
            subscription: sub,
        })
    }

    async fn notify(&self, tenant_id: Uuid, kind: NotificationKind, payload: serde_json::Value) {
        let notification = BillingNotification::new(tenant_id, kind, payload);
        if let Err(e) = self.notifier.dispatch(notification).await {
            warn!(tenant_id = %tenant_id, kind = %kind, error = %e, "Failed to dispatch notification");
        }
    }

    pub async fn show(&self, tenant_id: Uuid) -> AppResult<SubscriptionView> {
        let loaded = self
            .load(tenant_id)
            .await
            .map_err(|e| match e {
                AppError::BusinessRule(_) => AppError::NotFound,
                other => other,
            })?;
        self.view(loaded.sub, &loaded.plan).await
    }

    /// First plan selection, or a fresh start after the previous subscription ended.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        input: CreateSubscriptionInput,
    ) -> AppResult<SubscriptionView> {
        input
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        if let Some(current) = self.subscriptions.current_for_tenant(tenant_id).await?
            && !classify(&current, Utc::now())?.is_ended()
        {
            return Err(AppError::BusinessRule(
                "Tenant already has a subscription".into(),
            ));
        }
        self.tenants
            .get_by_id(tenant_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let plan = self.catalog.by_slug(&input.plan).await?;
        let cycle = input.billing_cycle;

        let new_sub = if self.catalog.is_free(&plan) {
            NewSubscription {
                tenant_id,
                plan_id: plan.id,
                gateway_subscription_id: Subscription::free_gateway_id(),
                gateway_status: GatewayStatus::Active,
                billing_cycle: cycle,
                trial_ends_at: None,
            }
        } else {
            let price_id = self.billing.resolve_price_id(&plan, cycle)?;
            let with_trial = plan.trial_days > 0;
            let remote = self
                .billing
                .create_paid_from_free(tenant_id, &plan, &price_id, with_trial)
                .await?;
            NewSubscription {
                tenant_id,
                plan_id: plan.id,
                gateway_subscription_id: remote.id.0,
                gateway_status: remote.status,
                billing_cycle: cycle,
                trial_ends_at: remote.trial_end,
            }
        };

        let sub = self.subscriptions.create(&new_sub).await?;
        info!(tenant_id = %tenant_id, plan = %plan.slug, cycle = %cycle, "Subscription created");

        if let Some(trial_ends_at) = sub.trial_ends_at {
            self.notify(
                tenant_id,
                NotificationKind::TrialStarted,
                serde_json::json!({ "plan": plan.slug, "trial_ends_at": trial_ends_at }),
            )
            .await;
        }
        self.view(sub, &plan).await
    }

    /// Move to a higher plan. The gateway prorates at the next renewal unless
    /// `immediate`, in which case the difference is invoiced right away.
    pub async fn upgrade(
        &self,
        tenant_id: Uuid,
        input: UpgradeInput,
        immediate: bool,
    ) -> AppResult<SubscriptionView> {
        input
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let Loaded { sub, state, plan } = self.load(tenant_id).await?;
        if !state.can_upgrade() {
            return Err(AppError::BusinessRule(format!(
                "Cannot upgrade a subscription that is {}",
                state.display_name().to_lowercase()
            )));
        }

        let target = self.catalog.by_slug(&input.plan).await?;
        if !target.is_upgrade_from(&plan) {
            return Err(AppError::BusinessRule(format!(
                "{} is not an upgrade from {}",
                target.name, plan.name
            )));
        }
        let cycle = input.billing_cycle.unwrap_or(sub.billing_cycle);
        let price_id = self.billing.resolve_price_id(&target, cycle)?;

        let mut updated = sub.clone();
        if self.billing.is_free_subscription(&sub) {
            let remote = self
                .billing
                .create_paid_from_free(tenant_id, &target, &price_id, false)
                .await?;
            updated.gateway_subscription_id = remote.id.0;
            updated.gateway_status = remote.status;
            updated.trial_ends_at = remote.trial_end;
        } else {
            let remote = if immediate {
                self.billing.swap_and_invoice(&sub, &price_id).await?
            } else {
                self.billing.swap(&sub, &price_id).await?
            };
            updated.gateway_status = remote.status;
        }
        updated.plan_id = target.id;
        updated.billing_cycle = cycle;
        updated.clear_scheduled_change();

        let saved = self.subscriptions.update(&updated).await?;
        info!(
            tenant_id = %tenant_id,
            from = %plan.slug,
            to = %target.slug,
            immediate,
            "Subscription upgraded"
        );
        self.notify(
            tenant_id,
            NotificationKind::SubscriptionUpgraded,
            serde_json::json!({
                "from_plan": plan.slug,
                "to_plan": target.slug,
                "billing_cycle": cycle,
                "immediate": immediate,
            }),
        )
        .await;
        self.view(saved, &target).await
    }

    /// Queue a move to a lower plan for the end of the current period.
    pub async fn downgrade(
        &self,
        tenant_id: Uuid,
        input: DowngradeInput,
    ) -> AppResult<SubscriptionView> {
        input
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let Loaded { sub, state, plan } = self.load(tenant_id).await?;
        if !state.can_downgrade() {
            return Err(AppError::BusinessRule(format!(
                "Cannot downgrade a subscription that is {}",
                state.display_name().to_lowercase()
            )));
        }

        let target = self.catalog.by_slug(&input.plan).await?;
        if !target.is_downgrade_from(&plan) {
            return Err(AppError::BusinessRule(format!(
                "{} is not a downgrade from {}",
                target.name, plan.name
            )));
        }

        let violations = self.limits.downgrade_violations(tenant_id, &target).await?;
        if !violations.is_empty() {
            return Err(AppError::DowngradeBlocked { violations });
        }
        if !self.catalog.is_free(&target) {
            self.billing.resolve_price_id(&target, sub.billing_cycle)?;
        }

        let change_at = self
            .billing
            .current_period_end(&sub)
            .await?
            .unwrap_or_else(Utc::now);

        let mut updated = sub.clone();
        updated.scheduled_plan_id = Some(target.id);
        updated.scheduled_change_at = Some(change_at);
        let saved = self.subscriptions.update(&updated).await?;

        info!(
            tenant_id = %tenant_id,
            from = %plan.slug,
            to = %target.slug,
            change_at = %change_at,
            "Downgrade scheduled"
        );
        self.notify(
            tenant_id,
            NotificationKind::DowngradeScheduled,
            serde_json::json!({
                "from_plan": plan.slug,
                "to_plan": target.slug,
                "effective_at": change_at,
            }),
        )
        .await;
        self.view(saved, &plan).await
    }

    pub async fn cancel_scheduled_downgrade(&self, tenant_id: Uuid) -> AppResult<SubscriptionView> {
        let Loaded { sub, plan, .. } = self.load(tenant_id).await?;
        if !sub.has_scheduled_change() {
            return Err(AppError::BusinessRule("No downgrade is scheduled".into()));
        }
        let mut updated = sub;
        updated.clear_scheduled_change();
        let saved = self.subscriptions.update(&updated).await?;
        info!(tenant_id = %tenant_id, "Scheduled downgrade canceled");
        self.view(saved, &plan).await
    }

    /// Cancel at the end of the current period; access continues until then.
    pub async fn cancel(&self, tenant_id: Uuid) -> AppResult<SubscriptionView> {
        let Loaded { sub, state, plan } = self.load(tenant_id).await?;
        if !state.can_cancel() {
            return Err(AppError::BusinessRule(
                "Subscription cannot be canceled in its current state".into(),
            ));
        }
        if self.billing.is_free_subscription(&sub) {
            return Err(AppError::BusinessRule(
                "The free plan cannot be canceled".into(),
            ));
        }

        let remote = self.billing.cancel_at_period_end(&sub).await?;
        let ends_at = remote
            .and_then(|r| r.current_period_end.or(r.ended_at))
            .or(sub.trial_ends_at)
            .unwrap_or_else(Utc::now);

        let mut updated = sub;
        updated.ends_at = Some(ends_at);
        updated.clear_scheduled_change();
        let saved = self.subscriptions.update(&updated).await?;

        info!(tenant_id = %tenant_id, plan = %plan.slug, ends_at = %ends_at, "Subscription canceled");
        self.notify(
            tenant_id,
            NotificationKind::SubscriptionCanceled,
            serde_json::json!({ "plan": plan.slug, "ends_at": ends_at }),
        )
        .await;
        self.view(saved, &plan).await
    }

    /// Undo a cancellation while its grace period lasts.
    pub async fn resume(&self, tenant_id: Uuid) -> AppResult<SubscriptionView> {
        let Loaded { sub, state, plan } = self.load(tenant_id).await?;
        if !state.can_resume() {
            return Err(AppError::BusinessRule(
                "Subscription is not within its grace period".into(),
            ));
        }
        if !self.billing.resume_if_on_grace_period(&sub).await? {
            return Err(AppError::BusinessRule(
                "Gateway subscription is not within its grace period".into(),
            ));
        }

        let mut updated = sub;
        updated.ends_at = None;
        let saved = self.subscriptions.update(&updated).await?;

        info!(tenant_id = %tenant_id, plan = %plan.slug, "Subscription resumed");
        self.notify(
            tenant_id,
            NotificationKind::SubscriptionResumed,
            serde_json::json!({ "plan": plan.slug }),
        )
        .await;
        self.view(saved, &plan).await
    }

    pub async fn usage(&self, tenant_id: Uuid) -> AppResult<UsageSummary> {
        self.limits.summary(tenant_id).await
    }

    pub async fn proration_preview(
        &self,
        tenant_id: Uuid,
        plan_slug: &str,
        cycle: Option<BillingCycle>,
    ) -> AppResult<ProrationPreview> {
        let Loaded { sub, plan, .. } = self.load(tenant_id).await?;
        let target = self.catalog.by_slug(plan_slug).await?;
        let cycle = cycle.unwrap_or(sub.billing_cycle);
        let period_end = self.billing.current_period_end(&sub).await?;

        Ok(ProrationPreview {
            current_plan: plan.slug.clone(),
            target_plan: target.slug.clone(),
            billing_cycle: cycle,
            proration: proration::calculate(
                (&plan, sub.billing_cycle),
                (&target, cycle),
                period_end,
                Utc::now(),
            ),
            advisory: true,
        })
    }

    /// End `sub` and replace it with a fresh free-plan subscription.
    ///
    /// With `cancel_remote` the gateway subscription is canceled first; the
    /// local rows change only after that succeeds.
    pub async fn downgrade_to_free(
        &self,
        sub: &Subscription,
        cancel_remote: bool,
    ) -> AppResult<Subscription> {
        let free = self.catalog.free_plan().await?;
        if cancel_remote {
            self.billing.cancel_now(sub).await?;
        }

        let replacement = NewSubscription {
            tenant_id: sub.tenant_id,
            plan_id: free.id,
            gateway_subscription_id: Subscription::free_gateway_id(),
            gateway_status: GatewayStatus::Active,
            billing_cycle: sub.billing_cycle,
            trial_ends_at: None,
        };
        let fresh = self
            .subscriptions
            .supersede(sub.id, Utc::now(), &replacement)
            .await?;
        info!(
            tenant_id = %sub.tenant_id,
            previous = %sub.id,
            replacement = %fresh.id,
            "Subscription moved to free plan"
        );
        Ok(fresh)
    }
}
