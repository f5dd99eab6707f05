use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::warn;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::settings::BillingSettings,
    domain::entities::{
        plan::{LimitValue, Plan, UNLIMITED},
        resource::{LimitViolation, Resource},
        subscription_state::classify,
        usage_record::period_of,
    },
};

use super::{
    plan_catalog::{PlanCatalog, PlanResolution},
    subscription::SubscriptionRepo,
    usage::{ResourceCounter, UsageRepo},
};

// ============================================================================
// Pure computations
// ============================================================================

/// Share of `limit` used by `count`, capped at 100. Unlimited is always 0.
pub fn usage_percentage(count: i64, limit: i64) -> f64 {
    if limit == UNLIMITED {
        return 0.0;
    }
    if limit <= 0 {
        return 100.0;
    }
    (count as f64 / limit as f64 * 100.0).min(100.0)
}

pub fn is_near_limit(percentage: f64, warning_threshold: f64) -> bool {
    percentage >= warning_threshold * 100.0 && percentage < 100.0
}

pub fn is_at_limit(percentage: f64) -> bool {
    percentage >= 100.0
}

/// Resources whose live count exceeds the target plan's limit.
pub fn check_downgrade(counts: &[(Resource, i64)], target: &Plan) -> Vec<LimitViolation> {
    counts
        .iter()
        .filter_map(|&(resource, current)| {
            let limit = target.limit(resource);
            (limit != UNLIMITED && current > limit).then_some(LimitViolation {
                resource,
                current,
                limit,
            })
        })
        .collect()
}

// ============================================================================
// Tenant plan resolution
// ============================================================================

/// Finds the plan that currently governs a tenant.
///
/// A subscription that grants access resolves to its plan; no subscription or an
/// ended one resolves to the free plan.
#[derive(Clone)]
pub struct TenantPlanResolver {
    subscriptions: Arc<dyn SubscriptionRepo>,
    catalog: PlanCatalog,
}

impl TenantPlanResolver {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepo>, catalog: PlanCatalog) -> Self {
        Self {
            subscriptions,
            catalog,
        }
    }

    pub async fn resolve(&self, tenant_id: Uuid) -> AppResult<PlanResolution> {
        let Some(sub) = self.subscriptions.current_for_tenant(tenant_id).await? else {
            return self.catalog.resolve_free().await;
        };
        match classify(&sub, Utc::now()) {
            Ok(state) if state.has_access() => self.catalog.resolve(sub.plan_id).await,
            Ok(_) => self.catalog.resolve_free().await,
            Err(e) => Ok(PlanResolution::Unresolvable(e.to_string())),
        }
    }
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub resource: Resource,
    pub current: i64,
    pub limit: LimitValue,
    pub percentage: f64,
    pub near_limit: bool,
    pub at_limit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    /// `None` when the governing plan could not be resolved.
    pub plan: Option<String>,
    pub period: String,
    pub resources: Vec<ResourceUsage>,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct UsageLimitService {
    resolver: TenantPlanResolver,
    usage_repo: Arc<dyn UsageRepo>,
    counter: Arc<dyn ResourceCounter>,
    settings: BillingSettings,
}

impl UsageLimitService {
    pub fn new(
        resolver: TenantPlanResolver,
        usage_repo: Arc<dyn UsageRepo>,
        counter: Arc<dyn ResourceCounter>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            resolver,
            usage_repo,
            counter,
            settings,
        }
    }

    pub fn warning_threshold(&self) -> f64 {
        self.settings.usage_warning_threshold
    }

    async fn governing_plan(&self, tenant_id: Uuid) -> AppResult<Option<Plan>> {
        match self.resolver.resolve(tenant_id).await? {
            PlanResolution::Resolved(plan) => Ok(Some(plan)),
            PlanResolution::Unresolvable(reason) => {
                warn!(
                    tenant_id = %tenant_id,
                    reason = %reason,
                    default_limit = self.settings.default_limit,
                    "Plan unresolvable, enforcing default limit"
                );
                Ok(None)
            }
        }
    }

    fn limit_on(&self, plan: Option<&Plan>, resource: Resource) -> i64 {
        plan.map_or(self.settings.default_limit, |p| p.limit(resource))
    }

    pub async fn limit_for(&self, tenant_id: Uuid, resource: Resource) -> AppResult<i64> {
        let plan = self.governing_plan(tenant_id).await?;
        Ok(self.limit_on(plan.as_ref(), resource))
    }

    async fn current_count(&self, tenant_id: Uuid, resource: Resource, limit: i64) -> AppResult<i64> {
        if resource.is_metered() {
            let record = self
                .usage_repo
                .get_or_create(tenant_id, &period_of(Utc::now()), limit)
                .await?;
            Ok(record.reservations_count)
        } else {
            self.counter.count_live(tenant_id, resource).await
        }
    }

    pub async fn can_create(&self, tenant_id: Uuid, resource: Resource) -> AppResult<bool> {
        let limit = self.limit_for(tenant_id, resource).await?;
        if limit == UNLIMITED {
            return Ok(true);
        }
        let current = self.current_count(tenant_id, resource, limit).await?;
        Ok(current < limit)
    }

    /// Gate for resource creation.
    pub async fn ensure_can_create(&self, tenant_id: Uuid, resource: Resource) -> AppResult<()> {
        let limit = self.limit_for(tenant_id, resource).await?;
        if limit == UNLIMITED {
            return Ok(());
        }
        let current = self.current_count(tenant_id, resource, limit).await?;
        if current < limit {
            Ok(())
        } else {
            Err(AppError::UsageLimitReached {
                resource,
                current,
                limit,
            })
        }
    }

    /// Live counts checked against `target` before a downgrade.
    pub async fn downgrade_violations(
        &self,
        tenant_id: Uuid,
        target: &Plan,
    ) -> AppResult<Vec<LimitViolation>> {
        let mut counts = Vec::with_capacity(Resource::downgrade_checked().len());
        for &resource in Resource::downgrade_checked() {
            counts.push((resource, self.counter.count_live(tenant_id, resource).await?));
        }
        Ok(check_downgrade(&counts, target))
    }

    pub async fn summary(&self, tenant_id: Uuid) -> AppResult<UsageSummary> {
        let plan = self.governing_plan(tenant_id).await?;
        let threshold = self.settings.usage_warning_threshold;

        let mut resources = Vec::new();
        for resource in Resource::iter() {
            let limit = self.limit_on(plan.as_ref(), resource);
            let current = self.current_count(tenant_id, resource, limit).await?;
            let percentage = usage_percentage(current, limit);
            resources.push(ResourceUsage {
                resource,
                current,
                limit: limit.into(),
                percentage,
                near_limit: is_near_limit(percentage, threshold),
                at_limit: is_at_limit(percentage),
            });
        }

        Ok(UsageSummary {
            plan: plan.map(|p| p.slug),
            period: period_of(Utc::now()),
            resources,
        })
    }
}
