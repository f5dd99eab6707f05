use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        feature::FEATURES,
        plan::{FeatureValue, LimitValue, Plan},
        resource::Resource,
    },
};

#[async_trait]
pub trait PlanRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>>;
    async fn get_by_slug(&self, slug: &str) -> AppResult<Option<Plan>>;
    /// Active plans ordered by `sort_order`.
    async fn list_active(&self) -> AppResult<Vec<Plan>>;
}

/// Outcome of looking up the plan that governs a tenant.
#[derive(Debug, Clone)]
pub enum PlanResolution {
    Resolved(Plan),
    Unresolvable(String),
}

// ============================================================================
// Public views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub monthly_price: Decimal,
    pub yearly_price: Decimal,
    pub currency: String,
    pub trial_days: i32,
    pub sort_order: i32,
}

impl From<&Plan> for PlanSummary {
    fn from(plan: &Plan) -> Self {
        Self {
            slug: plan.slug.clone(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            monthly_price: plan.monthly_price,
            yearly_price: plan.yearly_price,
            currency: plan.currency.clone(),
            trial_days: plan.trial_days,
            sort_order: plan.sort_order,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub summary: PlanSummary,
    pub yearly_discount_percent: i64,
    pub features: BTreeMap<String, FeatureValue>,
    pub limits: BTreeMap<Resource, LimitValue>,
}

impl From<&Plan> for PlanDetail {
    fn from(plan: &Plan) -> Self {
        Self {
            summary: plan.into(),
            yearly_discount_percent: plan.yearly_discount_percent(),
            features: plan.features.clone(),
            limits: Resource::iter()
                .map(|r| (r, LimitValue::from(plan.limit(r))))
                .collect(),
        }
    }
}

/// One row of the comparison matrix: the feature's value on each plan, in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub key: String,
    pub name: String,
    pub values: Vec<Option<FeatureValue>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanComparison {
    pub plans: Vec<PlanSummary>,
    pub features: Vec<ComparisonRow>,
    pub limits: BTreeMap<Resource, Vec<LimitValue>>,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct PlanCatalog {
    plan_repo: Arc<dyn PlanRepo>,
    free_plan_slug: String,
}

impl PlanCatalog {
    pub fn new(plan_repo: Arc<dyn PlanRepo>, free_plan_slug: impl Into<String>) -> Self {
        Self {
            plan_repo,
            free_plan_slug: free_plan_slug.into(),
        }
    }

    pub fn free_plan_slug(&self) -> &str {
        &self.free_plan_slug
    }

    pub fn is_free(&self, plan: &Plan) -> bool {
        plan.slug == self.free_plan_slug
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Option<Plan>> {
        self.plan_repo.get_by_id(id).await
    }

    /// Active plan by slug, for plan-change requests.
    pub async fn by_slug(&self, slug: &str) -> AppResult<Plan> {
        self.plan_repo
            .get_by_slug(slug)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::InvalidInput(format!("Plan '{}' not found", slug)))
    }

    pub async fn free_plan(&self) -> AppResult<Plan> {
        self.plan_repo
            .get_by_slug(&self.free_plan_slug)
            .await?
            .ok_or_else(|| AppError::FreePlanMissing(self.free_plan_slug.clone()))
    }

    /// Look a plan up by id without failing on a dangling reference.
    pub async fn resolve(&self, plan_id: Uuid) -> AppResult<PlanResolution> {
        Ok(match self.plan_repo.get_by_id(plan_id).await? {
            Some(plan) => PlanResolution::Resolved(plan),
            None => PlanResolution::Unresolvable(format!("plan {} not in catalog", plan_id)),
        })
    }

    /// Resolve the free plan without failing when it is missing.
    pub async fn resolve_free(&self) -> AppResult<PlanResolution> {
        Ok(match self.plan_repo.get_by_slug(&self.free_plan_slug).await? {
            Some(plan) => PlanResolution::Resolved(plan),
            None => PlanResolution::Unresolvable(format!(
                "free plan '{}' not in catalog",
                self.free_plan_slug
            )),
        })
    }

    pub async fn list_public(&self) -> AppResult<Vec<PlanSummary>> {
        Ok(self
            .public_plans()
            .await?
            .iter()
            .map(PlanSummary::from)
            .collect())
    }

    pub async fn detail(&self, slug: &str) -> AppResult<PlanDetail> {
        let plan = self
            .plan_repo
            .get_by_slug(slug)
            .await?
            .filter(|p| p.is_active && p.is_public)
            .ok_or(AppError::NotFound)?;
        Ok(PlanDetail::from(&plan))
    }

    /// Feature and limit matrix across all public plans.
    pub async fn compare(&self) -> AppResult<PlanComparison> {
        let plans = self.public_plans().await?;

        let features = FEATURES
            .iter()
            .map(|f| ComparisonRow {
                key: f.key.to_string(),
                name: f.name.to_string(),
                values: plans.iter().map(|p| p.feature(f.key).cloned()).collect(),
            })
            .collect();

        let limits = Resource::iter()
            .map(|r| {
                (
                    r,
                    plans.iter().map(|p| LimitValue::from(p.limit(r))).collect(),
                )
            })
            .collect();

        Ok(PlanComparison {
            plans: plans.iter().map(PlanSummary::from).collect(),
            features,
            limits,
        })
    }

    async fn public_plans(&self) -> AppResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .plan_repo
            .list_active()
            .await?
            .into_iter()
            .filter(|p| p.is_public)
            .collect();
        plans.sort_by_key(|p| p.sort_order);
        Ok(plans)
    }
}
