use std::collections::BTreeMap;

use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::warn;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        feature::{FEATURES, FeatureCategory, FeatureDefinition, find_feature},
        plan::{FeatureValue, Plan, UNLIMITED},
        resource::Resource,
    },
};

use super::{plan_catalog::PlanResolution, usage_limits::TenantPlanResolver};

#[derive(Debug, Clone, Serialize)]
pub struct FeatureStatus {
    pub key: &'static str,
    pub name: &'static str,
    pub category: FeatureCategory,
    pub enabled: bool,
    pub value: Option<FeatureValue>,
    pub required_plan: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureChange {
    pub key: String,
    pub from: FeatureValue,
    pub to: FeatureValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitChange {
    pub resource: Resource,
    pub from: i64,
    pub to: i64,
}

/// What changes when moving from one plan to another.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanDiff {
    pub added_features: Vec<String>,
    pub removed_features: Vec<String>,
    pub changed_features: Vec<FeatureChange>,
    pub improved_limits: Vec<LimitChange>,
    pub reduced_limits: Vec<LimitChange>,
}

/// Target limit is better: unlimited, or larger without giving up unlimited.
pub fn is_limit_improved(from: i64, to: i64) -> bool {
    if from == to {
        return false;
    }
    to == UNLIMITED || (from != UNLIMITED && to > from)
}

pub fn diff_plans(from: &Plan, to: &Plan) -> PlanDiff {
    let mut diff = PlanDiff::default();

    for feature in FEATURES {
        let before = from.feature(feature.key);
        let after = to.feature(feature.key);
        let was = before.is_some_and(FeatureValue::is_enabled);
        let is = after.is_some_and(FeatureValue::is_enabled);

        match (was, is) {
            (false, true) => diff.added_features.push(feature.key.to_string()),
            (true, false) => diff.removed_features.push(feature.key.to_string()),
            (true, true) => {
                if let (Some(b), Some(a)) = (before, after)
                    && b != a
                {
                    diff.changed_features.push(FeatureChange {
                        key: feature.key.to_string(),
                        from: b.clone(),
                        to: a.clone(),
                    });
                }
            }
            (false, false) => {}
        }
    }

    for resource in Resource::iter() {
        let change = LimitChange {
            resource,
            from: from.limit(resource),
            to: to.limit(resource),
        };
        if change.from == change.to {
            continue;
        }
        if is_limit_improved(change.from, change.to) {
            diff.improved_limits.push(change);
        } else {
            diff.reduced_limits.push(change);
        }
    }

    diff
}

pub fn required_plan(feature: &str) -> Option<&'static str> {
    find_feature(feature).map(|f| f.required_plan)
}

#[derive(Clone)]
pub struct FeatureGate {
    resolver: TenantPlanResolver,
}

impl FeatureGate {
    pub fn new(resolver: TenantPlanResolver) -> Self {
        Self { resolver }
    }

    async fn governing_plan(&self, tenant_id: Uuid) -> AppResult<Option<Plan>> {
        match self.resolver.resolve(tenant_id).await? {
            PlanResolution::Resolved(plan) => Ok(Some(plan)),
            PlanResolution::Unresolvable(reason) => {
                warn!(tenant_id = %tenant_id, reason = %reason, "Plan unresolvable, denying features");
                Ok(None)
            }
        }
    }

    fn status(plan: Option<&Plan>, def: &'static FeatureDefinition) -> FeatureStatus {
        let value = plan.and_then(|p| p.feature(def.key)).cloned();
        FeatureStatus {
            key: def.key,
            name: def.name,
            category: def.category,
            enabled: value.as_ref().is_some_and(FeatureValue::is_enabled),
            value,
            required_plan: def.required_plan,
        }
    }

    pub async fn has_feature(&self, tenant_id: Uuid, feature: &str) -> AppResult<bool> {
        let plan = self.governing_plan(tenant_id).await?;
        Ok(plan.is_some_and(|p| p.has_feature(feature)))
    }

    /// Fails with `FeatureUnavailable` unless the tenant's plan enables `feature`.
    pub async fn authorize(&self, tenant_id: Uuid, feature: &str) -> AppResult<()> {
        let def = find_feature(feature).ok_or_else(|| AppError::UnknownFeature(feature.into()))?;
        if self.has_feature(tenant_id, feature).await? {
            return Ok(());
        }
        Err(AppError::FeatureUnavailable {
            feature: def.key.to_string(),
            required_plan: def.required_plan.to_string(),
        })
    }

    pub async fn list_features(&self, tenant_id: Uuid) -> AppResult<Vec<FeatureStatus>> {
        let plan = self.governing_plan(tenant_id).await?;
        Ok(FEATURES
            .iter()
            .map(|def| Self::status(plan.as_ref(), def))
            .collect())
    }

    pub async fn grouped_features(
        &self,
        tenant_id: Uuid,
    ) -> AppResult<BTreeMap<FeatureCategory, Vec<FeatureStatus>>> {
        let mut grouped: BTreeMap<FeatureCategory, Vec<FeatureStatus>> = BTreeMap::new();
        for status in self.list_features(tenant_id).await? {
            grouped.entry(status.category).or_default().push(status);
        }
        Ok(grouped)
    }

    pub async fn feature_status(&self, tenant_id: Uuid, feature: &str) -> AppResult<FeatureStatus> {
        let def = find_feature(feature).ok_or_else(|| AppError::UnknownFeature(feature.into()))?;
        let plan = self.governing_plan(tenant_id).await?;
        Ok(Self::status(plan.as_ref(), def))
    }
}
