use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::{billing_cycle::BillingCycle, resource::Resource};

/// Limit value meaning "no cap".
pub const UNLIMITED: i64 = -1;

/// Value of a feature entry in a plan's feature map.
///
/// Features are either plain switches or tiers such as `"basic"` / `"advanced"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Flag(bool),
    Tier(String),
}

impl FeatureValue {
    /// `true`, or any tier other than `"none"` / empty.
    pub fn is_enabled(&self) -> bool {
        match self {
            FeatureValue::Flag(enabled) => *enabled,
            FeatureValue::Tier(tier) => {
                let tier = tier.trim();
                !tier.is_empty() && !tier.eq_ignore_ascii_case("none")
            }
        }
    }
}

/// A limit as shown to API clients: a number, or the literal `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitValue {
    Unlimited,
    Limited(i64),
}

impl From<i64> for LimitValue {
    fn from(raw: i64) -> Self {
        if raw == UNLIMITED {
            LimitValue::Unlimited
        } else {
            LimitValue::Limited(raw)
        }
    }
}

impl Serialize for LimitValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LimitValue::Unlimited => serializer.serialize_str("unlimited"),
            LimitValue::Limited(n) => serializer.serialize_i64(*n),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub monthly_price: Decimal,
    pub yearly_price: Decimal,
    pub currency: String,
    pub features: BTreeMap<String, FeatureValue>,
    pub limits: BTreeMap<String, i64>,
    pub sort_order: i32,
    pub trial_days: i32,
    pub is_active: bool,
    pub is_public: bool,
    pub gateway_monthly_price_id: Option<String>,
    pub gateway_yearly_price_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Plan {
    pub fn price(&self, cycle: BillingCycle) -> Decimal {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Yearly => self.yearly_price,
        }
    }

    pub fn gateway_price_id(&self, cycle: BillingCycle) -> Option<&str> {
        match cycle {
            BillingCycle::Monthly => self.gateway_monthly_price_id.as_deref(),
            BillingCycle::Yearly => self.gateway_yearly_price_id.as_deref(),
        }
        .filter(|id| !id.is_empty())
    }

    /// Raw limit for a resource. A resource missing from the limit map is capped at 0.
    pub fn limit(&self, resource: Resource) -> i64 {
        self.limits.get(resource.as_ref()).copied().unwrap_or(0)
    }

    pub fn is_unlimited(&self, resource: Resource) -> bool {
        self.limit(resource) == UNLIMITED
    }

    pub fn feature(&self, key: &str) -> Option<&FeatureValue> {
        self.features.get(key)
    }

    pub fn has_feature(&self, key: &str) -> bool {
        self.feature(key).is_some_and(FeatureValue::is_enabled)
    }

    /// Upgrade direction is defined purely by `sort_order`.
    pub fn is_upgrade_from(&self, current: &Plan) -> bool {
        self.sort_order > current.sort_order
    }

    pub fn is_downgrade_from(&self, current: &Plan) -> bool {
        self.sort_order < current.sort_order
    }

    /// Whole-percent saving of paying yearly instead of twelve monthly payments.
    pub fn yearly_discount_percent(&self) -> i64 {
        let twelve_months = self.monthly_price * Decimal::from(12);
        if twelve_months <= Decimal::ZERO {
            return 0;
        }
        let percent = (twelve_months - self.yearly_price) / twelve_months * Decimal::from(100);
        percent
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .try_into()
            .unwrap_or(0)
    }
}
