use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::billing_cycle::BillingCycle;

/// Prefix of the synthetic remote id stored on subscriptions that have no
/// backing gateway subscription.
pub const FREE_SUBSCRIPTION_PREFIX: &str = "free_";

/// Remote subscription status as reported by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gateway_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
}

impl GatewayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayStatus::Trialing => "trialing",
            GatewayStatus::Active => "active",
            GatewayStatus::PastDue => "past_due",
            GatewayStatus::Canceled => "canceled",
            GatewayStatus::Incomplete => "incomplete",
            GatewayStatus::IncompleteExpired => "incomplete_expired",
            GatewayStatus::Unpaid => "unpaid",
            GatewayStatus::Paused => "paused",
        }
    }

    /// Convert from a gateway status string. `None` for anything unrecognised.
    pub fn from_gateway(s: &str) -> Option<Self> {
        let status = match s.to_ascii_lowercase().as_str() {
            "trialing" => GatewayStatus::Trialing,
            "active" => GatewayStatus::Active,
            "past_due" => GatewayStatus::PastDue,
            "canceled" | "cancelled" => GatewayStatus::Canceled,
            "incomplete" => GatewayStatus::Incomplete,
            "incomplete_expired" => GatewayStatus::IncompleteExpired,
            "unpaid" => GatewayStatus::Unpaid,
            "paused" => GatewayStatus::Paused,
            _ => return None,
        };
        Some(status)
    }

    /// Statuses the state machine folds into Active.
    pub fn is_incomplete_like(&self) -> bool {
        matches!(
            self,
            GatewayStatus::Incomplete
                | GatewayStatus::Trialing
                | GatewayStatus::Unpaid
                | GatewayStatus::Paused
        )
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub gateway_subscription_id: String,
    pub gateway_status: GatewayStatus,
    pub billing_cycle: BillingCycle,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub scheduled_plan_id: Option<Uuid>,
    pub scheduled_change_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Synthetic remote id for a subscription with no gateway backing.
    pub fn free_gateway_id() -> String {
        format!("{}{}", FREE_SUBSCRIPTION_PREFIX, Uuid::new_v4().simple())
    }

    pub fn is_free(&self) -> bool {
        self.gateway_subscription_id
            .starts_with(FREE_SUBSCRIPTION_PREFIX)
    }

    pub fn has_scheduled_change(&self) -> bool {
        self.scheduled_plan_id.is_some()
    }

    pub fn on_trial(&self, now: DateTime<Utc>) -> bool {
        self.trial_ends_at.is_some_and(|t| t > now)
    }

    pub fn on_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|t| t > now)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|t| t <= now)
    }

    pub fn clear_scheduled_change(&mut self) {
        self.scheduled_plan_id = None;
        self.scheduled_change_at = None;
    }
}
