use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

use super::subscription::{GatewayStatus, Subscription};

const SECONDS_PER_DAY: i64 = 86_400;

/// Action a tenant may take on a subscription in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionAction {
    Upgrade,
    Downgrade,
    Cancel,
    Resume,
    UpdatePaymentMethod,
    Resubscribe,
}

/// Lifecycle state derived from a subscription's stored fields.
///
/// Never persisted; always recomputed with [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Trialing { trial_ends_at: DateTime<Utc> },
    Active,
    PastDue,
    /// `grace` is true while `ends_at` is still in the future.
    Canceled { ends_at: DateTime<Utc>, grace: bool },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("subscription {subscription_id} has status {status} without an end date")]
pub struct UnclassifiableSubscription {
    pub subscription_id: Uuid,
    pub status: GatewayStatus,
}

/// Classify a subscription. First match wins: trial in the future, then any
/// `ends_at`, then `past_due`, then active and incomplete-like statuses.
pub fn classify(
    sub: &Subscription,
    now: DateTime<Utc>,
) -> Result<SubscriptionState, UnclassifiableSubscription> {
    if let Some(trial_ends_at) = sub.trial_ends_at
        && trial_ends_at > now
    {
        return Ok(SubscriptionState::Trialing { trial_ends_at });
    }

    if let Some(ends_at) = sub.ends_at {
        return Ok(SubscriptionState::Canceled {
            ends_at,
            grace: ends_at > now,
        });
    }

    match sub.gateway_status {
        GatewayStatus::PastDue => Ok(SubscriptionState::PastDue),
        GatewayStatus::Active => Ok(SubscriptionState::Active),
        // Folded into Active so upgrade/cancel stay reachable.
        status if status.is_incomplete_like() => Ok(SubscriptionState::Active),
        status => Err(UnclassifiableSubscription {
            subscription_id: sub.id,
            status,
        }),
    }
}

impl SubscriptionState {
    pub fn can_upgrade(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Trialing { .. } | SubscriptionState::Active
        )
    }

    pub fn can_downgrade(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Trialing { .. } | SubscriptionState::Active
        )
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Trialing { .. }
                | SubscriptionState::Active
                | SubscriptionState::PastDue
        )
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, SubscriptionState::Canceled { grace: true, .. })
    }

    /// Whether the tenant keeps access to the subscribed plan.
    pub fn has_access(&self) -> bool {
        !matches!(self, SubscriptionState::Canceled { grace: false, .. })
    }

    /// Ended subscriptions may be replaced by a brand new one.
    pub fn is_ended(&self) -> bool {
        matches!(self, SubscriptionState::Canceled { grace: false, .. })
    }

    pub fn available_actions(&self) -> &'static [SubscriptionAction] {
        use SubscriptionAction::*;
        match self {
            SubscriptionState::Trialing { .. } | SubscriptionState::Active => {
                &[Upgrade, Downgrade, Cancel]
            }
            SubscriptionState::PastDue => &[UpdatePaymentMethod, Cancel],
            SubscriptionState::Canceled { grace: true, .. } => &[Resume],
            SubscriptionState::Canceled { grace: false, .. } => &[Resubscribe],
        }
    }

    /// Stable machine name, used in API payloads.
    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionState::Trialing { .. } => "trialing",
            SubscriptionState::Active => "active",
            SubscriptionState::PastDue => "past_due",
            SubscriptionState::Canceled { .. } => "canceled",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionState::Trialing { .. } => "Trial",
            SubscriptionState::Active => "Active",
            SubscriptionState::PastDue => "Past Due",
            SubscriptionState::Canceled { .. } => "Canceled",
        }
    }

    pub fn description(&self, now: DateTime<Utc>) -> String {
        match self {
            SubscriptionState::Trialing { trial_ends_at } => {
                format!("Trial ends in {}", days_phrase(*trial_ends_at, now))
            }
            SubscriptionState::Active => "Subscription is active".to_string(),
            SubscriptionState::PastDue => {
                "Payment failed. Please update your payment method".to_string()
            }
            SubscriptionState::Canceled { ends_at, grace: true } => {
                format!("Subscription ends in {}", days_phrase(*ends_at, now))
            }
            SubscriptionState::Canceled { grace: false, .. } => {
                "Subscription has ended".to_string()
            }
        }
    }
}

/// Whole days until `until`, rounded up, never below 1.
pub fn days_until(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (until - now).num_seconds();
    let days = (seconds + SECONDS_PER_DAY - 1).div_euclid(SECONDS_PER_DAY);
    days.max(1)
}

fn days_phrase(until: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match days_until(until, now) {
        1 => "1 day".to_string(),
        n => format!("{} days", n),
    }
}
