use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle events the billing core announces to tenant owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    TrialStarted,
    TrialEnding,
    TrialEnded,
    PaymentFailed,
    SubscriptionUpgraded,
    SubscriptionDowngraded,
    DowngradeScheduled,
    DowngradeReminder,
    SubscriptionCanceled,
    SubscriptionResumed,
    SubscriptionEnded,
    CardExpiring,
    UsageWarning,
    UsageLimitReached,
}

/// One notification to dispatch. Rendering and delivery happen elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingNotification {
    pub tenant_id: Uuid,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

impl BillingNotification {
    pub fn new(tenant_id: Uuid, kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self {
            tenant_id,
            kind,
            payload,
        }
    }
}
