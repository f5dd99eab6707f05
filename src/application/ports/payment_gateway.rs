use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    app_error::AppResult,
    domain::entities::{invoice::InvoiceStatus, subscription::GatewayStatus, tenant::Tenant},
};

// ============================================================================
// Port Types - gateway-neutral
// ============================================================================

/// Customer identifier at the payment gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription identifier at the payment gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the gateway should bill a price swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProrationBehavior {
    /// Prorations are added to the next regular invoice.
    CreateProrations,
    /// Prorations are invoiced and charged immediately.
    AlwaysInvoice,
}

impl ProrationBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProrationBehavior::CreateProrations => "create_prorations",
            ProrationBehavior::AlwaysInvoice => "always_invoice",
        }
    }
}

/// Parameters for creating a remote subscription
#[derive(Debug, Clone)]
pub struct NewRemoteSubscription {
    pub customer_id: CustomerId,
    pub price_id: String,
    pub trial_days: Option<i32>,
    /// Gateway id of the payment method to charge, if one is on file.
    pub payment_method_id: Option<String>,
}

/// Subscription as the gateway sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: GatewayStatus,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RemoteSubscription {
    /// Within a cancellation grace window: cancel requested but period not over.
    pub fn on_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.cancel_at_period_end && self.current_period_end.is_some_and(|end| end > now)
    }
}

/// Invoice as reported by the gateway. Amounts are taken as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteInvoice {
    pub id: String,
    pub customer_id: CustomerId,
    pub subscription_id: Option<SubscriptionId>,
    pub status: InvoiceStatus,
    pub net_amount: Decimal,
    pub vat_amount: Decimal,
    pub gross_amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// A verified webhook event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    pub kind: GatewayEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEventKind {
    SubscriptionUpdated(RemoteSubscription),
    SubscriptionDeleted(RemoteSubscription),
    InvoicePaymentFailed {
        customer_id: CustomerId,
        subscription_id: Option<SubscriptionId>,
        attempt_count: i32,
    },
    InvoicePaid(RemoteInvoice),
    /// Event types this core does not act on.
    Ignored { event_type: String },
}

impl GatewayEventKind {
    pub fn name(&self) -> &str {
        match self {
            GatewayEventKind::SubscriptionUpdated(_) => "subscription_updated",
            GatewayEventKind::SubscriptionDeleted(_) => "subscription_deleted",
            GatewayEventKind::InvoicePaymentFailed { .. } => "invoice_payment_failed",
            GatewayEventKind::InvoicePaid(_) => "invoice_paid",
            GatewayEventKind::Ignored { event_type } => event_type,
        }
    }
}

// ============================================================================
// Payment Gateway Port
// ============================================================================

/// Remote payment gateway operations.
///
/// Implementations report every failure as `AppError::Billing`.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Short gateway name for logs.
    fn name(&self) -> &'static str;

    async fn create_customer(&self, tenant: &Tenant) -> AppResult<CustomerId>;

    async fn create_subscription(
        &self,
        params: &NewRemoteSubscription,
    ) -> AppResult<RemoteSubscription>;

    /// `None` when the gateway has no such subscription.
    async fn get_subscription(&self, id: &SubscriptionId)
    -> AppResult<Option<RemoteSubscription>>;

    async fn swap_price(
        &self,
        id: &SubscriptionId,
        price_id: &str,
        proration: ProrationBehavior,
    ) -> AppResult<RemoteSubscription>;

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<RemoteSubscription>;

    /// Undo a pending cancel-at-period-end.
    async fn resume_subscription(&self, id: &SubscriptionId) -> AppResult<RemoteSubscription>;

    /// Verify a webhook delivery and translate it into a gateway-neutral event.
    fn parse_webhook(&self, payload: &str, signature: Option<&str>) -> AppResult<GatewayEvent>;
}
