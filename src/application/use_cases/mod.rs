pub mod billing_adapter;
pub mod feature_gate;
pub mod gateway_webhook;
pub mod invoices;
pub mod payment_methods;
pub mod plan_catalog;
pub mod proration;
pub mod reconciliation;
pub mod subscription;
pub mod usage;
pub mod usage_limits;
