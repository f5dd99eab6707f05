use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    infra::config::AppConfig,
    use_cases::{
        feature_gate::FeatureGate, gateway_webhook::GatewayWebhookUseCases,
        invoices::InvoiceLedger, payment_methods::PaymentMethodUseCases,
        plan_catalog::PlanCatalog, subscription::SubscriptionUseCases, usage::UsageMeter,
        usage_limits::UsageLimitService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub plan_catalog: Arc<PlanCatalog>,
    pub subscription_use_cases: Arc<SubscriptionUseCases>,
    pub feature_gate: Arc<FeatureGate>,
    pub usage_meter: Arc<UsageMeter>,
    pub usage_limits: Arc<UsageLimitService>,
    pub payment_method_use_cases: Arc<PaymentMethodUseCases>,
    pub invoice_ledger: Arc<InvoiceLedger>,
    pub webhook_use_cases: Arc<GatewayWebhookUseCases>,
}

impl FromRef<AppState> for Arc<SubscriptionUseCases> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.subscription_use_cases.clone()
    }
}

impl FromRef<AppState> for Arc<FeatureGate> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.feature_gate.clone()
    }
}

impl FromRef<AppState> for Arc<PlanCatalog> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.plan_catalog.clone()
    }
}

impl FromRef<AppState> for Arc<UsageMeter> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.usage_meter.clone()
    }
}

impl FromRef<AppState> for Arc<UsageLimitService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.usage_limits.clone()
    }
}
