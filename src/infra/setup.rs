use std::{sync::Arc, time::Duration};

use env_helpers::get_env_default;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{http::app_state::AppState, persistence::PostgresPersistence},
    application::ports::payment_gateway::PaymentGatewayPort,
    infra::{
        config::{AppConfig, GatewayKind},
        dummy_gateway::DummyGateway,
        error::InfraError,
        http_client::try_build_client,
        postgres_persistence,
        stripe_client::StripeClient,
        stripe_gateway::StripeGateway,
    },
    use_cases::{
        billing_adapter::BillingAdapter,
        feature_gate::FeatureGate,
        gateway_webhook::GatewayWebhookUseCases,
        invoices::InvoiceLedger,
        payment_methods::PaymentMethodUseCases,
        plan_catalog::PlanCatalog,
        reconciliation::ReconciliationJobs,
        subscription::SubscriptionUseCases,
        usage::UsageMeter,
        usage_limits::{TenantPlanResolver, UsageLimitService},
    },
};

/// Every use case wired over Postgres and the configured gateway. Shared by
/// the HTTP server and the worker.
#[derive(Clone)]
pub struct BillingServices {
    pub config: Arc<AppConfig>,
    pub catalog: PlanCatalog,
    pub limits: UsageLimitService,
    pub meter: UsageMeter,
    pub features: FeatureGate,
    pub lifecycle: SubscriptionUseCases,
    pub methods: PaymentMethodUseCases,
    pub ledger: InvoiceLedger,
    pub jobs: ReconciliationJobs,
    pub webhooks: GatewayWebhookUseCases,
}

impl BillingServices {
    pub fn wire(
        config: AppConfig,
        persistence: Arc<PostgresPersistence>,
        gateway: Arc<dyn PaymentGatewayPort>,
    ) -> Self {
        let settings = config.billing.clone();

        let catalog = PlanCatalog::new(persistence.clone(), settings.free_plan_slug.clone());
        let resolver = TenantPlanResolver::new(persistence.clone(), catalog.clone());
        let limits = UsageLimitService::new(
            resolver.clone(),
            persistence.clone(),
            persistence.clone(),
            settings.clone(),
        );
        let meter = UsageMeter::new(persistence.clone(), limits.clone(), persistence.clone());
        let features = FeatureGate::new(resolver);
        let billing = BillingAdapter::new(gateway, persistence.clone(), persistence.clone());
        let lifecycle = SubscriptionUseCases::new(
            persistence.clone(),
            persistence.clone(),
            catalog.clone(),
            limits.clone(),
            billing.clone(),
            persistence.clone(),
        );
        let methods = PaymentMethodUseCases::new(persistence.clone());
        let ledger = InvoiceLedger::new(persistence.clone());
        let jobs = ReconciliationJobs::new(
            persistence.clone(),
            persistence.clone(),
            persistence.clone(),
            persistence.clone(),
            catalog.clone(),
            billing.clone(),
            lifecycle.clone(),
            meter.clone(),
            persistence.clone(),
            settings,
        );
        let webhooks = GatewayWebhookUseCases::new(
            billing,
            persistence.clone(),
            persistence.clone(),
            persistence.clone(),
            lifecycle.clone(),
            jobs.clone(),
            ledger.clone(),
            persistence,
        );

        Self {
            config: Arc::new(config),
            catalog,
            limits,
            meter,
            features,
            lifecycle,
            methods,
            ledger,
            jobs,
            webhooks,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            plan_catalog: Arc::new(self.catalog.clone()),
            subscription_use_cases: Arc::new(self.lifecycle.clone()),
            feature_gate: Arc::new(self.features.clone()),
            usage_meter: Arc::new(self.meter.clone()),
            usage_limits: Arc::new(self.limits.clone()),
            payment_method_use_cases: Arc::new(self.methods.clone()),
            invoice_ledger: Arc::new(self.ledger.clone()),
            webhook_use_cases: Arc::new(self.webhooks.clone()),
        }
    }
}

pub fn build_gateway(config: &AppConfig) -> Result<Arc<dyn PaymentGatewayPort>, InfraError> {
    let gateway: Arc<dyn PaymentGatewayPort> = match config.payment_gateway {
        GatewayKind::Stripe => {
            let http = try_build_client(Duration::from_secs(config.gateway_timeout_secs))
                .map_err(InfraError::HttpClient)?;
            Arc::new(StripeGateway::new(
                StripeClient::new(http, config.stripe_secret_key.clone()),
                config.stripe_webhook_secret.clone(),
                config.webhook_tolerance_secs,
            ))
        }
        GatewayKind::Dummy => Arc::new(DummyGateway::new(
            config.stripe_webhook_secret.clone(),
            config.webhook_tolerance_secs,
        )),
    };
    info!(gateway = gateway.name(), "Payment gateway configured");
    Ok(gateway)
}

pub async fn init_services() -> Result<BillingServices, InfraError> {
    let config = AppConfig::from_env()?;
    let persistence = Arc::new(postgres_persistence(&config.database_url).await?);
    let gateway = build_gateway(&config)?;
    Ok(BillingServices::wire(config, persistence, gateway))
}

pub async fn init_app_state() -> Result<AppState, InfraError> {
    Ok(init_services().await?.app_state())
}

/// Console logs by default; `LOG_FORMAT=json` switches to structured JSON.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tenant_billing=info,tower_http=info".into());

    let json = get_env_default("LOG_FORMAT", String::from("pretty")).eq_ignore_ascii_case("json");

    let console_layer = (!json).then(|| fmt::layer().with_target(false).with_level(true));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
