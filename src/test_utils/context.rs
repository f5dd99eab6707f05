//! Fully wired use cases over in-memory collaborators.

use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::payment_gateway::{CustomerId, RemoteSubscription, SubscriptionId},
        settings::BillingSettings,
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
    },
    domain::entities::{
        payment_method::PaymentMethod,
        plan::Plan,
        subscription::{FREE_SUBSCRIPTION_PREFIX, GatewayStatus, Subscription},
        tenant::Tenant,
    },
    infra::config::{AppConfig, GatewayKind, JobSchedules},
};

use super::{
    FAKE_WEBHOOK_SIGNATURE, FakeGateway, InMemoryGatewayEventRepo, InMemoryInvoiceRepo,
    InMemoryNotifier, InMemoryPaymentMethodRepo, InMemoryPlanRepo, InMemoryResourceCounter,
    InMemorySubscriptionRepo, InMemoryTenantRepo, InMemoryUsageRepo, basic_plan,
    create_test_payment_method, create_test_subscription, create_test_tenant, free_plan, pro_plan,
};

pub struct TestContext {
    pub settings: BillingSettings,
    pub plans: Arc<InMemoryPlanRepo>,
    pub tenants: Arc<InMemoryTenantRepo>,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub usage: Arc<InMemoryUsageRepo>,
    pub counter: Arc<InMemoryResourceCounter>,
    pub payment_methods: Arc<InMemoryPaymentMethodRepo>,
    pub invoices: Arc<InMemoryInvoiceRepo>,
    pub events: Arc<InMemoryGatewayEventRepo>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<InMemoryNotifier>,
    pub catalog: PlanCatalog,
    pub limits: UsageLimitService,
    pub meter: UsageMeter,
    pub features: FeatureGate,
    pub billing: BillingAdapter,
    pub lifecycle: SubscriptionUseCases,
    pub methods: PaymentMethodUseCases,
    pub ledger: InvoiceLedger,
    pub jobs: ReconciliationJobs,
    pub webhooks: GatewayWebhookUseCases,
}

impl TestContext {
    /// Catalog with the free, basic and pro plans.
    pub fn new() -> Self {
        Self::with_plans(vec![
            free_plan(|_| {}),
            basic_plan(|_| {}),
            pro_plan(|_| {}),
        ])
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        let settings = BillingSettings::default();
        let plans = Arc::new(InMemoryPlanRepo::with_plans(plans));
        let tenants = Arc::new(InMemoryTenantRepo::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepo::new());
        let counter = Arc::new(InMemoryResourceCounter::new());
        let usage = Arc::new(InMemoryUsageRepo::new(counter.clone()));
        let payment_methods = Arc::new(InMemoryPaymentMethodRepo::new());
        let invoices = Arc::new(InMemoryInvoiceRepo::new());
        let events = Arc::new(InMemoryGatewayEventRepo::new());
        let gateway = Arc::new(FakeGateway::new());
        let notifier = Arc::new(InMemoryNotifier::new());

        let catalog = PlanCatalog::new(plans.clone(), settings.free_plan_slug.clone());
        let resolver = TenantPlanResolver::new(subscriptions.clone(), catalog.clone());
        let limits = UsageLimitService::new(
            resolver.clone(),
            usage.clone(),
            counter.clone(),
            settings.clone(),
        );
        let meter = UsageMeter::new(usage.clone(), limits.clone(), notifier.clone());
        let features = FeatureGate::new(resolver);
        let billing = BillingAdapter::new(
            gateway.clone(),
            tenants.clone(),
            payment_methods.clone(),
        );
        let lifecycle = SubscriptionUseCases::new(
            subscriptions.clone(),
            tenants.clone(),
            catalog.clone(),
            limits.clone(),
            billing.clone(),
            notifier.clone(),
        );
        let methods = PaymentMethodUseCases::new(payment_methods.clone());
        let ledger = InvoiceLedger::new(invoices.clone());
        let jobs = ReconciliationJobs::new(
            subscriptions.clone(),
            tenants.clone(),
            payment_methods.clone(),
            usage.clone(),
            catalog.clone(),
            billing.clone(),
            lifecycle.clone(),
            meter.clone(),
            notifier.clone(),
            settings.clone(),
        );
        let webhooks = GatewayWebhookUseCases::new(
            billing.clone(),
            events.clone(),
            subscriptions.clone(),
            tenants.clone(),
            lifecycle.clone(),
            jobs.clone(),
            ledger.clone(),
            notifier.clone(),
        );

        Self {
            settings,
            plans,
            tenants,
            subscriptions,
            usage,
            counter,
            payment_methods,
            invoices,
            events,
            gateway,
            notifier,
            catalog,
            limits,
            meter,
            features,
            billing,
            lifecycle,
            methods,
            ledger,
            jobs,
            webhooks,
        }
    }

    pub fn seed_tenant(&self) -> Tenant {
        self.tenants.insert(create_test_tenant(|_| {}))
    }

    pub fn seed_default_card(&self, tenant_id: Uuid) -> PaymentMethod {
        self.payment_methods
            .insert(create_test_payment_method(|p| {
                p.tenant_id = tenant_id;
                p.is_default = true;
            }))
    }

    pub fn plan(&self, slug: &str) -> Plan {
        self.plans
            .plans
            .lock()
            .unwrap()
            .values()
            .find(|p| p.slug == slug)
            .cloned()
            .unwrap_or_else(|| panic!("no plan '{}' in test catalog", slug))
    }

    pub fn signature(&self) -> Option<&'static str> {
        Some(FAKE_WEBHOOK_SIGNATURE)
    }

    /// Store an active subscription on `slug`. Paid plans get a matching
    /// remote subscription at the fake gateway, mid-period.
    pub fn subscribe(&self, tenant_id: Uuid, slug: &str) -> Subscription {
        let plan = self.plan(slug);
        let gateway_subscription_id = if plan.slug == self.settings.free_plan_slug {
            format!("{}{}", FREE_SUBSCRIPTION_PREFIX, Uuid::new_v4().simple())
        } else {
            let customer = CustomerId::new(format!("cus_{}", tenant_id.simple()));
            self.tenants.tenants.lock().unwrap().entry(tenant_id).and_modify(|t| {
                t.gateway_customer_id = Some(customer.as_str().to_string());
            });
            let id = SubscriptionId::new(format!("sub_{}", Uuid::new_v4().simple()));
            self.gateway.register(RemoteSubscription {
                id: id.clone(),
                customer_id: customer,
                status: GatewayStatus::Active,
                price_id: plan.gateway_monthly_price_id.clone(),
                current_period_end: Some(Utc::now() + Duration::days(15) + Duration::hours(1)),
                trial_end: None,
                cancel_at_period_end: false,
                ended_at: None,
            });
            id.0
        };

        self.subscriptions.insert(create_test_subscription(|s| {
            s.tenant_id = tenant_id;
            s.plan_id = plan.id;
            s.gateway_subscription_id = gateway_subscription_id;
        }))
    }

    /// HTTP state over the same collaborators.
    pub fn app_state(&self) -> AppState {
        let config = AppConfig {
            database_url: "postgres://localhost/tenant_billing_test".to_string(),
            bind_addr: "127.0.0.1:3001".parse().unwrap(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            payment_gateway: GatewayKind::Dummy,
            stripe_secret_key: SecretString::new("sk_test".into()),
            stripe_webhook_secret: SecretString::new("whsec_test".into()),
            gateway_timeout_secs: 10,
            webhook_tolerance_secs: 300,
            billing: self.settings.clone(),
            schedules: JobSchedules::default(),
        };

        AppState {
            config: Arc::new(config),
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
