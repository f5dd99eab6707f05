//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::{
    application::ports::payment_gateway::{CustomerId, RemoteInvoice},
    domain::entities::{
        billing_cycle::BillingCycle,
        invoice::InvoiceStatus,
        payment_method::{PaymentMethod, PaymentMethodKind},
        plan::{FeatureValue, Plan},
        subscription::{GatewayStatus, Subscription},
        tenant::Tenant,
    },
};

fn features(entries: &[(&str, FeatureValue)]) -> BTreeMap<String, FeatureValue> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn limits(reservations: i64, users: i64, services: i64, clients: i64) -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("reservations".to_string(), reservations),
        ("users".to_string(), users),
        ("services".to_string(), services),
        ("clients".to_string(), clients),
    ])
}

fn flag(on: bool) -> FeatureValue {
    FeatureValue::Flag(on)
}

fn tier(name: &str) -> FeatureValue {
    FeatureValue::Tier(name.to_string())
}

/// Create a test plan with sensible defaults.
pub fn create_test_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    let mut plan = Plan {
        id: Uuid::new_v4(),
        slug: "starter".to_string(),
        name: "Starter".to_string(),
        description: Some("A test plan".to_string()),
        monthly_price: dec!(15.00),
        yearly_price: dec!(150.00),
        currency: "EUR".to_string(),
        features: features(&[("online_booking", flag(true)), ("sms_reminders", flag(true))]),
        limits: limits(200, 2, 10, 500),
        sort_order: 1,
        trial_days: 0,
        is_active: true,
        is_public: true,
        gateway_monthly_price_id: Some("price_starter_monthly".to_string()),
        gateway_yearly_price_id: Some("price_starter_yearly".to_string()),
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut plan);
    plan
}

/// The free tier every tenant falls back to.
pub fn free_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    create_test_plan(|p| {
        p.slug = "free".to_string();
        p.name = "Free".to_string();
        p.description = Some("Get started".to_string());
        p.monthly_price = Decimal::ZERO;
        p.yearly_price = Decimal::ZERO;
        p.sort_order = 0;
        p.features = features(&[
            ("online_booking", flag(true)),
            ("email_reminders", flag(true)),
            ("reports", tier("none")),
        ]);
        p.limits = limits(50, 1, 5, 100);
        p.gateway_monthly_price_id = None;
        p.gateway_yearly_price_id = None;
        overrides(p);
    })
}

pub fn basic_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    create_test_plan(|p| {
        p.slug = "basic".to_string();
        p.name = "Basic".to_string();
        p.monthly_price = dec!(10.00);
        p.yearly_price = dec!(100.00);
        p.sort_order = 1;
        p.features = features(&[
            ("online_booking", flag(true)),
            ("email_reminders", flag(true)),
            ("sms_reminders", flag(true)),
            ("custom_branding", flag(true)),
            ("portfolio", flag(true)),
            ("calendar_sync", flag(true)),
            ("reports", tier("basic")),
        ]);
        p.limits = limits(500, 3, 20, 1000);
        p.gateway_monthly_price_id = Some("price_basic_monthly".to_string());
        p.gateway_yearly_price_id = Some("price_basic_yearly".to_string());
        overrides(p);
    })
}

pub fn pro_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    create_test_plan(|p| {
        p.slug = "pro".to_string();
        p.name = "Pro".to_string();
        p.monthly_price = dec!(20.00);
        p.yearly_price = dec!(200.00);
        p.sort_order = 2;
        p.trial_days = 14;
        p.features = features(&[
            ("online_booking", flag(true)),
            ("email_reminders", flag(true)),
            ("sms_reminders", flag(true)),
            ("custom_branding", flag(true)),
            ("portfolio", flag(true)),
            ("calendar_sync", flag(true)),
            ("deposits", flag(true)),
            ("api_access", flag(true)),
            ("priority_support", flag(true)),
            ("custom_domain", flag(true)),
            ("multi_location", flag(true)),
            ("reports", tier("advanced")),
        ]);
        p.limits = limits(-1, 10, -1, -1);
        p.gateway_monthly_price_id = Some("price_pro_monthly".to_string());
        p.gateway_yearly_price_id = Some("price_pro_yearly".to_string());
        overrides(p);
    })
}

/// Create a test subscription: active, monthly, gateway-backed.
pub fn create_test_subscription(overrides: impl FnOnce(&mut Subscription)) -> Subscription {
    let now = Utc::now();
    let mut sub = Subscription {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        plan_id: Uuid::new_v4(),
        gateway_subscription_id: format!("sub_test{}", Uuid::new_v4().simple()),
        gateway_status: GatewayStatus::Active,
        billing_cycle: BillingCycle::Monthly,
        trial_ends_at: None,
        ends_at: None,
        scheduled_plan_id: None,
        scheduled_change_at: None,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut sub);
    sub
}

pub fn create_test_tenant(overrides: impl FnOnce(&mut Tenant)) -> Tenant {
    let id = Uuid::new_v4();
    let mut tenant = Tenant {
        id,
        name: "Studio Test".to_string(),
        owner_email: format!("owner+{}@example.com", id.simple()),
        gateway_customer_id: None,
    };
    overrides(&mut tenant);
    tenant
}

/// Create a test card expiring well in the future.
pub fn create_test_payment_method(overrides: impl FnOnce(&mut PaymentMethod)) -> PaymentMethod {
    let mut method = PaymentMethod {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        gateway_payment_method_id: format!("pm_test{}", Uuid::new_v4().simple()),
        kind: PaymentMethodKind::Card,
        brand: Some("visa".to_string()),
        last4: Some("4242".to_string()),
        exp_month: Some(12),
        exp_year: Some(2035),
        is_default: false,
        created_at: Utc::now(),
    };
    overrides(&mut method);
    method
}

/// Create a paid gateway invoice.
pub fn create_test_remote_invoice(overrides: impl FnOnce(&mut RemoteInvoice)) -> RemoteInvoice {
    let now = Utc::now();
    let mut invoice = RemoteInvoice {
        id: format!("in_test{}", Uuid::new_v4().simple()),
        customer_id: CustomerId::new(format!("cus_test{}", Uuid::new_v4().simple())),
        subscription_id: None,
        status: InvoiceStatus::Paid,
        net_amount: dec!(10.00),
        vat_amount: dec!(1.90),
        gross_amount: dec!(11.90),
        currency: "EUR".to_string(),
        created_at: now,
        paid_at: Some(now),
    };
    overrides(&mut invoice);
    invoice
}

/// Fixed timestamp for fixtures that do not depend on the clock.
pub fn test_datetime() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap()
}

