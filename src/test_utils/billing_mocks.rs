//! In-memory implementations of the billing repository traits.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        gateway_webhook::GatewayEventRepo,
        invoices::{InvoiceRepo, NewPaidInvoice},
        payment_methods::{NewPaymentMethod, PaymentMethodRepo},
        plan_catalog::PlanRepo,
        subscription::{NewSubscription, SubscriptionRepo, TenantRepo},
        usage::{Recount, ResourceCounter, UsageRepo},
    },
    domain::entities::{
        invoice::{Invoice, InvoiceStatus, invoice_number_prefix, next_invoice_number},
        payment_method::{PaymentMethod, PaymentMethodKind},
        plan::Plan,
        resource::Resource,
        subscription::{GatewayStatus, Subscription},
        tenant::Tenant,
        usage_record::UsageRecord,
    },
};

/// Keyset page over items sorted by id.
fn page<T: Clone>(
    mut items: Vec<T>,
    id: impl Fn(&T) -> Uuid,
    after: Option<Uuid>,
    limit: i64,
) -> Vec<T> {
    items.sort_by_key(|i| id(i));
    items
        .into_iter()
        .filter(|i| after.is_none_or(|a| id(i) > a))
        .take(limit.max(0) as usize)
        .collect()
}

// ============================================================================
// InMemoryPlanRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPlanRepo {
    pub plans: Mutex<HashMap<Uuid, Plan>>,
}

impl InMemoryPlanRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        Self {
            plans: Mutex::new(plans.into_iter().map(|p| (p.id, p)).collect()),
        }
    }
}

#[async_trait]
impl PlanRepo for InMemoryPlanRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>> {
        Ok(self.plans.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> AppResult<Option<Plan>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn list_active(&self) -> AppResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.sort_order);
        Ok(plans)
    }
}

// ============================================================================
// InMemoryTenantRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryTenantRepo {
    pub tenants: Mutex<HashMap<Uuid, Tenant>>,
}

impl InMemoryTenantRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: Tenant) -> Tenant {
        self.tenants
            .lock()
            .unwrap()
            .insert(tenant.id, tenant.clone());
        tenant
    }

    pub fn get(&self, id: Uuid) -> Tenant {
        self.tenants.lock().unwrap()[&id].clone()
    }
}

#[async_trait]
impl TenantRepo for InMemoryTenantRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Tenant>> {
        Ok(self.tenants.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_gateway_customer_id(&self, customer_id: &str) -> AppResult<Option<Tenant>> {
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.gateway_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn set_gateway_customer_id(&self, id: Uuid, customer_id: &str) -> AppResult<()> {
        let mut tenants = self.tenants.lock().unwrap();
        let tenant = tenants.get_mut(&id).ok_or(AppError::NotFound)?;
        tenant.gateway_customer_id = Some(customer_id.to_string());
        Ok(())
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

/// Rows carry an insertion sequence so "latest" is stable within one clock tick.
#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub subscriptions: Mutex<HashMap<Uuid, (u64, Subscription)>>,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sub: Subscription) -> Subscription {
        let mut subs = self.subscriptions.lock().unwrap();
        let seq = subs.len() as u64;
        subs.insert(sub.id, (seq, sub.clone()));
        sub
    }

    pub fn get(&self, id: Uuid) -> Subscription {
        self.subscriptions.lock().unwrap()[&id].1.clone()
    }

    pub fn all(&self) -> Vec<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .values()
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn patch(&self, id: Uuid, f: impl FnOnce(&mut Subscription)) {
        let mut subs = self.subscriptions.lock().unwrap();
        if let Some((_, sub)) = subs.get_mut(&id) {
            f(sub);
        }
    }

    fn from_new(input: &NewSubscription) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            plan_id: input.plan_id,
            gateway_subscription_id: input.gateway_subscription_id.clone(),
            gateway_status: input.gateway_status,
            billing_cycle: input.billing_cycle,
            trial_ends_at: input.trial_ends_at,
            ends_at: None,
            scheduled_plan_id: None,
            scheduled_change_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn live(&self, pred: impl Fn(&Subscription) -> bool) -> Vec<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .values()
            .map(|(_, s)| s)
            .filter(|s| s.ends_at.is_none() && pred(s))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(&id)
            .map(|(_, s)| s.clone()))
    }

    async fn current_for_tenant(&self, tenant_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|(_, s)| s.tenant_id == tenant_id)
            .max_by_key(|(seq, s)| (s.created_at, *seq))
            .map(|(_, s)| s.clone()))
    }

    async fn get_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .find(|(_, s)| s.gateway_subscription_id == gateway_subscription_id)
            .map(|(_, s)| s.clone()))
    }

    async fn create(&self, input: &NewSubscription) -> AppResult<Subscription> {
        Ok(self.insert(Self::from_new(input)))
    }

    async fn update(&self, sub: &Subscription) -> AppResult<Subscription> {
        let mut subs = self.subscriptions.lock().unwrap();
        let (_, stored) = subs.get_mut(&sub.id).ok_or(AppError::NotFound)?;
        *stored = sub.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn supersede(
        &self,
        old_id: Uuid,
        ended_at: DateTime<Utc>,
        replacement: &NewSubscription,
    ) -> AppResult<Subscription> {
        let mut subs = self.subscriptions.lock().unwrap();
        let (_, old) = subs.get_mut(&old_id).ok_or(AppError::NotFound)?;
        old.ends_at = Some(ended_at);
        old.gateway_status = GatewayStatus::Canceled;
        old.clear_scheduled_change();
        old.updated_at = ended_at;

        let fresh = Self::from_new(replacement);
        let seq = subs.len() as u64;
        subs.insert(fresh.id, (seq, fresh.clone()));
        Ok(fresh)
    }

    async fn list_expired_trials(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let rows = self.live(|s| {
            s.gateway_status == GatewayStatus::Trialing && s.trial_ends_at.is_some_and(|t| t <= now)
        });
        Ok(page(rows, |s| s.id, after, limit))
    }

    async fn list_due_downgrades(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let rows = self.live(|s| {
            s.scheduled_plan_id.is_some() && s.scheduled_change_at.is_some_and(|t| t <= now)
        });
        Ok(page(rows, |s| s.id, after, limit))
    }

    async fn list_trials_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let rows = self.live(|s| {
            s.gateway_status == GatewayStatus::Trialing
                && s.trial_ends_at.is_some_and(|t| t >= from && t < to)
        });
        Ok(page(rows, |s| s.id, after, limit))
    }

    async fn list_downgrades_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let rows = self.live(|s| {
            s.scheduled_plan_id.is_some()
                && s.scheduled_change_at.is_some_and(|t| t >= from && t < to)
        });
        Ok(page(rows, |s| s.id, after, limit))
    }
}

// ============================================================================
// InMemoryUsageRepo
// ============================================================================

/// Usage counters that recount against `counter`'s reservation table.
pub struct InMemoryUsageRepo {
    pub records: Mutex<HashMap<(Uuid, String), UsageRecord>>,
    counter: Arc<InMemoryResourceCounter>,
}

impl InMemoryUsageRepo {
    pub fn new(counter: Arc<InMemoryResourceCounter>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            counter,
        }
    }

    fn record_entry<'a>(
        records: &'a mut HashMap<(Uuid, String), UsageRecord>,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> &'a mut UsageRecord {
        records
            .entry((tenant_id, period.to_string()))
            .or_insert_with(|| {
                let now = Utc::now();
                UsageRecord {
                    id: Uuid::new_v4(),
                    tenant_id,
                    period: period.to_string(),
                    reservations_count: 0,
                    reservations_limit: limit_snapshot,
                    created_at: now,
                    updated_at: now,
                }
            })
    }

    fn with_record<R>(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
        f: impl FnOnce(&mut UsageRecord) -> R,
    ) -> R {
        let mut records = self.records.lock().unwrap();
        f(Self::record_entry(&mut records, tenant_id, period, limit_snapshot))
    }

    /// Insert a reservation row and bump the counter in one step, the way the
    /// booking flow commits both together.
    pub fn book_reservation(&self, tenant_id: Uuid, period: &str, limit_snapshot: i64) {
        let mut records = self.records.lock().unwrap();
        *self
            .counter
            .reservations_created
            .lock()
            .unwrap()
            .entry(tenant_id)
            .or_insert(0) += 1;
        let record = Self::record_entry(&mut records, tenant_id, period, limit_snapshot);
        record.reservations_count += 1;
        record.updated_at = Utc::now();
    }
}

#[async_trait]
impl UsageRepo for InMemoryUsageRepo {
    async fn get_or_create(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord> {
        Ok(self.with_record(tenant_id, period, limit_snapshot, |r| r.clone()))
    }

    async fn increment(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord> {
        Ok(self.with_record(tenant_id, period, limit_snapshot, |r| {
            r.reservations_count += 1;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn decrement(
        &self,
        tenant_id: Uuid,
        period: &str,
        limit_snapshot: i64,
    ) -> AppResult<UsageRecord> {
        Ok(self.with_record(tenant_id, period, limit_snapshot, |r| {
            r.reservations_count = (r.reservations_count - 1).max(0);
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn recount(
        &self,
        tenant_id: Uuid,
        period: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        limit_snapshot: i64,
    ) -> AppResult<Recount> {
        let mut records = self.records.lock().unwrap();
        let actual = self.counter.reservations_in_source(tenant_id);
        let record = Self::record_entry(&mut records, tenant_id, period, limit_snapshot);
        let previous = record.reservations_count;
        record.reservations_count = actual.max(0);
        record.updated_at = Utc::now();
        Ok(Recount {
            previous,
            record: record.clone(),
        })
    }

    async fn list_for_period(
        &self,
        period: &str,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<UsageRecord>> {
        let rows: Vec<UsageRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.period == period)
            .cloned()
            .collect();
        Ok(page(rows, |r| r.id, after, limit))
    }
}

// ============================================================================
// InMemoryResourceCounter
// ============================================================================

#[derive(Default)]
pub struct InMemoryResourceCounter {
    pub live: Mutex<HashMap<(Uuid, Resource), i64>>,
    pub reservations_created: Mutex<HashMap<Uuid, i64>>,
}

impl InMemoryResourceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant_id: Uuid, resource: Resource, count: i64) {
        self.live
            .lock()
            .unwrap()
            .insert((tenant_id, resource), count);
    }

    /// Reservations the source table reports for any period.
    pub fn set_reservations(&self, tenant_id: Uuid, count: i64) {
        self.reservations_created
            .lock()
            .unwrap()
            .insert(tenant_id, count);
    }

    fn reservations_in_source(&self, tenant_id: Uuid) -> i64 {
        self.reservations_created
            .lock()
            .unwrap()
            .get(&tenant_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ResourceCounter for InMemoryResourceCounter {
    async fn count_live(&self, tenant_id: Uuid, resource: Resource) -> AppResult<i64> {
        Ok(self
            .live
            .lock()
            .unwrap()
            .get(&(tenant_id, resource))
            .copied()
            .unwrap_or(0))
    }
}

// ============================================================================
// InMemoryPaymentMethodRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentMethodRepo {
    pub methods: Mutex<HashMap<Uuid, PaymentMethod>>,
}

impl InMemoryPaymentMethodRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, method: PaymentMethod) -> PaymentMethod {
        self.methods
            .lock()
            .unwrap()
            .insert(method.id, method.clone());
        method
    }
}

#[async_trait]
impl PaymentMethodRepo for InMemoryPaymentMethodRepo {
    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<PaymentMethod>> {
        let mut methods: Vec<PaymentMethod> = self
            .methods
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.tenant_id == tenant_id)
            .cloned()
            .collect();
        methods.sort_by_key(|m| m.created_at);
        Ok(methods)
    }

    async fn get_default(&self, tenant_id: Uuid) -> AppResult<Option<PaymentMethod>> {
        Ok(self
            .methods
            .lock()
            .unwrap()
            .values()
            .find(|m| m.tenant_id == tenant_id && m.is_default)
            .cloned())
    }

    async fn upsert(&self, tenant_id: Uuid, input: &NewPaymentMethod) -> AppResult<PaymentMethod> {
        let mut methods = self.methods.lock().unwrap();
        let existing = methods
            .values_mut()
            .find(|m| m.gateway_payment_method_id == input.gateway_payment_method_id);

        let method = match existing {
            Some(m) => {
                m.kind = input.kind;
                m.brand = input.brand.clone();
                m.last4 = input.last4.clone();
                m.exp_month = input.exp_month;
                m.exp_year = input.exp_year;
                m.clone()
            }
            None => {
                let m = PaymentMethod {
                    id: Uuid::new_v4(),
                    tenant_id,
                    gateway_payment_method_id: input.gateway_payment_method_id.clone(),
                    kind: input.kind,
                    brand: input.brand.clone(),
                    last4: input.last4.clone(),
                    exp_month: input.exp_month,
                    exp_year: input.exp_year,
                    is_default: false,
                    created_at: Utc::now(),
                };
                methods.insert(m.id, m.clone());
                m
            }
        };
        Ok(method)
    }

    async fn set_default(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()> {
        let mut methods = self.methods.lock().unwrap();
        if !methods.get(&id).is_some_and(|m| m.tenant_id == tenant_id) {
            return Err(AppError::NotFound);
        }
        for m in methods.values_mut().filter(|m| m.tenant_id == tenant_id) {
            m.is_default = m.id == id;
        }
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()> {
        let mut methods = self.methods.lock().unwrap();
        match methods.get(&id) {
            Some(m) if m.tenant_id == tenant_id => {
                methods.remove(&id);
                Ok(())
            }
            _ => Err(AppError::NotFound),
        }
    }

    async fn list_cards_expiring(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<PaymentMethod>> {
        let rows: Vec<PaymentMethod> = self
            .methods
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.kind == PaymentMethodKind::Card)
            .filter(|m| {
                let month = m
                    .exp_year
                    .zip(m.exp_month)
                    .and_then(|(y, mo)| NaiveDate::from_ymd_opt(y, u32::try_from(mo).ok()?, 1));
                month.is_some_and(|d| d >= from && d <= to)
            })
            .cloned()
            .collect();
        Ok(page(rows, |m| m.id, after, limit))
    }
}

// ============================================================================
// InMemoryInvoiceRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryInvoiceRepo {
    pub invoices: Mutex<Vec<Invoice>>,
}

impl InMemoryInvoiceRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceRepo for InMemoryInvoiceRepo {
    async fn get_by_gateway_id(&self, gateway_invoice_id: &str) -> AppResult<Option<Invoice>> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.gateway_invoice_id == gateway_invoice_id)
            .cloned())
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<Invoice>> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_paid(&self, input: &NewPaidInvoice) -> AppResult<Invoice> {
        let mut invoices = self.invoices.lock().unwrap();
        if let Some(existing) = invoices
            .iter()
            .find(|i| i.gateway_invoice_id == input.invoice.id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let prefix = invoice_number_prefix(now);
        let last = invoices
            .iter()
            .map(|i| i.invoice_number.as_str())
            .filter(|n| n.starts_with(&prefix))
            .max();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            subscription_id: input.subscription_id,
            invoice_number: next_invoice_number(now, last),
            gateway_invoice_id: input.invoice.id.clone(),
            status: InvoiceStatus::Paid,
            net_amount: input.invoice.net_amount,
            vat_amount: input.invoice.vat_amount,
            gross_amount: input.invoice.gross_amount,
            currency: input.invoice.currency.clone(),
            issued_at: now,
            paid_at: input.invoice.paid_at.or(Some(now)),
        };
        invoices.push(invoice.clone());
        Ok(invoice)
    }

    async fn mark_paid(&self, id: Uuid, input: &NewPaidInvoice) -> AppResult<Invoice> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(AppError::NotFound)?;
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_at = input.invoice.paid_at.or(Some(Utc::now()));
        Ok(invoice.clone())
    }
}

// ============================================================================
// InMemoryGatewayEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryGatewayEventRepo {
    pub processed: Mutex<HashSet<String>>,
}

impl InMemoryGatewayEventRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GatewayEventRepo for InMemoryGatewayEventRepo {
    async fn claim(&self, event_id: &str, _event_type: &str) -> AppResult<bool> {
        Ok(self.processed.lock().unwrap().insert(event_id.to_string()))
    }

    async fn release(&self, event_id: &str) -> AppResult<()> {
        self.processed.lock().unwrap().remove(event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_subscription;

    #[tokio::test]
    async fn keyset_paging_visits_every_row_once() {
        let repo = InMemorySubscriptionRepo::new();
        let now = Utc::now();
        for _ in 0..7 {
            repo.insert(create_test_subscription(|s| {
                s.gateway_status = GatewayStatus::Trialing;
                s.trial_ends_at = Some(now);
            }));
        }

        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let batch = repo.list_expired_trials(now, after, 3).await.unwrap();
            let Some(last) = batch.last() else { break };
            after = Some(last.id);
            seen.extend(batch.iter().map(|s| s.id));
        }
        let mut unique = seen.clone();
        unique.dedup();
        assert_eq!(seen.len(), 7);
        assert_eq!(unique.len(), 7);
    }

    #[tokio::test]
    async fn latest_row_is_current() {
        let repo = InMemorySubscriptionRepo::new();
        let tenant = Uuid::new_v4();
        let first = repo.insert(create_test_subscription(|s| s.tenant_id = tenant));
        let second = repo.insert(create_test_subscription(|s| {
            s.tenant_id = tenant;
            s.created_at = first.created_at;
        }));

        let current = repo.current_for_tenant(tenant).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
    }
}
