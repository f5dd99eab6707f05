//! Fake payment gateway and recording notifier.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        notifier::BillingNotifier,
        payment_gateway::{
            CustomerId, GatewayEvent, NewRemoteSubscription, PaymentGatewayPort,
            ProrationBehavior, RemoteSubscription, SubscriptionId,
        },
    },
    domain::entities::{
        notification::{BillingNotification, NotificationKind},
        subscription::GatewayStatus,
        tenant::Tenant,
    },
};

/// Signature value the fake gateway accepts on webhooks.
pub const FAKE_WEBHOOK_SIGNATURE: &str = "t=1,v1=fake";

// ============================================================================
// FakeGateway
// ============================================================================

#[derive(Default)]
pub struct FakeGateway {
    pub remotes: Mutex<HashMap<String, RemoteSubscription>>,
    pub swaps: Mutex<HashMap<String, (String, &'static str)>>,
    customers: AtomicUsize,
    created: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next gateway call fail with `message`.
    pub fn fail_next(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn customer_count(&self) -> usize {
        self.customers.load(Ordering::SeqCst)
    }

    pub fn remote(&self, id: &str) -> Option<RemoteSubscription> {
        self.remotes.lock().unwrap().get(id).cloned()
    }

    /// Price and proration behaviour of the latest swap on `id`.
    pub fn last_swap(&self, id: &str) -> Option<(String, &'static str)> {
        self.swaps.lock().unwrap().get(id).cloned()
    }

    pub fn register(&self, remote: RemoteSubscription) {
        self.remotes
            .lock()
            .unwrap()
            .insert(remote.id.as_str().to_string(), remote);
    }

    fn check_failure(&self) -> AppResult<()> {
        match self.failure.lock().unwrap().take() {
            Some(message) => Err(AppError::Billing(message)),
            None => Ok(()),
        }
    }

    fn mutate(
        &self,
        id: &SubscriptionId,
        f: impl FnOnce(&mut RemoteSubscription),
    ) -> AppResult<RemoteSubscription> {
        self.check_failure()?;
        let mut remotes = self.remotes.lock().unwrap();
        let remote = remotes
            .get_mut(id.as_str())
            .ok_or_else(|| AppError::Billing(format!("No such subscription: {}", id)))?;
        f(remote);
        Ok(remote.clone())
    }
}

#[async_trait]
impl PaymentGatewayPort for FakeGateway {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_customer(&self, tenant: &Tenant) -> AppResult<CustomerId> {
        self.check_failure()?;
        self.customers.fetch_add(1, Ordering::SeqCst);
        Ok(CustomerId::new(format!("cus_{}", tenant.id.simple())))
    }

    async fn create_subscription(
        &self,
        params: &NewRemoteSubscription,
    ) -> AppResult<RemoteSubscription> {
        self.check_failure()?;
        self.created.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        let trial_end = params
            .trial_days
            .map(|days| now + Duration::days(i64::from(days)));
        let remote = RemoteSubscription {
            id: SubscriptionId::new(format!("sub_{}", Uuid::new_v4().simple())),
            customer_id: params.customer_id.clone(),
            status: if trial_end.is_some() {
                GatewayStatus::Trialing
            } else {
                GatewayStatus::Active
            },
            price_id: Some(params.price_id.clone()),
            current_period_end: Some(trial_end.unwrap_or(now + Duration::days(30))),
            trial_end,
            cancel_at_period_end: false,
            ended_at: None,
        };
        self.register(remote.clone());
        Ok(remote)
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> AppResult<Option<RemoteSubscription>> {
        self.check_failure()?;
        Ok(self.remote(id.as_str()))
    }

    async fn swap_price(
        &self,
        id: &SubscriptionId,
        price_id: &str,
        proration: ProrationBehavior,
    ) -> AppResult<RemoteSubscription> {
        let remote = self.mutate(id, |r| r.price_id = Some(price_id.to_string()))?;
        self.swaps
            .lock()
            .unwrap()
            .insert(id.as_str().to_string(), (price_id.to_string(), proration.as_str()));
        Ok(remote)
    }

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<RemoteSubscription> {
        self.mutate(id, |r| {
            if at_period_end {
                r.cancel_at_period_end = true;
            } else {
                r.status = GatewayStatus::Canceled;
                r.cancel_at_period_end = false;
                r.ended_at = Some(Utc::now());
            }
        })
    }

    async fn resume_subscription(&self, id: &SubscriptionId) -> AppResult<RemoteSubscription> {
        self.mutate(id, |r| r.cancel_at_period_end = false)
    }

    fn parse_webhook(&self, payload: &str, signature: Option<&str>) -> AppResult<GatewayEvent> {
        if signature != Some(FAKE_WEBHOOK_SIGNATURE) {
            return Err(AppError::InvalidSignature);
        }
        serde_json::from_str(payload).map_err(|e| AppError::InvalidInput(e.to_string()))
    }
}

// ============================================================================
// InMemoryNotifier
// ============================================================================

#[derive(Default)]
pub struct InMemoryNotifier {
    pub sent: Mutex<Vec<BillingNotification>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every dispatch from now on.
    pub fn fail_with(&self, error: AppError) {
        *self.failure.lock().unwrap() = Some(error.to_string());
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.sent_of(kind).len()
    }

    pub fn sent_of(&self, kind: NotificationKind) -> Vec<BillingNotification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BillingNotifier for InMemoryNotifier {
    async fn dispatch(&self, notification: BillingNotification) -> AppResult<()> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(AppError::Internal(message));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
