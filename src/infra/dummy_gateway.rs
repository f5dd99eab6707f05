use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CustomerId, GatewayEvent, NewRemoteSubscription, PaymentGatewayPort, ProrationBehavior,
        RemoteSubscription, SubscriptionId,
    },
    domain::entities::{subscription::GatewayStatus, tenant::Tenant},
    infra::stripe_client::verify_webhook_signature,
};

/// Local gateway for development. Subscriptions live in memory and nothing is
/// charged.
///
/// Webhooks carry gateway-neutral `GatewayEvent` JSON, signed like Stripe
/// payloads with the configured webhook secret.
pub struct DummyGateway {
    subscriptions: Mutex<HashMap<String, RemoteSubscription>>,
    webhook_secret: SecretString,
    tolerance_secs: i64,
}

impl DummyGateway {
    pub fn new(webhook_secret: SecretString, tolerance_secs: i64) -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            webhook_secret,
            tolerance_secs,
        }
    }

    fn update(
        &self,
        id: &SubscriptionId,
        f: impl FnOnce(&mut RemoteSubscription),
    ) -> AppResult<RemoteSubscription> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| AppError::Internal("Dummy gateway state poisoned".into()))?;
        let remote = subscriptions
            .get_mut(id.as_str())
            .ok_or_else(|| AppError::Billing(format!("No such subscription: {}", id)))?;
        f(remote);
        Ok(remote.clone())
    }
}

#[async_trait]
impl PaymentGatewayPort for DummyGateway {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn create_customer(&self, tenant: &Tenant) -> AppResult<CustomerId> {
        Ok(CustomerId::new(format!("dummy_cus_{}", tenant.id.simple())))
    }

    async fn create_subscription(
        &self,
        params: &NewRemoteSubscription,
    ) -> AppResult<RemoteSubscription> {
        let now = Utc::now();
        let trial_end = params
            .trial_days
            .filter(|days| *days > 0)
            .map(|days| now + Duration::days(i64::from(days)));

        let remote = RemoteSubscription {
            id: SubscriptionId::new(format!("dummy_sub_{}", Uuid::new_v4().simple())),
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

        info!(subscription_id = %remote.id, price_id = %params.price_id, "Dummy subscription created");
        self.subscriptions
            .lock()
            .map_err(|_| AppError::Internal("Dummy gateway state poisoned".into()))?
            .insert(remote.id.as_str().to_string(), remote.clone());
        Ok(remote)
    }

    async fn get_subscription(
        &self,
        id: &SubscriptionId,
    ) -> AppResult<Option<RemoteSubscription>> {
        Ok(self
            .subscriptions
            .lock()
            .map_err(|_| AppError::Internal("Dummy gateway state poisoned".into()))?
            .get(id.as_str())
            .cloned())
    }

    async fn swap_price(
        &self,
        id: &SubscriptionId,
        price_id: &str,
        proration: ProrationBehavior,
    ) -> AppResult<RemoteSubscription> {
        info!(subscription_id = %id, price_id, proration = proration.as_str(), "Dummy price swap");
        self.update(id, |r| r.price_id = Some(price_id.to_string()))
    }

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<RemoteSubscription> {
        self.update(id, |r| {
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
        self.update(id, |r| r.cancel_at_period_end = false)
    }

    fn parse_webhook(&self, payload: &str, signature: Option<&str>) -> AppResult<GatewayEvent> {
        let signature = signature.ok_or(AppError::InvalidSignature)?;
        verify_webhook_signature(
            payload,
            signature,
            self.webhook_secret.expose_secret(),
            self.tolerance_secs,
            Utc::now(),
        )?;
        serde_json::from_str(payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed webhook payload: {}", e)))
    }
}
