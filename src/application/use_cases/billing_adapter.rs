use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CustomerId, NewRemoteSubscription, PaymentGatewayPort, ProrationBehavior,
        RemoteSubscription, SubscriptionId,
    },
    domain::entities::{billing_cycle::BillingCycle, plan::Plan, subscription::Subscription},
};

use super::{payment_methods::PaymentMethodRepo, subscription::TenantRepo};

/// Collapse any failure from the gateway into `AppError::Billing`.
fn billing<T>(result: AppResult<T>) -> AppResult<T> {
    result.map_err(|e| match e {
        AppError::Billing(msg) => AppError::Billing(msg),
        other => AppError::Billing(other.to_string()),
    })
}

/// The only component that talks to the payment gateway.
#[derive(Clone)]
pub struct BillingAdapter {
    gateway: Arc<dyn PaymentGatewayPort>,
    tenants: Arc<dyn TenantRepo>,
    payment_methods: Arc<dyn PaymentMethodRepo>,
}

impl BillingAdapter {
    pub fn new(
        gateway: Arc<dyn PaymentGatewayPort>,
        tenants: Arc<dyn TenantRepo>,
        payment_methods: Arc<dyn PaymentMethodRepo>,
    ) -> Self {
        Self {
            gateway,
            tenants,
            payment_methods,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGatewayPort> {
        &self.gateway
    }

    pub fn resolve_price_id(&self, plan: &Plan, cycle: BillingCycle) -> AppResult<String> {
        plan.gateway_price_id(cycle)
            .map(str::to_string)
            .ok_or_else(|| AppError::PriceNotConfigured {
                plan: plan.slug.clone(),
                cycle,
            })
    }

    pub fn is_free_subscription(&self, sub: &Subscription) -> bool {
        sub.is_free()
    }

    fn remote_id(sub: &Subscription) -> SubscriptionId {
        SubscriptionId::new(sub.gateway_subscription_id.clone())
    }

    /// Gateway customer for the tenant, created on first use.
    pub async fn ensure_customer(&self, tenant_id: Uuid) -> AppResult<CustomerId> {
        let tenant = self
            .tenants
            .get_by_id(tenant_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if let Some(existing) = tenant.gateway_customer_id.as_deref() {
            return Ok(CustomerId::new(existing));
        }

        let customer = billing(self.gateway.create_customer(&tenant).await)?;
        self.tenants
            .set_gateway_customer_id(tenant_id, customer.as_str())
            .await?;
        info!(tenant_id = %tenant_id, customer_id = %customer, "Created gateway customer");
        Ok(customer)
    }

    /// Start a gateway-backed subscription for a tenant currently on the free plan.
    ///
    /// A default payment method is required unless the subscription starts
    /// with a trial.
    #[instrument(skip(self, plan), fields(plan = %plan.slug))]
    pub async fn create_paid_from_free(
        &self,
        tenant_id: Uuid,
        plan: &Plan,
        price_id: &str,
        with_trial: bool,
    ) -> AppResult<RemoteSubscription> {
        let default_method = self.payment_methods.get_default(tenant_id).await?;
        if default_method.is_none() && !with_trial {
            return Err(AppError::PaymentMethodRequired);
        }

        let customer_id = self.ensure_customer(tenant_id).await?;
        let params = NewRemoteSubscription {
            customer_id,
            price_id: price_id.to_string(),
            trial_days: (with_trial && plan.trial_days > 0).then_some(plan.trial_days),
            payment_method_id: default_method.map(|m| m.gateway_payment_method_id),
        };
        billing(self.gateway.create_subscription(&params).await)
    }

    /// Change price; the gateway prorates at its next cycle boundary.
    pub async fn swap(&self, sub: &Subscription, price_id: &str) -> AppResult<RemoteSubscription> {
        self.swap_with(sub, price_id, ProrationBehavior::CreateProrations)
            .await
    }

    /// Change price and invoice the proration immediately.
    pub async fn swap_and_invoice(
        &self,
        sub: &Subscription,
        price_id: &str,
    ) -> AppResult<RemoteSubscription> {
        self.swap_with(sub, price_id, ProrationBehavior::AlwaysInvoice)
            .await
    }

    async fn swap_with(
        &self,
        sub: &Subscription,
        price_id: &str,
        proration: ProrationBehavior,
    ) -> AppResult<RemoteSubscription> {
        if sub.is_free() {
            return Err(AppError::BusinessRule(
                "Free subscriptions have no gateway subscription to swap".into(),
            ));
        }
        billing(
            self.gateway
                .swap_price(&Self::remote_id(sub), price_id, proration)
                .await,
        )
    }

    /// `None` for free subscriptions.
    pub async fn cancel_at_period_end(
        &self,
        sub: &Subscription,
    ) -> AppResult<Option<RemoteSubscription>> {
        if sub.is_free() {
            return Ok(None);
        }
        billing(
            self.gateway
                .cancel_subscription(&Self::remote_id(sub), true)
                .await,
        )
        .map(Some)
    }

    /// `None` for free subscriptions.
    pub async fn cancel_now(&self, sub: &Subscription) -> AppResult<Option<RemoteSubscription>> {
        if sub.is_free() {
            return Ok(None);
        }
        billing(
            self.gateway
                .cancel_subscription(&Self::remote_id(sub), false)
                .await,
        )
        .map(Some)
    }

    /// Undo a pending cancellation. Returns false when there was nothing to resume.
    pub async fn resume_if_on_grace_period(&self, sub: &Subscription) -> AppResult<bool> {
        if sub.is_free() {
            return Ok(false);
        }
        let id = Self::remote_id(sub);
        let Some(remote) = billing(self.gateway.get_subscription(&id).await)? else {
            return Ok(false);
        };
        if !remote.on_grace_period(Utc::now()) {
            return Ok(false);
        }
        billing(self.gateway.resume_subscription(&id).await)?;
        Ok(true)
    }

    pub async fn current_period_end(&self, sub: &Subscription) -> AppResult<Option<DateTime<Utc>>> {
        if sub.is_free() {
            return Ok(None);
        }
        let remote = billing(self.gateway.get_subscription(&Self::remote_id(sub)).await)?;
        Ok(remote.and_then(|r| r.current_period_end))
    }
}
