use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    app_error::AppResult,
    application::ports::{
        notifier::BillingNotifier,
        payment_gateway::{CustomerId, GatewayEventKind, RemoteInvoice, RemoteSubscription},
    },
    domain::entities::{
        notification::{BillingNotification, NotificationKind},
        subscription::{GatewayStatus, Subscription},
    },
};

use super::{
    billing_adapter::BillingAdapter,
    invoices::{InvoiceLedger, NewPaidInvoice},
    reconciliation::ReconciliationJobs,
    subscription::{SubscriptionRepo, SubscriptionUseCases, TenantRepo},
};

/// Gateway event ids already taken by a delivery.
#[async_trait]
pub trait GatewayEventRepo: Send + Sync {
    /// Record the event id. `false` when another delivery claimed it first.
    async fn claim(&self, event_id: &str, event_type: &str) -> AppResult<bool>;

    /// Drop a claim so a redelivery runs the handlers again.
    async fn release(&self, event_id: &str) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
}

#[derive(Clone)]
pub struct GatewayWebhookUseCases {
    billing: BillingAdapter,
    events: Arc<dyn GatewayEventRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    tenants: Arc<dyn TenantRepo>,
    lifecycle: SubscriptionUseCases,
    jobs: ReconciliationJobs,
    ledger: InvoiceLedger,
    notifier: Arc<dyn BillingNotifier>,
}

impl GatewayWebhookUseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        billing: BillingAdapter,
        events: Arc<dyn GatewayEventRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        tenants: Arc<dyn TenantRepo>,
        lifecycle: SubscriptionUseCases,
        jobs: ReconciliationJobs,
        ledger: InvoiceLedger,
        notifier: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            billing,
            events,
            subscriptions,
            tenants,
            lifecycle,
            jobs,
            ledger,
            notifier,
        }
    }

    /// Verify, deduplicate and apply one gateway webhook delivery.
    ///
    /// The event id is claimed before any handler runs, so concurrent
    /// deliveries of one event act once. Retryable failures give the claim
    /// back for the gateway's redelivery.
    pub async fn handle(&self, payload: &str, signature: Option<&str>) -> AppResult<WebhookOutcome> {
        let event = self.billing.gateway().parse_webhook(payload, signature)?;
        let event_type = event.kind.name().to_string();
        if !self.events.claim(&event.id, &event_type).await? {
            info!(event_id = %event.id, "Duplicate gateway event");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.apply(event.kind).await {
            Ok(outcome) => {
                info!(event_id = %event.id, event_type = %event_type, outcome = ?outcome, "Gateway event handled");
                Ok(outcome)
            }
            Err(e) => {
                if e.is_retryable()
                    && let Err(release_err) = self.events.release(&event.id).await
                {
                    warn!(event_id = %event.id, error = %release_err, "Failed to release gateway event claim");
                }
                Err(e)
            }
        }
    }

    async fn apply(&self, kind: GatewayEventKind) -> AppResult<WebhookOutcome> {
        match kind {
            GatewayEventKind::SubscriptionUpdated(remote) => {
                self.on_subscription_updated(remote).await
            }
            GatewayEventKind::SubscriptionDeleted(remote) => {
                self.on_subscription_deleted(remote).await
            }
            GatewayEventKind::InvoicePaymentFailed {
                customer_id,
                attempt_count,
                ..
            } => self.on_payment_failed(&customer_id, attempt_count).await,
            GatewayEventKind::InvoicePaid(invoice) => self.on_invoice_paid(invoice).await,
            GatewayEventKind::Ignored { .. } => Ok(WebhookOutcome::Ignored),
        }
    }

    /// Local row for a remote subscription, if it is still the tenant's current one.
    async fn current_local(&self, remote: &RemoteSubscription) -> AppResult<Option<Subscription>> {
        let Some(local) = self
            .subscriptions
            .get_by_gateway_id(remote.id.as_str())
            .await?
        else {
            warn!(gateway_subscription_id = %remote.id, "Event for unknown subscription");
            return Ok(None);
        };
        let current = self
            .subscriptions
            .current_for_tenant(local.tenant_id)
            .await?;
        Ok(current.filter(|c| c.id == local.id))
    }

    async fn on_subscription_updated(&self, remote: RemoteSubscription) -> AppResult<WebhookOutcome> {
        let Some(local) = self.current_local(&remote).await? else {
            return Ok(WebhookOutcome::Ignored);
        };

        let mut updated = local;
        updated.gateway_status = remote.status;
        updated.trial_ends_at = remote.trial_end;
        updated.ends_at = if remote.cancel_at_period_end {
            remote.current_period_end
        } else if remote.status == GatewayStatus::Canceled {
            remote.ended_at.or_else(|| Some(Utc::now()))
        } else {
            None
        };
        self.subscriptions.update(&updated).await?;
        Ok(WebhookOutcome::Processed)
    }

    async fn on_subscription_deleted(&self, remote: RemoteSubscription) -> AppResult<WebhookOutcome> {
        let Some(local) = self.current_local(&remote).await? else {
            return Ok(WebhookOutcome::Ignored);
        };

        self.lifecycle.downgrade_to_free(&local, false).await?;
        let notification = BillingNotification::new(
            local.tenant_id,
            NotificationKind::SubscriptionEnded,
            serde_json::json!({ "gateway_subscription_id": remote.id }),
        );
        if let Err(e) = self.notifier.dispatch(notification).await {
            warn!(tenant_id = %local.tenant_id, error = %e, "Failed to dispatch notification");
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn on_payment_failed(
        &self,
        customer_id: &CustomerId,
        attempt_count: i32,
    ) -> AppResult<WebhookOutcome> {
        let Some(tenant) = self
            .tenants
            .get_by_gateway_customer_id(customer_id.as_str())
            .await?
        else {
            warn!(customer_id = %customer_id, "Payment failure for unknown customer");
            return Ok(WebhookOutcome::Ignored);
        };
        self.jobs
            .handle_payment_failure(tenant.id, attempt_count)
            .await?;
        Ok(WebhookOutcome::Processed)
    }

    async fn on_invoice_paid(&self, invoice: RemoteInvoice) -> AppResult<WebhookOutcome> {
        let Some(tenant) = self
            .tenants
            .get_by_gateway_customer_id(invoice.customer_id.as_str())
            .await?
        else {
            warn!(customer_id = %invoice.customer_id, "Invoice for unknown customer");
            return Ok(WebhookOutcome::Ignored);
        };

        let subscription_id = match &invoice.subscription_id {
            Some(id) => self
                .subscriptions
                .get_by_gateway_id(id.as_str())
                .await?
                .map(|s| s.id),
            None => None,
        };
        self.ledger
            .record_paid_invoice(NewPaidInvoice {
                tenant_id: tenant.id,
                subscription_id,
                invoice,
            })
            .await?;
        Ok(WebhookOutcome::Processed)
    }
}
