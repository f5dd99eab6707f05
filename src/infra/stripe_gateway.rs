use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CustomerId, GatewayEvent, GatewayEventKind, NewRemoteSubscription, PaymentGatewayPort,
        ProrationBehavior, RemoteInvoice, RemoteSubscription, SubscriptionId,
    },
    domain::entities::{invoice::InvoiceStatus, subscription::GatewayStatus, tenant::Tenant},
    infra::stripe_client::{
        StripeClient, StripeInvoice, StripeSubscription, StripeWebhookEvent,
        verify_webhook_signature,
    },
};

/// `PaymentGatewayPort` backed by Stripe.
#[derive(Clone)]
pub struct StripeGateway {
    client: StripeClient,
    webhook_secret: SecretString,
    tolerance_secs: i64,
}

impl StripeGateway {
    pub fn new(client: StripeClient, webhook_secret: SecretString, tolerance_secs: i64) -> Self {
        Self {
            client,
            webhook_secret,
            tolerance_secs,
        }
    }

    fn timestamp(ts: Option<i64>) -> Option<DateTime<Utc>> {
        ts.and_then(|t| DateTime::from_timestamp(t, 0))
    }

    fn cents(amount: i64) -> Decimal {
        Decimal::new(amount, 2)
    }

    fn to_remote_subscription(sub: StripeSubscription) -> AppResult<RemoteSubscription> {
        let status = GatewayStatus::from_gateway(&sub.status).ok_or_else(|| {
            AppError::Billing(format!(
                "Subscription {} has unrecognised status '{}'",
                sub.id, sub.status
            ))
        })?;
        Ok(RemoteSubscription {
            status,
            price_id: sub.price_id(),
            current_period_end: Self::timestamp(sub.period_end()),
            trial_end: Self::timestamp(sub.trial_end),
            cancel_at_period_end: sub.cancel_at_period_end,
            ended_at: Self::timestamp(sub.ended_at.or(sub.canceled_at))
                .filter(|_| sub.status == "canceled"),
            id: SubscriptionId::new(sub.id),
            customer_id: CustomerId::new(sub.customer),
        })
    }

    /// Event payloads that can never be processed are not worth a redelivery.
    fn event_subscription(event: &StripeWebhookEvent) -> AppResult<RemoteSubscription> {
        Self::to_remote_subscription(event.subscription()?).map_err(|e| match e {
            AppError::Billing(message) => AppError::InvalidInput(message),
            other => other,
        })
    }

    fn to_remote_invoice(invoice: StripeInvoice) -> RemoteInvoice {
        let tax = invoice.tax.unwrap_or(0);
        let net = invoice.total_excluding_tax.unwrap_or(invoice.total - tax);
        let status = match invoice.status.as_deref() {
            Some("paid") => InvoiceStatus::Paid,
            Some("void") | Some("uncollectible") => InvoiceStatus::Void,
            Some("draft") => InvoiceStatus::Draft,
            _ => InvoiceStatus::Open,
        };
        RemoteInvoice {
            customer_id: CustomerId::new(invoice.customer),
            subscription_id: invoice.subscription.map(SubscriptionId::new),
            status,
            net_amount: Self::cents(net),
            vat_amount: Self::cents(tax),
            gross_amount: Self::cents(invoice.total),
            currency: invoice.currency.to_uppercase(),
            created_at: Self::timestamp(Some(invoice.created)).unwrap_or_else(Utc::now),
            paid_at: Self::timestamp(invoice.status_transitions.and_then(|t| t.paid_at)),
            id: invoice.id,
        }
    }

    /// Translate a verified Stripe event into a gateway-neutral one.
    pub fn translate_event(event: StripeWebhookEvent) -> AppResult<GatewayEvent> {
        let kind = match event.event_type.as_str() {
            "customer.subscription.created" | "customer.subscription.updated" => {
                GatewayEventKind::SubscriptionUpdated(Self::event_subscription(&event)?)
            }
            "customer.subscription.deleted" => {
                GatewayEventKind::SubscriptionDeleted(Self::event_subscription(&event)?)
            }
            "invoice.payment_failed" => {
                let invoice = event.invoice()?;
                GatewayEventKind::InvoicePaymentFailed {
                    customer_id: CustomerId::new(invoice.customer),
                    subscription_id: invoice.subscription.map(SubscriptionId::new),
                    attempt_count: invoice.attempt_count,
                }
            }
            "invoice.paid" | "invoice.payment_succeeded" => {
                GatewayEventKind::InvoicePaid(Self::to_remote_invoice(event.invoice()?))
            }
            other => GatewayEventKind::Ignored {
                event_type: other.to_string(),
            },
        };
        Ok(GatewayEvent { id: event.id, kind })
    }
}

#[async_trait]
impl PaymentGatewayPort for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_customer(&self, tenant: &Tenant) -> AppResult<CustomerId> {
        let customer = self
            .client
            .create_customer(
                &tenant.owner_email,
                &tenant.name,
                &[("tenant_id", tenant.id.to_string())],
            )
            .await?;
        Ok(CustomerId::new(customer.id))
    }

    async fn create_subscription(
        &self,
        params: &NewRemoteSubscription,
    ) -> AppResult<RemoteSubscription> {
        let sub = self
            .client
            .create_subscription(
                params.customer_id.as_str(),
                &params.price_id,
                params.trial_days,
                params.payment_method_id.as_deref(),
            )
            .await?;
        Self::to_remote_subscription(sub)
    }

    async fn get_subscription(
        &self,
        id: &SubscriptionId,
    ) -> AppResult<Option<RemoteSubscription>> {
        let sub = self.client.get_subscription(id.as_str()).await?;
        sub.map(Self::to_remote_subscription).transpose()
    }

    async fn swap_price(
        &self,
        id: &SubscriptionId,
        price_id: &str,
        proration: ProrationBehavior,
    ) -> AppResult<RemoteSubscription> {
        let current = self
            .client
            .get_subscription(id.as_str())
            .await?
            .ok_or_else(|| AppError::Billing(format!("No such subscription: {}", id)))?;
        let item_id = current
            .first_item()
            .map(|item| item.id.clone())
            .ok_or_else(|| AppError::Billing(format!("Subscription {} has no items", id)))?;

        let sub = self
            .client
            .update_subscription(
                id.as_str(),
                &[
                    ("items[0][id]", item_id),
                    ("items[0][price]", price_id.to_string()),
                    ("proration_behavior", proration.as_str().to_string()),
                ],
            )
            .await?;
        Self::to_remote_subscription(sub)
    }

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<RemoteSubscription> {
        let sub = self
            .client
            .cancel_subscription(id.as_str(), at_period_end)
            .await?;
        Self::to_remote_subscription(sub)
    }

    async fn resume_subscription(&self, id: &SubscriptionId) -> AppResult<RemoteSubscription> {
        let sub = self
            .client
            .update_subscription(id.as_str(), &[("cancel_at_period_end", "false".to_string())])
            .await?;
        Self::to_remote_subscription(sub)
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

        let event: StripeWebhookEvent = serde_json::from_str(payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed webhook payload: {}", e)))?;
        Self::translate_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{http_client::try_build_client, stripe_client::sign_webhook_payload};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    const SECRET: &str = "whsec_test";

    fn gateway() -> StripeGateway {
        let client = StripeClient::new(
            try_build_client(Duration::from_secs(1)).unwrap(),
            SecretString::new("sk_test".into()),
        );
        StripeGateway::new(client, SecretString::new(SECRET.into()), 300)
    }

    fn signed(payload: &serde_json::Value) -> (String, String) {
        let body = payload.to_string();
        let header = sign_webhook_payload(&body, SECRET, Utc::now().timestamp());
        (body, header)
    }

    fn subscription_object(status: &str) -> serde_json::Value {
        json!({
            "id": "sub_123",
            "customer": "cus_123",
            "status": status,
            "current_period_end": 1_800_000_000,
            "cancel_at_period_end": true,
            "trial_end": null,
            "items": {"data": [{"id": "si_1", "price": {"id": "price_pro_monthly"}}]}
        })
    }

    #[test]
    fn subscription_updated_maps_to_remote_subscription() {
        let (body, header) = signed(&json!({
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "data": {"object": subscription_object("past_due")}
        }));

        let event = gateway().parse_webhook(&body, Some(&header)).unwrap();
        assert_eq!(event.id, "evt_1");
        match event.kind {
            GatewayEventKind::SubscriptionUpdated(remote) => {
                assert_eq!(remote.id.as_str(), "sub_123");
                assert_eq!(remote.status, GatewayStatus::PastDue);
                assert_eq!(remote.price_id.as_deref(), Some("price_pro_monthly"));
                assert!(remote.cancel_at_period_end);
                assert!(remote.current_period_end.is_some());
                assert!(remote.ended_at.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn subscription_deleted_carries_end_date() {
        let mut object = subscription_object("canceled");
        object["ended_at"] = json!(1_750_000_000);
        let (body, header) = signed(&json!({
            "id": "evt_2",
            "type": "customer.subscription.deleted",
            "data": {"object": object}
        }));

        let event = gateway().parse_webhook(&body, Some(&header)).unwrap();
        match event.kind {
            GatewayEventKind::SubscriptionDeleted(remote) => {
                assert_eq!(remote.status, GatewayStatus::Canceled);
                assert_eq!(
                    remote.ended_at,
                    DateTime::from_timestamp(1_750_000_000, 0)
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn payment_failed_carries_attempt_count() {
        let (body, header) = signed(&json!({
            "id": "evt_3",
            "type": "invoice.payment_failed",
            "data": {"object": {
                "id": "in_1", "customer": "cus_123", "subscription": "sub_123",
                "status": "open", "currency": "eur", "total": 1190,
                "attempt_count": 2, "created": 1_700_000_000
            }}
        }));

        let event = gateway().parse_webhook(&body, Some(&header)).unwrap();
        assert_eq!(
            event.kind,
            GatewayEventKind::InvoicePaymentFailed {
                customer_id: CustomerId::new("cus_123"),
                subscription_id: Some(SubscriptionId::new("sub_123")),
                attempt_count: 2,
            }
        );
    }

    #[test]
    fn paid_invoice_amounts_are_converted_from_cents() {
        let (body, header) = signed(&json!({
            "id": "evt_4",
            "type": "invoice.paid",
            "data": {"object": {
                "id": "in_2", "customer": "cus_123", "subscription": "sub_123",
                "status": "paid", "currency": "eur", "total": 1190, "tax": 190,
                "total_excluding_tax": 1000, "created": 1_700_000_000,
                "status_transitions": {"paid_at": 1_700_000_100}
            }}
        }));

        let event = gateway().parse_webhook(&body, Some(&header)).unwrap();
        match event.kind {
            GatewayEventKind::InvoicePaid(invoice) => {
                assert_eq!(invoice.id, "in_2");
                assert_eq!(invoice.status, InvoiceStatus::Paid);
                assert_eq!(invoice.net_amount, dec!(10.00));
                assert_eq!(invoice.vat_amount, dec!(1.90));
                assert_eq!(invoice.gross_amount, dec!(11.90));
                assert_eq!(invoice.currency, "EUR");
                assert!(invoice.paid_at.is_some());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn unhandled_event_types_are_ignored() {
        let (body, header) = signed(&json!({
            "id": "evt_5",
            "type": "charge.refunded",
            "data": {"object": {}}
        }));

        let event = gateway().parse_webhook(&body, Some(&header)).unwrap();
        assert_eq!(
            event.kind,
            GatewayEventKind::Ignored {
                event_type: "charge.refunded".into()
            }
        );
    }

    #[test]
    fn missing_or_bad_signature_is_rejected() {
        let (body, _) = signed(&json!({"id": "evt_6", "type": "x", "data": {"object": {}}}));
        assert!(matches!(
            gateway().parse_webhook(&body, None),
            Err(AppError::InvalidSignature)
        ));
        assert!(matches!(
            gateway().parse_webhook(&body, Some("t=1,v1=abc")),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn malformed_object_is_invalid_input() {
        let (body, header) = signed(&json!({
            "id": "evt_7",
            "type": "customer.subscription.updated",
            "data": {"object": {"id": "sub_1"}}
        }));
        assert!(matches!(
            gateway().parse_webhook(&body, Some(&header)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn unrecognised_subscription_status_is_rejected() {
        let (body, header) = signed(&json!({
            "id": "evt_8",
            "type": "customer.subscription.updated",
            "data": {"object": subscription_object("on_hold")}
        }));
        match gateway().parse_webhook(&body, Some(&header)) {
            Err(AppError::InvalidInput(message)) => assert!(message.contains("on_hold")),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
