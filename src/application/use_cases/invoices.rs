use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::RemoteInvoice,
    domain::entities::invoice::{Invoice, InvoiceStatus},
};

#[derive(Debug, Clone)]
pub struct NewPaidInvoice {
    pub tenant_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub invoice: RemoteInvoice,
}

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    async fn get_by_gateway_id(&self, gateway_invoice_id: &str) -> AppResult<Option<Invoice>>;
    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<Invoice>>;
    /// Store a paid invoice. The next `INV-YYYYMM-NNNN` number is allocated
    /// while holding a lock on the month's latest invoice.
    async fn insert_paid(&self, input: &NewPaidInvoice) -> AppResult<Invoice>;
    /// Promote an unpaid row to paid, keeping its number.
    async fn mark_paid(&self, id: Uuid, input: &NewPaidInvoice) -> AppResult<Invoice>;
}

#[derive(Clone)]
pub struct InvoiceLedger {
    repo: Arc<dyn InvoiceRepo>,
}

impl InvoiceLedger {
    pub fn new(repo: Arc<dyn InvoiceRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, tenant_id: Uuid) -> AppResult<Vec<Invoice>> {
        self.repo.list_by_tenant(tenant_id).await
    }

    /// Record a gateway invoice as paid. Recording it again returns the stored row.
    pub async fn record_paid_invoice(&self, input: NewPaidInvoice) -> AppResult<Invoice> {
        if input.invoice.paid_at.is_none() && input.invoice.status != InvoiceStatus::Paid {
            return Err(AppError::InvalidInput(format!(
                "Invoice {} is not paid",
                input.invoice.id
            )));
        }

        match self.repo.get_by_gateway_id(&input.invoice.id).await? {
            Some(existing) if existing.status.is_terminal() => Ok(existing),
            Some(existing) => self.repo.mark_paid(existing.id, &input).await,
            None => {
                let invoice = self.repo.insert_paid(&input).await?;
                info!(
                    tenant_id = %invoice.tenant_id,
                    invoice_number = %invoice.invoice_number,
                    gross = %invoice.gross_amount,
                    "Recorded paid invoice"
                );
                Ok(invoice)
            }
        }
    }
}
