use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    domain::entities::invoice::{
        Invoice, InvoiceStatus, invoice_lock_key, invoice_number_prefix, next_invoice_number,
    },
    use_cases::invoices::{InvoiceRepo, NewPaidInvoice},
};

fn row_to_invoice(row: PgRow) -> Invoice {
    Invoice {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        subscription_id: row.get("subscription_id"),
        invoice_number: row.get("invoice_number"),
        gateway_invoice_id: row.get("gateway_invoice_id"),
        status: row.get("status"),
        net_amount: row.get("net_amount"),
        vat_amount: row.get("vat_amount"),
        gross_amount: row.get("gross_amount"),
        currency: row.get("currency"),
        issued_at: row.get("issued_at"),
        paid_at: row.get("paid_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, tenant_id, subscription_id, invoice_number, gateway_invoice_id, status,
    net_amount, vat_amount, gross_amount, currency, issued_at, paid_at
"#;

#[async_trait]
impl InvoiceRepo for PostgresPersistence {
    async fn get_by_gateway_id(&self, gateway_invoice_id: &str) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE gateway_invoice_id = $1",
            SELECT_COLS
        ))
        .bind(gateway_invoice_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_invoice))
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE tenant_id = $1 ORDER BY issued_at DESC, invoice_number DESC",
            SELECT_COLS
        ))
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_invoice).collect())
    }

    async fn insert_paid(&self, input: &NewPaidInvoice) -> AppResult<Invoice> {
        let now = Utc::now();
        let prefix = invoice_number_prefix(now);
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        // Held until commit, including for the first invoice of a month.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(invoice_lock_key(now))
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        let last: Option<String> = sqlx::query_scalar(
            r#"SELECT invoice_number FROM invoices
               WHERE invoice_number LIKE $1 || '%'
               ORDER BY invoice_number DESC
               LIMIT 1"#,
        )
        .bind(&prefix)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let number = next_invoice_number(now, last.as_deref());
        let remote = &input.invoice;

        let row = sqlx::query(&format!(
            r#"INSERT INTO invoices
                   (id, tenant_id, subscription_id, invoice_number, gateway_invoice_id, status,
                    net_amount, vat_amount, gross_amount, currency, issued_at, paid_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               ON CONFLICT (gateway_invoice_id) DO NOTHING
               RETURNING {}"#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.subscription_id)
        .bind(&number)
        .bind(&remote.id)
        .bind(InvoiceStatus::Paid)
        .bind(remote.net_amount)
        .bind(remote.vat_amount)
        .bind(remote.gross_amount)
        .bind(&remote.currency)
        .bind(now)
        .bind(remote.paid_at.unwrap_or(now))
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let invoice = match row {
            Some(row) => row_to_invoice(row),
            // Another delivery stored it first.
            None => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM invoices WHERE gateway_invoice_id = $1",
                    SELECT_COLS
                ))
                .bind(&remote.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
                row_to_invoice(row)
            }
        };

        tx.commit().await.map_err(AppError::from)?;
        Ok(invoice)
    }

    async fn mark_paid(&self, id: Uuid, input: &NewPaidInvoice) -> AppResult<Invoice> {
        let row = sqlx::query(&format!(
            r#"UPDATE invoices
               SET status = $2, paid_at = COALESCE($3, NOW())
               WHERE id = $1
               RETURNING {}"#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(InvoiceStatus::Paid)
        .bind(input.invoice.paid_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        row.map(row_to_invoice).ok_or(AppError::NotFound)
    }
}
