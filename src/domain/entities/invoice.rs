use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
}

impl InvoiceStatus {
    /// Paid invoices are never rewritten.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub invoice_number: String,
    pub gateway_invoice_id: String,
    pub status: InvoiceStatus,
    pub net_amount: Decimal,
    pub vat_amount: Decimal,
    pub gross_amount: Decimal,
    pub currency: String,
    pub issued_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Number prefix shared by every invoice issued in the month of `at`.
pub fn invoice_number_prefix(at: DateTime<Utc>) -> String {
    format!("INV-{:04}{:02}-", at.year(), at.month())
}

/// Advisory lock key serialising invoice numbering within one month.
pub fn invoice_lock_key(at: DateTime<Utc>) -> i64 {
    const NAMESPACE: i64 = 0x49_4e56; // "INV"
    (NAMESPACE << 32) | (i64::from(at.year()) * 100 + i64::from(at.month()))
}

/// Next number after `last` (the highest number issued this month, if any).
pub fn next_invoice_number(at: DateTime<Utc>, last: Option<&str>) -> String {
    let prefix = invoice_number_prefix(at);
    let next = last
        .and_then(|n| n.strip_prefix(prefix.as_str()))
        .and_then(|seq| seq.parse::<u32>().ok())
        .map_or(1, |seq| seq + 1);
    format!("{}{:04}", prefix, next)
}
