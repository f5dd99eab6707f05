use chrono::{DateTime, NaiveDate, Utc};
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
#[sqlx(type_name = "payment_method_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentMethodKind {
    Card,
    SepaDebit,
}

/// A tenant payment method mirrored from the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub gateway_payment_method_id: String,
    pub kind: PaymentMethodKind,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    /// Last day a card can be charged. `None` for methods without an expiry.
    pub fn expires_on(&self) -> Option<NaiveDate> {
        let (year, month) = (self.exp_year?, u32::try_from(self.exp_month?).ok()?);
        let first_of_next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        first_of_next.pred_opt()
    }

    /// Days left before the card stops working; negative once expired.
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expires_on().map(|expiry| (expiry - today).num_days())
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires_on().is_some_and(|e| e < today)
    }
}
