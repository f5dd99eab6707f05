use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    application::helpers::money::round_money,
    domain::entities::{billing_cycle::BillingCycle, plan::Plan},
};

/// Plan-change price preview. Advisory only: the gateway computes the amount
/// it actually charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Proration {
    pub days_remaining: i64,
    pub credit: Decimal,
    pub charge: Decimal,
    pub total: Decimal,
}

impl Proration {
    pub fn zero() -> Self {
        Self {
            days_remaining: 0,
            credit: Decimal::ZERO,
            charge: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

pub fn daily_rate(plan: &Plan, cycle: BillingCycle) -> Decimal {
    plan.price(cycle) / cycle.proration_days()
}

/// Whole days left until `period_end`, never negative.
pub fn days_remaining(period_end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (period_end - now).num_days().max(0)
}

/// Credit for the unused part of the current plan against the charge for the
/// new plan over the same days. Never negative. No period end yields zeros.
pub fn calculate(
    current: (&Plan, BillingCycle),
    target: (&Plan, BillingCycle),
    period_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Proration {
    let Some(period_end) = period_end else {
        return Proration::zero();
    };

    let days = days_remaining(period_end, now);
    let remaining = Decimal::from(days);
    let credit = round_money(daily_rate(current.0, current.1) * remaining);
    let charge = round_money(daily_rate(target.0, target.1) * remaining);
    let total = round_money(charge - credit).max(Decimal::ZERO);

    Proration {
        days_remaining: days,
        credit,
        charge,
        total,
    }
}
