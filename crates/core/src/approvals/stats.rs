use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::order::PurchaseOrder;

pub const DEFAULT_URGENT_AFTER_DAYS: i64 = 3;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStats {
    pub pending_count: usize,
    pub urgent_count: usize,
    pub average_wait_days: i64,
    pub pending_amount: Decimal,
}

/// Whole days an order has been waiting, any started day counting as a full one.
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed = (now - created_at).num_milliseconds().abs();
    (elapsed + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

/// Aggregates the orders a user is allowed to act on. Per-order ages are rounded up;
/// their mean is rounded half away from zero.
pub fn summarize(
    orders: &[PurchaseOrder],
    now: DateTime<Utc>,
    urgent_after_days: i64,
) -> ApprovalStats {
    if orders.is_empty() {
        return ApprovalStats::default();
    }

    let ages: Vec<i64> = orders.iter().map(|order| age_in_days(order.created_at, now)).collect();
    let urgent_count = ages.iter().filter(|age| **age >= urgent_after_days).count();
    let total_age: i64 = ages.iter().sum();
    let mean = Decimal::from(total_age) / Decimal::from(ages.len() as i64);
    let average_wait_days = mean
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or_default();
    let pending_amount = orders.iter().map(|order| order.total_amount).sum();

    ApprovalStats {
        pending_count: orders.len(),
        urgent_count,
        average_wait_days,
        pending_amount,
    }
}
