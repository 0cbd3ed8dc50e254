// src/models/allowance.rs
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monthly token pool for an account. At most one non-deleted cycle covers
/// any instant for a given account; the "current cycle" lookup is a query
/// predicate, not a constraint, so creation must go through the idempotent
/// ensure path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allowance {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub account_id: Uuid,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: DateTime<Utc>,
    pub tokens_total: i64,
    pub tokens_used: i64,
    pub tm_create: Option<DateTime<Utc>>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Allowance {
    pub fn tokens_remaining(&self) -> i64 {
        (self.tokens_total - self.tokens_used).max(0)
    }
}

/// Calendar-month boundaries containing `now`: `[first-of-month,
/// first-of-next-month)`.
pub fn compute_cycle_dates(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .unwrap();
    let (end_year, end_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let end = Utc.with_ymd_and_hms(end_year, end_month, 1, 0, 0, 0).unwrap();
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_dates_middle_of_month() {
        let now = Utc.with_ymd_and_hms(2026, 2, 14, 15, 30, 0).unwrap();
        let (start, end) = compute_cycle_dates(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn cycle_dates_first_of_month() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (start, end) = compute_cycle_dates(now);
        assert_eq!(start, now);
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn cycle_dates_december_rolls_to_next_year() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap();
        let (start, end) = compute_cycle_dates(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn cycle_dates_february_non_leap() {
        let now = Utc.with_ymd_and_hms(2027, 2, 28, 12, 0, 0).unwrap();
        let (start, end) = compute_cycle_dates(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2027, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2027, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn tokens_remaining_clamps_to_zero() {
        let mut allowance = Allowance {
            id: Uuid::nil(),
            customer_id: Uuid::nil(),
            account_id: Uuid::nil(),
            cycle_start: Utc::now(),
            cycle_end: Utc::now(),
            tokens_total: 1_000,
            tokens_used: 200,
            tm_create: None,
            tm_update: None,
            tm_delete: None,
        };
        assert_eq!(allowance.tokens_remaining(), 800);

        // Over-consumption from a concurrent writer must not yield a
        // negative remainder.
        allowance.tokens_used = 1_200;
        assert_eq!(allowance.tokens_remaining(), 0);
    }
}
