// src/services/deduction.rs
use crate::error::BillingError;

/// Outcome of splitting a charge between the token pool and paid credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deduction {
    /// Tokens to subtract from the allowance cycle.
    pub tokens_consumed: i64,
    /// Micro-dollars to subtract from the account credit balance.
    pub credit_charged: i64,
}

/// Split `units` of usage between the remaining token allowance and paid
/// credit. Tokens cover whole units only; a unit the pool cannot fully
/// cover falls through to credit at `credit_per_unit`.
///
/// A non-positive `token_per_unit` means the cost type is not token
/// eligible and the whole charge lands on credit.
pub fn compute_deduction(
    tokens_remaining: i64,
    units: i64,
    token_per_unit: i64,
    credit_per_unit: i64,
) -> Deduction {
    if units <= 0 {
        return Deduction {
            tokens_consumed: 0,
            credit_charged: 0,
        };
    }
    if token_per_unit <= 0 {
        return Deduction {
            tokens_consumed: 0,
            credit_charged: units * credit_per_unit,
        };
    }

    let remaining = tokens_remaining.max(0);
    let units_covered = (remaining / token_per_unit).min(units);
    let units_short = units - units_covered;

    Deduction {
        tokens_consumed: units_covered * token_per_unit,
        credit_charged: units_short * credit_per_unit,
    }
}

/// Gate a computed deduction against the account's credit balance.
/// Called before any row is written, so a rejection leaves the cycle
/// and the balance untouched. Unlimited plans may overdraft.
pub fn authorize_deduction(
    deduction: &Deduction,
    balance_credit: i64,
    bypass_balance_check: bool,
) -> Result<(), BillingError> {
    if deduction.credit_charged > 0
        && !bypass_balance_check
        && balance_credit < deduction.credit_charged
    {
        return Err(BillingError::InsufficientBalance {
            required: deduction.credit_charged,
            available: balance_credit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_token_coverage() {
        let d = compute_deduction(1_000, 10, 1, 4_500);
        assert_eq!(d.tokens_consumed, 10);
        assert_eq!(d.credit_charged, 0);
    }

    #[test]
    fn partial_coverage_whole_units_only() {
        // 25 tokens remaining cover 2 whole units at 10 tokens each; the
        // third unit is paid in credit.
        let d = compute_deduction(25, 3, 10, 4_500);
        assert_eq!(d.tokens_consumed, 20);
        assert_eq!(d.credit_charged, 4_500);
    }

    #[test]
    fn negative_remainder_treated_as_empty() {
        let d = compute_deduction(-5, 2, 10, 6_000);
        assert_eq!(d.tokens_consumed, 0);
        assert_eq!(d.credit_charged, 12_000);
    }

    #[test]
    fn pool_nearly_exhausted() {
        // total=1000 used=995: 5 tokens left cover 5 of 10 one-token
        // units, the rest is billed as credit.
        let d = compute_deduction(5, 10, 1, 4_500);
        assert_eq!(d.tokens_consumed, 5);
        assert_eq!(d.credit_charged, 22_500);
    }

    #[test]
    fn non_token_cost_types_charge_credit_only() {
        let d = compute_deduction(1_000, 3, 0, 8_000);
        assert_eq!(d.tokens_consumed, 0);
        assert_eq!(d.credit_charged, 24_000);
    }

    #[test]
    fn zero_units_is_free() {
        let d = compute_deduction(100, 0, 1, 4_500);
        assert_eq!(d.tokens_consumed, 0);
        assert_eq!(d.credit_charged, 0);
    }

    #[test]
    fn insufficient_credit_is_rejected_before_any_write() {
        // 25 tokens cover 2 of 3 units; the credit leg needs 4500 but
        // only 4000 is available, so the whole consumption is refused
        // and neither the cycle nor the balance moves.
        let d = compute_deduction(25, 3, 10, 4_500);
        let err = authorize_deduction(&d, 4_000, false).unwrap_err();
        match err {
            BillingError::InsufficientBalance {
                required,
                available,
            } => {
                assert_eq!(required, 4_500);
                assert_eq!(available, 4_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exact_balance_is_sufficient_at_consume_time() {
        let d = compute_deduction(0, 1, 10, 4_500);
        assert!(authorize_deduction(&d, 4_500, false).is_ok());
    }

    #[test]
    fn unlimited_plan_may_overdraft() {
        let d = compute_deduction(0, 2, 10, 6_000);
        assert!(authorize_deduction(&d, 0, true).is_ok());
        assert!(authorize_deduction(&d, -5_000, true).is_ok());
    }

    #[test]
    fn token_only_deduction_needs_no_credit() {
        let d = compute_deduction(1_000, 10, 1, 4_500);
        assert_eq!(d.credit_charged, 0);
        assert!(authorize_deduction(&d, 0, false).is_ok());
    }
}
