use rust_decimal::Decimal;

use crate::policy::CapLimits;

/// Restrict `value` to `[-limit, +limit]`.
///
/// `limit` must be non-negative; [`crate::policy::EngineConfig::validate`]
/// rejects negative caps before any value reaches this function.
pub fn symmetric_clamp(value: Decimal, limit: Decimal) -> Decimal {
    debug_assert!(limit >= Decimal::ZERO, "cap limits are validated non-negative");
    value.min(limit).max(-limit)
}

/// `true` when `|total|` is strictly above `trigger`.
pub fn exceeds_trigger(total: Decimal, trigger: Decimal) -> bool {
    total.abs() > trigger
}

/// Threshold-gated payout: nothing is payable until `|total|` exceeds
/// `trigger`; once it does the whole total is payable, clamped to `±cap`.
///
/// Returns `None` below the trigger so callers can tell "not triggered" apart
/// from a legitimate zero payout.
pub fn threshold_gated_payout(total: Decimal, trigger: Decimal, cap: Decimal) -> Option<Decimal> {
    if exceeds_trigger(total, trigger) {
        Some(symmetric_clamp(total, cap))
    } else {
        None
    }
}

// ── Year 1 ────────────────────────────────────────────────────────────────────

/// Capped running totals for one insured in policy year 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Year1Totals {
    pub covid_amount: Decimal,
    pub general_amount: Decimal,
    pub total_amount: Decimal,
}

// ── CapCalculator ─────────────────────────────────────────────────────────────

/// Stateless collection of the year-dependent capping rules.
pub struct CapCalculator;

impl CapCalculator {
    /// Split one claim amount into `(covid, general)`.
    pub fn split_claim(amount: Decimal, is_covid: bool) -> (Decimal, Decimal) {
        let covid = if is_covid { amount } else { Decimal::ZERO };
        (covid, amount - covid)
    }

    /// Apply the year-1 caps to running totals.
    ///
    /// The running COVID amount is clamped to `±covid_cap`; the total is then
    /// recomputed from the clamped COVID amount and clamped to
    /// `±total_cap_year1`. The general amount is never clamped on its own.
    pub fn cap_year1(covid_running: Decimal, general_running: Decimal, limits: &CapLimits) -> Year1Totals {
        let covid_amount = symmetric_clamp(covid_running, limits.covid_cap);
        let total_amount = symmetric_clamp(covid_amount + general_running, limits.total_cap_year1);
        Year1Totals {
            covid_amount,
            general_amount: general_running,
            total_amount,
        }
    }

    /// Year-2 payout for a running total, or `None` below the trigger.
    pub fn payout_year2(total_running: Decimal, limits: &CapLimits) -> Option<Decimal> {
        threshold_gated_payout(total_running, limits.trigger_cap_year2, limits.total_cap_year2)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // ── symmetric_clamp ──────────────────────────────────────────────────────

    #[test]
    fn test_clamp_inside_range_is_identity() {
        assert_eq!(symmetric_clamp(dec!(150.25), dec!(2000)), dec!(150.25));
        assert_eq!(symmetric_clamp(dec!(-150.25), dec!(2000)), dec!(-150.25));
    }

    #[test]
    fn test_clamp_upper_and_lower_bounds() {
        assert_eq!(symmetric_clamp(dec!(15000), dec!(2000)), dec!(2000));
        assert_eq!(symmetric_clamp(dec!(-15000), dec!(2000)), dec!(-2000));
    }

    #[test]
    fn test_clamp_at_exact_limit() {
        assert_eq!(symmetric_clamp(dec!(2000), dec!(2000)), dec!(2000));
        assert_eq!(symmetric_clamp(dec!(-2000), dec!(2000)), dec!(-2000));
    }

    #[test]
    fn test_clamp_zero_limit() {
        assert_eq!(symmetric_clamp(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    // ── threshold_gated_payout ───────────────────────────────────────────────

    #[test]
    fn test_payout_not_triggered_at_threshold() {
        // Strictly greater than the trigger is required.
        assert_eq!(threshold_gated_payout(dec!(40000), dec!(40000), dec!(2000000)), None);
        assert_eq!(threshold_gated_payout(dec!(35000), dec!(40000), dec!(2000000)), None);
    }

    #[test]
    fn test_payout_triggered_above_threshold() {
        assert_eq!(
            threshold_gated_payout(dec!(45000), dec!(40000), dec!(2000000)),
            Some(dec!(45000))
        );
    }

    #[test]
    fn test_payout_capped() {
        assert_eq!(
            threshold_gated_payout(dec!(2500000), dec!(40000), dec!(2000000)),
            Some(dec!(2000000))
        );
    }

    #[test]
    fn test_payout_negative_total_uses_magnitude() {
        assert_eq!(
            threshold_gated_payout(dec!(-50000), dec!(40000), dec!(2000000)),
            Some(dec!(-50000))
        );
    }

    // ── CapCalculator ────────────────────────────────────────────────────────

    #[test]
    fn test_split_claim() {
        assert_eq!(CapCalculator::split_claim(dec!(15000), true), (dec!(15000), dec!(0)));
        assert_eq!(CapCalculator::split_claim(dec!(10000), false), (dec!(0), dec!(10000)));
    }

    #[test]
    fn test_cap_year1_covid_then_total() {
        let limits = CapLimits::default();
        let totals = CapCalculator::cap_year1(dec!(15000), dec!(10000), &limits);
        assert_eq!(totals.covid_amount, dec!(2000));
        assert_eq!(totals.general_amount, dec!(10000));
        assert_eq!(totals.total_amount, dec!(12000));
    }

    #[test]
    fn test_cap_year1_total_cap() {
        let limits = CapLimits::default();
        let totals = CapCalculator::cap_year1(dec!(1000), dec!(30000), &limits);
        assert_eq!(totals.general_amount, dec!(30000));
        assert_eq!(totals.total_amount, dec!(20000));
    }

    #[test]
    fn test_payout_year2_uses_limits() {
        let limits = CapLimits::default();
        assert_eq!(CapCalculator::payout_year2(dec!(35000), &limits), None);
        assert_eq!(CapCalculator::payout_year2(dec!(45000), &limits), Some(dec!(45000)));
    }
}
