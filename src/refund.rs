//! Tiered cancellation refund calculator.
//!
//! Pure function of the cancellation policy, the frozen total, and three
//! instants. Two clocks are deliberately in play and must not be conflated:
//! "days remaining" is computed on midnight-normalized calendar dates, so
//! cancelling at any time on the day N days before check-in counts as N days
//! before, while the strict policy's 48-hour grace window uses real elapsed
//! time since the booking was created.

use crate::types::{CancellationPolicy, Money};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Full refund, in basis points.
pub const FULL_REFUND_BP: u32 = 10_000;
/// Half refund, in basis points.
pub const HALF_REFUND_BP: u32 = 5_000;

/// Hours after booking creation during which the strict policy still refunds
/// in full (provided check-in is far enough away).
const STRICT_GRACE_HOURS: i64 = 48;
/// Minimum days before check-in for the strict grace window to apply.
const STRICT_GRACE_MIN_DAYS: i64 = 14;

/// Result of a refund calculation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refund {
    /// Refund rate in basis points (10 000 = 100%).
    pub rate_bp: u32,
    /// Refund amount, floored from `total × rate`.
    pub amount: Money,
    /// Short human-readable explanation of the applied tier.
    pub description: &'static str,
}

/// Computes the refund owed for a cancellation.
///
/// `cancelled_at` and `booked_at` are real instants; `check_in` is the
/// calendar date of the first night.
#[must_use]
pub fn calculate(
    policy: CancellationPolicy,
    total: Money,
    check_in: NaiveDate,
    cancelled_at: DateTime<Utc>,
    booked_at: DateTime<Utc>,
) -> Refund {
    let days_remaining = days_before_check_in(check_in, cancelled_at);

    let (rate_bp, description) = match policy {
        CancellationPolicy::Flexible => {
            if days_remaining >= 1 {
                (FULL_REFUND_BP, "flexible: full refund until 1 day before check-in")
            } else {
                (0, "flexible: no refund on or after the check-in day")
            }
        }
        CancellationPolicy::Moderate => {
            if days_remaining >= 5 {
                (FULL_REFUND_BP, "moderate: full refund until 5 days before check-in")
            } else if days_remaining >= 1 {
                (HALF_REFUND_BP, "moderate: half refund 1-4 days before check-in")
            } else {
                (0, "moderate: no refund on or after the check-in day")
            }
        }
        CancellationPolicy::Strict => {
            let within_grace = cancelled_at.signed_duration_since(booked_at)
                <= Duration::hours(STRICT_GRACE_HOURS);
            if within_grace && days_remaining >= STRICT_GRACE_MIN_DAYS {
                (FULL_REFUND_BP, "strict: full refund within 48h of booking")
            } else if days_remaining >= 7 {
                (HALF_REFUND_BP, "strict: half refund until 7 days before check-in")
            } else {
                (0, "strict: no refund under 7 days before check-in")
            }
        }
    };

    Refund {
        rate_bp,
        amount: total.apply_basis_points(rate_bp),
        description,
    }
}

/// Whole calendar days between the cancellation day and check-in, normalized
/// to midnight. Negative once check-in has passed.
fn days_before_check_in(check_in: NaiveDate, cancelled_at: DateTime<Utc>) -> i64 {
    (check_in - cancelled_at.date_naive()).num_days()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn instant(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap().and_utc()
    }

    const TOTAL: Money = Money::from_minor(100_000);

    #[test]
    fn flexible_full_refund_two_days_before() {
        let refund = calculate(
            CancellationPolicy::Flexible,
            TOTAL,
            date(2026, 3, 10),
            instant(2026, 3, 8, 23),
            instant(2026, 1, 1, 0),
        );
        assert_eq!(refund.rate_bp, FULL_REFUND_BP);
        assert_eq!(refund.amount, TOTAL);
    }

    #[test]
    fn flexible_no_refund_on_check_in_day() {
        let refund = calculate(
            CancellationPolicy::Flexible,
            TOTAL,
            date(2026, 3, 10),
            instant(2026, 3, 10, 0),
            instant(2026, 1, 1, 0),
        );
        assert_eq!(refund.rate_bp, 0);
        assert_eq!(refund.amount, Money::ZERO);
    }

    #[test]
    fn moderate_tiers() {
        let check_in = date(2026, 6, 20);
        let booked = instant(2026, 1, 1, 0);
        let full = calculate(CancellationPolicy::Moderate, TOTAL, check_in, instant(2026, 6, 15, 12), booked);
        assert_eq!(full.rate_bp, FULL_REFUND_BP);
        let half = calculate(CancellationPolicy::Moderate, TOTAL, check_in, instant(2026, 6, 16, 12), booked);
        assert_eq!(half.rate_bp, HALF_REFUND_BP);
        assert_eq!(half.amount, Money::from_minor(50_000));
        let none = calculate(CancellationPolicy::Moderate, TOTAL, check_in, instant(2026, 6, 20, 1), booked);
        assert_eq!(none.rate_bp, 0);
    }

    #[test]
    fn strict_grace_window_uses_elapsed_time() {
        // Booked at 10:00, cancelled at 20:00 the same day, check-in 31 days
        // out: inside the 48h window and beyond 14 days.
        let refund = calculate(
            CancellationPolicy::Strict,
            TOTAL,
            date(2026, 2, 1),
            instant(2026, 1, 1, 20),
            instant(2026, 1, 1, 10),
        );
        assert_eq!(refund.rate_bp, FULL_REFUND_BP);
    }

    #[test]
    fn strict_half_refund_outside_grace_window() {
        // Same booking cancelled 12 days before check-in, well past 48h.
        let refund = calculate(
            CancellationPolicy::Strict,
            TOTAL,
            date(2026, 2, 1),
            instant(2026, 1, 20, 10),
            instant(2026, 1, 1, 10),
        );
        assert_eq!(refund.rate_bp, HALF_REFUND_BP);
    }

    #[test]
    fn strict_grace_needs_fourteen_days_out() {
        // Cancelled within 48h but only 10 days before check-in: grace does
        // not apply, falls to the half tier.
        let refund = calculate(
            CancellationPolicy::Strict,
            TOTAL,
            date(2026, 1, 11),
            instant(2026, 1, 1, 20),
            instant(2026, 1, 1, 10),
        );
        assert_eq!(refund.rate_bp, HALF_REFUND_BP);
    }

    #[test]
    fn strict_no_refund_close_to_check_in() {
        let refund = calculate(
            CancellationPolicy::Strict,
            TOTAL,
            date(2026, 1, 5),
            instant(2026, 1, 2, 10),
            instant(2025, 11, 1, 10),
        );
        assert_eq!(refund.rate_bp, 0);
    }

    #[test]
    fn amount_is_floored() {
        let refund = calculate(
            CancellationPolicy::Moderate,
            Money::from_minor(85_001),
            date(2026, 6, 20),
            instant(2026, 6, 17, 0),
            instant(2026, 1, 1, 0),
        );
        assert_eq!(refund.amount, Money::from_minor(42_500));
    }

    proptest! {
        #[test]
        fn rate_is_one_of_the_three_tiers(
            total in 0u64..10_000_000,
            days_out in -30i64..400,
            policy_idx in 0usize..3,
        ) {
            let policy = [
                CancellationPolicy::Flexible,
                CancellationPolicy::Moderate,
                CancellationPolicy::Strict,
            ][policy_idx];
            let check_in = date(2026, 6, 1);
            let cancelled_at = (check_in - chrono::Days::new(days_out.unsigned_abs()))
                .and_hms_opt(12, 0, 0).unwrap().and_utc();
            let cancelled_at = if days_out < 0 {
                (check_in + chrono::Days::new(days_out.unsigned_abs()))
                    .and_hms_opt(12, 0, 0).unwrap().and_utc()
            } else {
                cancelled_at
            };
            let booked_at = instant(2025, 1, 1, 0);
            let refund = calculate(policy, Money::from_minor(total), check_in, cancelled_at, booked_at);
            prop_assert!([0, HALF_REFUND_BP, FULL_REFUND_BP].contains(&refund.rate_bp));
            prop_assert!(refund.amount.minor() <= total);
        }

        #[test]
        fn more_notice_never_reduces_the_refund(
            policy_idx in 0usize..3,
            days_a in 0i64..60,
            days_b in 0i64..60,
        ) {
            let policy = [
                CancellationPolicy::Flexible,
                CancellationPolicy::Moderate,
                CancellationPolicy::Strict,
            ][policy_idx];
            let (earlier, later) = if days_a >= days_b { (days_a, days_b) } else { (days_b, days_a) };
            let check_in = date(2026, 6, 1);
            let booked_at = instant(2025, 1, 1, 0);
            let at = |days: i64| {
                (check_in - chrono::Days::new(days.unsigned_abs()))
                    .and_hms_opt(12, 0, 0).unwrap().and_utc()
            };
            let with_more_notice = calculate(policy, TOTAL, check_in, at(earlier), booked_at);
            let with_less_notice = calculate(policy, TOTAL, check_in, at(later), booked_at);
            prop_assert!(with_more_notice.rate_bp >= with_less_notice.rate_bp);
        }
    }
}
