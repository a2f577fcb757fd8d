//! Common utility functions for tax calculations.
//!
//! Rounding and comparison helpers shared by the liability calculation and
//! report aggregation.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a decimal value to whole currency units using half-up rounding.
///
/// Values at exactly `.5` move away from zero, so `0.5` becomes `1` and
/// `-0.5` becomes `-1`.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use relief_core::calculations::common::round_whole_units;
///
/// assert_eq!(round_whole_units(dec!(36000.49)), dec!(36000));
/// assert_eq!(round_whole_units(dec!(36000.5)), dec!(36001));
/// assert_eq!(round_whole_units(dec!(-2.5)), dec!(-3)); // Away from zero
/// ```
pub fn round_whole_units(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns the maximum of two decimal values.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use relief_core::calculations::common::max;
///
/// assert_eq!(max(dec!(100.00), dec!(200.00)), dec!(200.00));
/// assert_eq!(max(dec!(-100.00), dec!(-200.00)), dec!(-100.00));
/// ```
pub fn max(
    a: Decimal,
    b: Decimal,
) -> Decimal {
    if a > b { a } else { b }
}
