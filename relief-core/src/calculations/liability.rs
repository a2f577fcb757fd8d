//! Progressive tax liability calculation.
//!
//! Converts gross income, a deduction and the total of a record's relief
//! entries into the tax owed under a bracket schedule with a tax-free
//! threshold.
//!
//! # Algorithm
//!
//! | Step | Description |
//! |------|-------------|
//! | 1    | Taxable = income - deduction - total relief - tax-free limit |
//! | 2    | If taxable ≤ 0, no tax is owed |
//! | 3    | Walk the brackets in order, taxing `min(remaining, width)` at the bracket rate |
//! | 4    | Stop once the taxable amount is used up |
//! | 5    | Round the total to whole currency units (half-up) |
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use relief_core::TaxableIncomeInputs;
//! use relief_core::calculations::TaxLiabilityCalculator;
//!
//! let inputs = TaxableIncomeInputs::new(dec!(5400000), dec!(200000), dec!(100000)).unwrap();
//!
//! let result = TaxLiabilityCalculator::reference().calculate(&inputs).unwrap();
//!
//! assert_eq!(result.taxable_income, dec!(3900000));
//! assert_eq!(result.tax_owed, dec!(864000));
//! assert_eq!(result.slices.len(), 6);
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::calculations::common::round_whole_units;
use crate::models::{BracketSchedule, ScheduleError, TaxableIncomeInputs};

/// Why an input amount was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvalidInputReason {
    #[error("must be non-negative, got {0}")]
    Negative(Decimal),

    #[error("must be a finite number")]
    NotFinite,

    #[error("is too large to compute with")]
    OutOfRange,
}

/// Errors that can occur during a liability calculation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LiabilityError {
    /// An input amount was negative, non-finite or out of range.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: InvalidInputReason,
    },

    /// A custom schedule failed validation.
    #[error("invalid bracket schedule: {0}")]
    Schedule(#[from] ScheduleError),
}

/// The part of taxable income that fell into one bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketSlice {
    /// Position of the bracket in the schedule, starting at 0.
    pub index: usize,
    pub rate: Decimal,
    /// Taxable income taxed at `rate`.
    pub amount: Decimal,
    /// `amount * rate`, unrounded.
    pub tax: Decimal,
}

/// Result of a liability calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLiabilityResult {
    /// Taxable income after deduction, relief and the tax-free limit,
    /// floored at zero.
    pub taxable_income: Decimal,

    /// One entry per bracket that received income, in schedule order.
    pub slices: Vec<BracketSlice>,

    /// Sum of the slice taxes before rounding.
    pub unrounded_tax: Decimal,

    /// Tax owed in whole currency units. Never negative.
    pub tax_owed: Decimal,
}

impl TaxLiabilityResult {
    fn zero() -> Self {
        Self {
            taxable_income: Decimal::ZERO,
            slices: Vec::new(),
            unrounded_tax: Decimal::ZERO,
            tax_owed: Decimal::ZERO,
        }
    }

    /// Tax owed as a fraction of the taxable income, zero when nothing is
    /// taxable.
    pub fn effective_rate(&self) -> Decimal {
        if self.taxable_income.is_zero() {
            Decimal::ZERO
        } else {
            self.unrounded_tax / self.taxable_income
        }
    }
}

/// Calculator for progressive tax liability.
///
/// Holds a borrowed [`BracketSchedule`]. It has no other state, so one
/// value can be shared across threads and called any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxLiabilityCalculator<'a> {
    schedule: BracketSchedule<'a>,
}

impl TaxLiabilityCalculator<'static> {
    /// Calculator over [`BracketSchedule::REFERENCE`].
    pub const fn reference() -> Self {
        Self {
            schedule: BracketSchedule::REFERENCE,
        }
    }
}

impl Default for TaxLiabilityCalculator<'static> {
    fn default() -> Self {
        Self::reference()
    }
}

impl<'a> TaxLiabilityCalculator<'a> {
    /// Creates a calculator for a custom schedule. The schedule is checked
    /// on every call to [`calculate`](Self::calculate).
    pub fn new(schedule: BracketSchedule<'a>) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &BracketSchedule<'a> {
        &self.schedule
    }

    /// Calculates the tax owed for `inputs` with the per-bracket breakdown.
    ///
    /// # Errors
    ///
    /// Returns [`LiabilityError`] if:
    /// - Any input amount is negative
    /// - The amounts are too large for decimal arithmetic
    /// - The schedule is malformed
    pub fn calculate(
        &self,
        inputs: &TaxableIncomeInputs,
    ) -> Result<TaxLiabilityResult, LiabilityError> {
        inputs.validate()?;
        self.schedule.validate()?;

        let taxable_income = inputs.taxable_income(self.schedule.tax_free_limit)?;
        if taxable_income <= Decimal::ZERO {
            debug!(%taxable_income, "taxable income at or below zero; no tax owed");
            return Ok(TaxLiabilityResult::zero());
        }

        let mut remaining = taxable_income;
        let mut unrounded_tax = Decimal::ZERO;
        let mut slices = Vec::with_capacity(self.schedule.brackets.len());

        for (index, bracket) in self.schedule.brackets.iter().enumerate() {
            let amount = match bracket.limit {
                Some(limit) => remaining.min(limit),
                None => remaining,
            };
            let tax = amount.checked_mul(bracket.rate).ok_or_else(out_of_range)?;
            unrounded_tax = unrounded_tax.checked_add(tax).ok_or_else(out_of_range)?;
            remaining -= amount;

            slices.push(BracketSlice {
                index,
                rate: bracket.rate,
                amount,
                tax,
            });

            if remaining <= Decimal::ZERO {
                break;
            }
        }

        let tax_owed = round_whole_units(unrounded_tax);
        debug!(
            %taxable_income,
            brackets_used = slices.len(),
            %unrounded_tax,
            %tax_owed,
            "calculated tax liability"
        );

        Ok(TaxLiabilityResult {
            taxable_income,
            slices,
            unrounded_tax,
            tax_owed,
        })
    }

    /// Calculates only the rounded tax owed.
    ///
    /// # Errors
    ///
    /// See [`calculate`](Self::calculate).
    pub fn tax_owed(
        &self,
        inputs: &TaxableIncomeInputs,
    ) -> Result<Decimal, LiabilityError> {
        self.calculate(inputs).map(|result| result.tax_owed)
    }
}

/// Tax owed on `income` after `deduction` and `total_relief`, using the
/// reference schedule.
///
/// # Errors
///
/// [`LiabilityError::InvalidInput`] if any amount is negative or too large.
///
/// # Example
///
/// ```
/// use rust_decimal_macros::dec;
/// use relief_core::calculations::calculate_tax;
///
/// assert_eq!(calculate_tax(dec!(3000000), dec!(0), dec!(0)).unwrap(), dec!(216000));
/// assert_eq!(calculate_tax(dec!(500000), dec!(0), dec!(0)).unwrap(), dec!(0));
/// ```
pub fn calculate_tax(
    income: Decimal,
    deduction: Decimal,
    total_relief: Decimal,
) -> Result<Decimal, LiabilityError> {
    let inputs = TaxableIncomeInputs::new(income, deduction, total_relief)?;
    TaxLiabilityCalculator::reference().tax_owed(&inputs)
}

fn out_of_range() -> LiabilityError {
    LiabilityError::InvalidInput {
        field: "tax",
        reason: InvalidInputReason::OutOfRange,
    }
}
