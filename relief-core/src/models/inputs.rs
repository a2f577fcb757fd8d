use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::{InvalidInputReason, LiabilityError};

/// The three amounts the liability calculation is driven by.
///
/// All values are whole currency units and must be non-negative. Build
/// through [`TaxableIncomeInputs::new`] or [`TaxableIncomeInputs::from_f64`]
/// to have that checked up front; the calculator re-checks either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxableIncomeInputs {
    /// Gross income for the period.
    pub income: Decimal,
    pub deduction: Decimal,
    /// Sum of the itemized relief entries of the record.
    pub total_relief: Decimal,
}

impl TaxableIncomeInputs {
    /// # Errors
    ///
    /// [`LiabilityError::InvalidInput`] if any amount is negative.
    pub fn new(
        income: Decimal,
        deduction: Decimal,
        total_relief: Decimal,
    ) -> Result<Self, LiabilityError> {
        let inputs = Self {
            income,
            deduction,
            total_relief,
        };
        inputs.validate()?;
        Ok(inputs)
    }

    /// Builds inputs from floating point amounts, as they arrive from form
    /// fields or JSON payloads.
    ///
    /// # Errors
    ///
    /// [`LiabilityError::InvalidInput`] if any value is NaN, infinite,
    /// negative, or too large to represent as a [`Decimal`].
    pub fn from_f64(
        income: f64,
        deduction: f64,
        total_relief: f64,
    ) -> Result<Self, LiabilityError> {
        Self::new(
            finite_decimal("income", income)?,
            finite_decimal("deduction", deduction)?,
            finite_decimal("total_relief", total_relief)?,
        )
    }

    /// Checks every amount is non-negative.
    ///
    /// # Errors
    ///
    /// [`LiabilityError::InvalidInput`] naming the first offending field.
    pub fn validate(&self) -> Result<(), LiabilityError> {
        for (field, value) in [
            ("income", self.income),
            ("deduction", self.deduction),
            ("total_relief", self.total_relief),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(LiabilityError::InvalidInput {
                    field,
                    reason: InvalidInputReason::Negative(value),
                });
            }
        }
        Ok(())
    }

    /// `income - deduction - total_relief - tax_free_limit`. May be negative.
    ///
    /// # Errors
    ///
    /// [`LiabilityError::InvalidInput`] on field `taxable_income` if the
    /// subtraction overflows.
    pub fn taxable_income(
        &self,
        tax_free_limit: Decimal,
    ) -> Result<Decimal, LiabilityError> {
        self.income
            .checked_sub(self.deduction)
            .and_then(|v| v.checked_sub(self.total_relief))
            .and_then(|v| v.checked_sub(tax_free_limit))
            .ok_or(LiabilityError::InvalidInput {
                field: "taxable_income",
                reason: InvalidInputReason::OutOfRange,
            })
    }
}

fn finite_decimal(
    field: &'static str,
    value: f64,
) -> Result<Decimal, LiabilityError> {
    if !value.is_finite() {
        return Err(LiabilityError::InvalidInput {
            field,
            reason: InvalidInputReason::NotFinite,
        });
    }
    Decimal::try_from(value).map_err(|_| LiabilityError::InvalidInput {
        field,
        reason: InvalidInputReason::OutOfRange,
    })
}
