//! Per-record tax summaries and report totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::{InvalidInputReason, LiabilityError, TaxLiabilityCalculator};
use crate::models::{ReliefEntry, TaxRelief};

/// The computed tax position of one relief record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliefSummary {
    pub relief_id: i64,
    pub user_id: i64,
    pub tax_year: i32,
    pub income: Decimal,
    pub deduction: Decimal,
    pub total_relief: Decimal,
    pub entry_count: usize,
    pub taxable_income: Decimal,
    pub tax_owed: Decimal,
}

impl ReliefSummary {
    /// Sums the record's relief entries and runs the liability calculation.
    ///
    /// Entries whose `relief_id` does not match `record` are ignored, so the
    /// full entry list of a batch can be passed for every record.
    ///
    /// # Errors
    ///
    /// [`LiabilityError`] if an amount is invalid.
    pub fn from_record(
        record: &TaxRelief,
        entries: &[ReliefEntry],
        calculator: &TaxLiabilityCalculator<'_>,
    ) -> Result<Self, LiabilityError> {
        let inputs = record.inputs(entries)?;
        let result = calculator.calculate(&inputs)?;

        Ok(Self {
            relief_id: record.id,
            user_id: record.user_id,
            tax_year: record.tax_year,
            income: inputs.income,
            deduction: inputs.deduction,
            total_relief: inputs.total_relief,
            entry_count: entries.iter().filter(|e| e.relief_id == record.id).count(),
            taxable_income: result.taxable_income,
            tax_owed: result.tax_owed,
        })
    }
}

/// Column totals over a set of summaries.
///
/// Totals only depend on which summaries are included, not on their order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub records: usize,
    pub income: Decimal,
    pub deduction: Decimal,
    pub total_relief: Decimal,
    pub taxable_income: Decimal,
    pub tax_owed: Decimal,
}

impl ReportTotals {
    /// # Errors
    ///
    /// [`LiabilityError::InvalidInput`] with reason `OutOfRange`, naming the
    /// column whose total does not fit in a [`Decimal`].
    pub fn from_summaries<'s>(
        summaries: impl IntoIterator<Item = &'s ReliefSummary>,
    ) -> Result<Self, LiabilityError> {
        summaries
            .into_iter()
            .try_fold(Self::default(), |totals, summary| {
                Ok(Self {
                    records: totals.records + 1,
                    income: add_column("income", totals.income, summary.income)?,
                    deduction: add_column("deduction", totals.deduction, summary.deduction)?,
                    total_relief: add_column(
                        "total_relief",
                        totals.total_relief,
                        summary.total_relief,
                    )?,
                    taxable_income: add_column(
                        "taxable_income",
                        totals.taxable_income,
                        summary.taxable_income,
                    )?,
                    tax_owed: add_column("tax_owed", totals.tax_owed, summary.tax_owed)?,
                })
            })
    }
}

fn add_column(
    field: &'static str,
    total: Decimal,
    value: Decimal,
) -> Result<Decimal, LiabilityError> {
    total.checked_add(value).ok_or(LiabilityError::InvalidInput {
        field,
        reason: InvalidInputReason::OutOfRange,
    })
}
