use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::{InvalidInputReason, LiabilityError};
use crate::models::TaxableIncomeInputs;

/// A user's income and deduction for one tax year. Itemized relief amounts
/// hang off it as [`ReliefEntry`] rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRelief {
    pub id: i64,
    pub user_id: i64,
    pub tax_year: i32,
    pub income: Decimal,
    pub deduction: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaxRelief {
    /// Sums `entries` into the relief total and pairs it with this record's
    /// income and deduction. Entries belonging to other records are ignored.
    ///
    /// # Errors
    ///
    /// [`LiabilityError::InvalidInput`] if any amount is negative.
    pub fn inputs(
        &self,
        entries: &[ReliefEntry],
    ) -> Result<TaxableIncomeInputs, LiabilityError> {
        let total_relief = total_relief(
            entries
                .iter()
                .filter(|entry| entry.relief_id == self.id)
                .map(|entry| entry.amount),
        )?;
        TaxableIncomeInputs::new(self.income, self.deduction, total_relief)
    }
}

/// For creating new relief records (no id or timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaxRelief {
    pub user_id: i64,
    pub tax_year: i32,
    pub income: Decimal,
    pub deduction: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliefEntry {
    pub id: i64,
    pub relief_id: i64,
    pub description: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReliefEntry {
    pub relief_id: i64,
    pub description: String,
    pub amount: Decimal,
}

/// An entry written together with its record, before the record id exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliefLine {
    pub description: String,
    pub amount: Decimal,
}

/// Result of replacing the record of one user and tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacedRelief {
    pub relief: TaxRelief,
    pub entries: Vec<ReliefEntry>,
    /// Id of the record that was deleted to make room, if there was one.
    pub replaced_id: Option<i64>,
}

/// Adds up relief amounts, rejecting negative entries.
///
/// # Errors
///
/// [`LiabilityError::InvalidInput`] for a negative amount or an overflowing sum.
pub fn total_relief(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, LiabilityError> {
    amounts.into_iter().try_fold(Decimal::ZERO, |sum, amount| {
        if amount < Decimal::ZERO {
            return Err(LiabilityError::InvalidInput {
                field: "total_relief",
                reason: InvalidInputReason::Negative(amount),
            });
        }
        sum.checked_add(amount).ok_or(LiabilityError::InvalidInput {
            field: "total_relief",
            reason: InvalidInputReason::OutOfRange,
        })
    })
}
