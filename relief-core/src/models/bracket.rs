use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Income exempt from tax, subtracted before any bracket is applied.
pub const TAX_FREE_LIMIT: Decimal = dec!(1200000);

/// The fixed progressive schedule used by the liability calculation.
///
/// Applied strictly in this order. Each `limit` is the width of the slice
/// taxed at `rate`, not a cumulative threshold.
pub const REFERENCE_BRACKETS: [Bracket; 6] = [
    Bracket::bounded(dec!(600000), dec!(0.06)),
    Bracket::bounded(dec!(600000), dec!(0.12)),
    Bracket::bounded(dec!(600000), dec!(0.18)),
    Bracket::bounded(dec!(600000), dec!(0.24)),
    Bracket::bounded(dec!(600000), dec!(0.30)),
    Bracket::unbounded(dec!(0.36)),
];

/// One marginal-rate slice of taxable income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    /// Width of the slice. `None` means the slice takes all remaining income.
    pub limit: Option<Decimal>,
    /// Marginal rate as a fraction (`0.06` for 6%).
    pub rate: Decimal,
}

impl Bracket {
    pub const fn bounded(
        limit: Decimal,
        rate: Decimal,
    ) -> Self {
        Self {
            limit: Some(limit),
            rate,
        }
    }

    pub const fn unbounded(rate: Decimal) -> Self {
        Self { limit: None, rate }
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit.is_none()
    }
}

/// Errors describing a malformed bracket schedule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("bracket schedule is empty")]
    Empty,

    #[error("tax-free limit must be non-negative, got {0}")]
    NegativeTaxFreeLimit(Decimal),

    #[error("bracket {index} has non-positive width {limit}")]
    NonPositiveWidth { index: usize, limit: Decimal },

    #[error("bracket {index} has rate {rate} outside [0, 1]")]
    RateOutOfRange { index: usize, rate: Decimal },

    #[error("bracket {index} is unbounded but is not the last bracket")]
    UnboundedNotLast { index: usize },

    #[error("last bracket must be unbounded")]
    LastBracketBounded,

    #[error("bracket {index} ends beyond the largest representable income")]
    ThresholdOverflow { index: usize },
}

/// A tax-free threshold together with the ordered brackets applied above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketSchedule<'a> {
    pub tax_free_limit: Decimal,
    pub brackets: &'a [Bracket],
}

impl BracketSchedule<'static> {
    /// The schedule the application computes tax with.
    pub const REFERENCE: BracketSchedule<'static> = BracketSchedule {
        tax_free_limit: TAX_FREE_LIMIT,
        brackets: &REFERENCE_BRACKETS,
    };
}

impl<'a> BracketSchedule<'a> {
    pub fn new(
        tax_free_limit: Decimal,
        brackets: &'a [Bracket],
    ) -> Self {
        Self {
            tax_free_limit,
            brackets,
        }
    }

    /// Checks the structural rules every schedule must satisfy.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScheduleError`] found, scanning brackets in order.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.tax_free_limit < Decimal::ZERO {
            return Err(ScheduleError::NegativeTaxFreeLimit(self.tax_free_limit));
        }
        let Some(last) = self.brackets.last() else {
            return Err(ScheduleError::Empty);
        };

        let last_index = self.brackets.len() - 1;
        let mut upper = self.tax_free_limit;
        for (index, bracket) in self.brackets.iter().enumerate() {
            if bracket.rate < Decimal::ZERO || bracket.rate > Decimal::ONE {
                return Err(ScheduleError::RateOutOfRange {
                    index,
                    rate: bracket.rate,
                });
            }
            match bracket.limit {
                Some(limit) if limit <= Decimal::ZERO => {
                    return Err(ScheduleError::NonPositiveWidth { index, limit });
                }
                Some(limit) => {
                    upper = upper
                        .checked_add(limit)
                        .ok_or(ScheduleError::ThresholdOverflow { index })?;
                }
                None if index != last_index => {
                    return Err(ScheduleError::UnboundedNotLast { index });
                }
                None => {}
            }
        }

        if !last.is_unbounded() {
            return Err(ScheduleError::LastBracketBounded);
        }
        Ok(())
    }

    /// Lower bound of each bracket expressed in gross income, i.e. the
    /// tax-free limit plus the widths of all earlier brackets.
    ///
    /// Saturates at [`Decimal::MAX`] for schedules that fail
    /// [`validate`](Self::validate) with [`ScheduleError::ThresholdOverflow`].
    pub fn gross_thresholds(&self) -> Vec<Decimal> {
        let mut lower = self.tax_free_limit;
        self.brackets
            .iter()
            .map(|bracket| {
                let start = lower;
                if let Some(limit) = bracket.limit {
                    lower = lower.saturating_add(limit);
                }
                start
            })
            .collect()
    }
}
