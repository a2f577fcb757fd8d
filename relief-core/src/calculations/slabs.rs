//! Consistency check between the admin slab table and the calculation schedule.
//!
//! The stored [`TaxRateSlab`] rows are display data. Tax is always computed
//! from a [`BracketSchedule`], so an edited slab table can drift away from
//! what users are actually charged. [`compare_with_schedule`] reports that
//! drift without changing either side.
//!
//! The schedule is expanded into gross-income bands before comparing:
//!
//! | Band | Range (gross income)        | Rate |
//! |------|-----------------------------|------|
//! | 0    | `[0, tax_free_limit)`       | 0%   |
//! | 1..  | one band per bracket        | bracket rate |
//!
//! Slab ranges are half-open, so a slab's `max_income` equals the next
//! slab's `min_income`. The top slab has no `max_income`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{BracketSchedule, TaxRateSlab};

/// One difference between the slab table and the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlabDiscrepancy {
    /// The table has a different number of rows than the schedule has bands.
    CountMismatch { slabs: usize, bands: usize },
    /// The slab at `index` (ordered by `min_income`) covers a different range.
    BoundMismatch {
        index: usize,
        expected: (Decimal, Option<Decimal>),
        actual: (Decimal, Option<Decimal>),
    },
    /// The slab at `index` charges a different rate. Both rates are fractions.
    RateMismatch {
        index: usize,
        expected: Decimal,
        actual: Decimal,
    },
}

#[derive(Debug, Clone, Copy)]
struct Band {
    min: Decimal,
    max: Option<Decimal>,
    rate: Decimal,
}

fn expected_bands(schedule: &BracketSchedule<'_>) -> Vec<Band> {
    let mut bands = vec![Band {
        min: Decimal::ZERO,
        max: Some(schedule.tax_free_limit),
        rate: Decimal::ZERO,
    }];
    bands.extend(
        schedule
            .gross_thresholds()
            .into_iter()
            .zip(schedule.brackets)
            .map(|(min, bracket)| Band {
                min,
                max: bracket.limit.map(|width| min.saturating_add(width)),
                rate: bracket.rate,
            }),
    );
    bands
}

/// Compares stored slabs against `schedule`.
///
/// Slabs are ordered by `min_income` before comparing, so the order they
/// were loaded in does not matter. An empty result means the table
/// matches. Every discrepancy is also logged at `warn` level.
pub fn compare_with_schedule(
    slabs: &[TaxRateSlab],
    schedule: &BracketSchedule<'_>,
) -> Vec<SlabDiscrepancy> {
    let bands = expected_bands(schedule);
    let mut ordered: Vec<&TaxRateSlab> = slabs.iter().collect();
    ordered.sort_by(|a, b| a.min_income.cmp(&b.min_income));

    let mut discrepancies = Vec::new();
    if ordered.len() != bands.len() {
        discrepancies.push(SlabDiscrepancy::CountMismatch {
            slabs: ordered.len(),
            bands: bands.len(),
        });
    }

    for (index, (slab, band)) in ordered.iter().zip(&bands).enumerate() {
        if slab.min_income != band.min || slab.max_income != band.max {
            discrepancies.push(SlabDiscrepancy::BoundMismatch {
                index,
                expected: (band.min, band.max),
                actual: (slab.min_income, slab.max_income),
            });
        }
        let actual = slab.rate_fraction();
        if actual != band.rate {
            discrepancies.push(SlabDiscrepancy::RateMismatch {
                index,
                expected: band.rate,
                actual,
            });
        }
    }

    for discrepancy in &discrepancies {
        warn!(?discrepancy, "Tax rate slab differs from calculation schedule");
    }
    discrepancies
}
