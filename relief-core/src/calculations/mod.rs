//! Tax calculation modules.
//!
//! [`liability`] turns income, deduction and relief into tax owed under a
//! progressive [`BracketSchedule`](crate::models::BracketSchedule).
//! [`summary`] applies it to stored relief records, and [`slabs`] checks the
//! admin slab table against the schedule.

pub mod common;
pub mod liability;
pub mod slabs;
pub mod summary;

pub use liability::{
    BracketSlice, InvalidInputReason, LiabilityError, TaxLiabilityCalculator, TaxLiabilityResult,
    calculate_tax,
};
pub use slabs::{SlabDiscrepancy, compare_with_schedule};
pub use summary::{ReliefSummary, ReportTotals};
