pub mod loader;
pub mod report;

pub use loader::{LoadOutcome, ReliefLoaderError, ReliefRecord, ReliefRecordEntry, ReliefRecordLoader};
pub use report::{ReliefReport, ReportError};
