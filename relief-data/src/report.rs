//! Batch tax report over stored relief records.

use std::io::Write;

use relief_core::calculations::{
    LiabilityError, ReliefSummary, ReportTotals, TaxLiabilityCalculator,
};
use relief_core::{ReliefRepository, RepositoryError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("relief record {relief_id}: {source}")]
    Calculation {
        relief_id: i64,
        source: LiabilityError,
    },

    #[error("report totals: {0}")]
    Totals(LiabilityError),

    #[error("CSV write error: {0}")]
    Csv(String),
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::Csv(err.to_string())
    }
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Csv(err.to_string())
    }
}

const HEADER: [&str; 9] = [
    "relief_id",
    "user_id",
    "tax_year",
    "income",
    "deduction",
    "total_relief",
    "entry_count",
    "taxable_income",
    "tax_owed",
];

/// Tax owed by every stored record of a year (or of all years), with totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliefReport {
    pub tax_year: Option<i32>,
    pub rows: Vec<ReliefSummary>,
    pub totals: ReportTotals,
}

impl ReliefReport {
    /// Fetches the records and their entries and runs each through
    /// `calculator`. Rows follow the repository's listing order.
    pub async fn build<R: ReliefRepository + ?Sized>(
        repo: &R,
        tax_year: Option<i32>,
        calculator: &TaxLiabilityCalculator<'_>,
    ) -> Result<Self, ReportError> {
        let records = repo.list_reliefs(tax_year).await?;

        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let entries = repo.list_relief_entries(record.id).await?;
            let summary = ReliefSummary::from_record(record, &entries, calculator).map_err(
                |source| ReportError::Calculation {
                    relief_id: record.id,
                    source,
                },
            )?;
            rows.push(summary);
        }

        let totals = ReportTotals::from_summaries(&rows).map_err(ReportError::Totals)?;
        debug!(?tax_year, records = totals.records, tax_owed = %totals.tax_owed, "Built relief report");

        Ok(Self {
            tax_year,
            rows,
            totals,
        })
    }

    /// Writes one CSV line per record followed by a `TOTAL` line.
    pub fn write_csv<W: Write>(
        &self,
        writer: W,
    ) -> Result<(), ReportError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(HEADER)?;

        for row in &self.rows {
            csv_writer.write_record([
                row.relief_id.to_string(),
                row.user_id.to_string(),
                row.tax_year.to_string(),
                row.income.to_string(),
                row.deduction.to_string(),
                row.total_relief.to_string(),
                row.entry_count.to_string(),
                row.taxable_income.to_string(),
                row.tax_owed.to_string(),
            ])?;
        }

        let totals = &self.totals;
        csv_writer.write_record([
            "TOTAL".to_string(),
            String::new(),
            self.tax_year.map(|y| y.to_string()).unwrap_or_default(),
            totals.income.to_string(),
            totals.deduction.to_string(),
            totals.total_relief.to_string(),
            String::new(),
            totals.taxable_income.to_string(),
            totals.tax_owed.to_string(),
        ])?;

        csv_writer.flush()?;
        Ok(())
    }
}
