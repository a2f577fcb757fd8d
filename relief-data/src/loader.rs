//! CSV import of relief records.
//!
//! ## CSV Format
//!
//! | Column        | Required | Type    | Notes                                   |
//! |---------------|----------|---------|-----------------------------------------|
//! | `user_id`     | yes      | integer |                                         |
//! | `tax_year`    | yes      | integer | e.g. `2024`                             |
//! | `income`      | yes      | decimal | repeated on every row of the record     |
//! | `deduction`   | yes      | decimal | repeated on every row of the record     |
//! | `description` | no       | string  | leave empty for a record without relief |
//! | `amount`      | no       | decimal | relief amount for `description`         |
//!
//! Rows sharing `(user_id, tax_year)` form one record. Each row with a
//! description and amount adds one relief entry to it.
//!
//! ```csv
//! user_id,tax_year,income,deduction,description,amount
//! 7,2024,5400000,200000,Life insurance,60000
//! 7,2024,5400000,200000,Pension,40000
//! 8,2024,1800000,0,,
//! ```

use std::collections::HashMap;
use std::io::Read;

use relief_core::calculations::LiabilityError;
use relief_core::{
    NewTaxRelief, ReliefLine, ReliefRepository, RepositoryError, TaxableIncomeInputs,
    total_relief,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when importing relief records.
#[derive(Debug, Error, PartialEq)]
pub enum ReliefLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    /// Rows of the same record disagree on income or deduction.
    /// `row` is 1-based, not counting the header.
    #[error("row {row}: {field} differs from earlier rows for user {user_id}, tax year {tax_year}")]
    ConflictingAmounts {
        row: usize,
        user_id: i64,
        tax_year: i32,
        field: &'static str,
    },

    #[error("row {row}: description and amount must both be given or both be empty")]
    IncompleteEntry { row: usize },

    #[error("user {user_id}, tax year {tax_year}: {source}")]
    InvalidAmount {
        user_id: i64,
        tax_year: i32,
        source: LiabilityError,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for ReliefLoaderError {
    fn from(err: csv::Error) -> Self {
        ReliefLoaderError::CsvParse(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    user_id: i64,
    tax_year: i32,
    income: Decimal,
    deduction: Decimal,
    description: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_decimal")]
    amount: Option<Decimal>,
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// One itemized relief amount of an imported record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliefRecordEntry {
    pub description: String,
    pub amount: Decimal,
}

/// A relief record as it appears in an import file, entries grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliefRecord {
    pub user_id: i64,
    pub tax_year: i32,
    pub income: Decimal,
    pub deduction: Decimal,
    pub entries: Vec<ReliefRecordEntry>,
}

impl ReliefRecord {
    /// Rejects negative income, deduction or entry amounts.
    fn validate(&self) -> Result<(), ReliefLoaderError> {
        let invalid = |source| ReliefLoaderError::InvalidAmount {
            user_id: self.user_id,
            tax_year: self.tax_year,
            source,
        };
        let relief = total_relief(self.entries.iter().map(|e| e.amount)).map_err(invalid)?;
        TaxableIncomeInputs::new(self.income, self.deduction, relief).map_err(invalid)?;
        Ok(())
    }
}

/// Totals of one [`ReliefRecordLoader::load`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub records: usize,
    pub entries: usize,
    /// Records that already existed and were replaced.
    pub replaced: usize,
}

/// Imports relief records from CSV through the [`ReliefRepository`] trait,
/// so any database backend can be the target.
pub struct ReliefRecordLoader;

impl ReliefRecordLoader {
    /// Parse and group relief records from a CSV reader.
    ///
    /// Records are returned in the order their first row appears. Every
    /// record is validated before anything is returned, so a file with one
    /// bad row yields an error and no records.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<ReliefRecord>, ReliefLoaderError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records: Vec<ReliefRecord> = Vec::new();
        let mut index: HashMap<(i64, i32), usize> = HashMap::new();

        for (idx, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
            let row = result?;
            let row_number = idx + 1;

            let entry = match (row.description, row.amount) {
                (Some(description), Some(amount)) => Some(ReliefRecordEntry {
                    description,
                    amount,
                }),
                (None, None) => None,
                _ => return Err(ReliefLoaderError::IncompleteEntry { row: row_number }),
            };

            let key = (row.user_id, row.tax_year);
            let position = *index.entry(key).or_insert_with(|| {
                records.push(ReliefRecord {
                    user_id: row.user_id,
                    tax_year: row.tax_year,
                    income: row.income,
                    deduction: row.deduction,
                    entries: Vec::new(),
                });
                records.len() - 1
            });
            let record = &mut records[position];

            for (field, expected, actual) in [
                ("income", record.income, row.income),
                ("deduction", record.deduction, row.deduction),
            ] {
                if expected != actual {
                    return Err(ReliefLoaderError::ConflictingAmounts {
                        row: row_number,
                        user_id: row.user_id,
                        tax_year: row.tax_year,
                        field,
                    });
                }
            }
            record.entries.extend(entry);
        }

        for record in &records {
            record.validate()?;
        }
        Ok(records)
    }

    /// Store parsed records in the repository.
    ///
    /// Each record is written with [`ReliefRepository::replace_relief`], so a
    /// record already stored for the same `(user_id, tax_year)` is swapped
    /// out together with its entries and loading the same file twice leaves
    /// the database unchanged. A failure stops the load; records written
    /// before it stay, and the failing record keeps its previous state.
    pub async fn load<R: ReliefRepository + ?Sized>(
        repo: &R,
        records: &[ReliefRecord],
    ) -> Result<LoadOutcome, ReliefLoaderError> {
        let mut outcome = LoadOutcome::default();

        for record in records {
            record.validate()?;

            let lines = record
                .entries
                .iter()
                .map(|entry| ReliefLine {
                    description: entry.description.clone(),
                    amount: entry.amount,
                })
                .collect();
            let stored = repo
                .replace_relief(
                    NewTaxRelief {
                        user_id: record.user_id,
                        tax_year: record.tax_year,
                        income: record.income,
                        deduction: record.deduction,
                    },
                    lines,
                )
                .await?;

            if let Some(replaced_id) = stored.replaced_id {
                warn!(
                    user_id = record.user_id,
                    tax_year = record.tax_year,
                    replaced_id,
                    relief_id = stored.relief.id,
                    "Replaced existing relief record"
                );
                outcome.replaced += 1;
            }

            debug!(
                relief_id = stored.relief.id,
                entries = stored.entries.len(),
                "Loaded relief record"
            );
            outcome.records += 1;
            outcome.entries += stored.entries.len();
        }

        Ok(outcome)
    }
}
