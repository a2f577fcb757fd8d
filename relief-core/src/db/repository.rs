use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    NewReliefEntry, NewTaxRateSlab, NewTaxRelief, ReliefEntry, ReliefLine, ReplacedRelief,
    TaxRateSlab, TaxRelief,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),
}

#[async_trait]
pub trait ReliefRepository: Send + Sync {
    // Tax rate slabs, ordered by min_income
    async fn list_tax_rate_slabs(&self) -> Result<Vec<TaxRateSlab>, RepositoryError>;
    async fn get_tax_rate_slab(&self, id: i64) -> Result<TaxRateSlab, RepositoryError>;

    async fn create_tax_rate_slab(
        &self,
        slab: NewTaxRateSlab,
    ) -> Result<TaxRateSlab, RepositoryError>;

    async fn update_tax_rate_slab(&self, slab: &TaxRateSlab) -> Result<(), RepositoryError>;

    async fn delete_tax_rate_slab(&self, id: i64) -> Result<(), RepositoryError>;

    // Relief records
    async fn create_relief(&self, relief: NewTaxRelief) -> Result<TaxRelief, RepositoryError>;

    async fn get_relief(&self, id: i64) -> Result<TaxRelief, RepositoryError>;

    /// Looks up the record of one user for one tax year.
    async fn find_relief(
        &self,
        user_id: i64,
        tax_year: i32,
    ) -> Result<Option<TaxRelief>, RepositoryError>;

    async fn update_relief(&self, relief: &TaxRelief) -> Result<(), RepositoryError>;

    /// Deletes the record together with its entries.
    async fn delete_relief(&self, id: i64) -> Result<(), RepositoryError>;

    async fn list_reliefs(&self, tax_year: Option<i32>) -> Result<Vec<TaxRelief>, RepositoryError>;

    /// Writes the record for `(relief.user_id, relief.tax_year)` with exactly
    /// `entries`, deleting any record already stored for that pair.
    ///
    /// Either the whole replacement is stored or nothing changes.
    async fn replace_relief(
        &self,
        relief: NewTaxRelief,
        entries: Vec<ReliefLine>,
    ) -> Result<ReplacedRelief, RepositoryError>;

    // Relief entries
    async fn add_relief_entry(&self, entry: NewReliefEntry) -> Result<ReliefEntry, RepositoryError>;

    async fn list_relief_entries(&self, relief_id: i64) -> Result<Vec<ReliefEntry>, RepositoryError>;

    async fn delete_relief_entry(&self, id: i64) -> Result<(), RepositoryError>;
}
