use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An admin-maintained row of the published tax rate table.
///
/// Slabs are reference data shown to users. The liability calculation does
/// not read them; see [`crate::calculations::slabs`] for how differences
/// between the two are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRateSlab {
    pub id: i64,
    /// Gross income where the slab starts.
    pub min_income: Decimal,
    /// Gross income where the slab ends, `None` for the open-ended top slab.
    pub max_income: Option<Decimal>,
    /// Rate in percent (`6` for 6%).
    pub rate_percent: Decimal,
    pub description: String,
}

impl TaxRateSlab {
    /// The slab rate as a fraction, comparable with a bracket rate.
    pub fn rate_fraction(&self) -> Decimal {
        self.rate_percent / Decimal::ONE_HUNDRED
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaxRateSlab {
    pub min_income: Decimal,
    pub max_income: Option<Decimal>,
    pub rate_percent: Decimal,
    pub description: String,
}
