mod bracket;
mod inputs;
mod tax_rate_slab;
mod tax_relief;

pub use bracket::{Bracket, BracketSchedule, REFERENCE_BRACKETS, ScheduleError, TAX_FREE_LIMIT};
pub use inputs::TaxableIncomeInputs;
pub use tax_rate_slab::{NewTaxRateSlab, TaxRateSlab};
pub use tax_relief::{
    NewReliefEntry, NewTaxRelief, ReliefEntry, ReliefLine, ReplacedRelief, TaxRelief, total_relief,
};
