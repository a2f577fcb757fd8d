pub mod calculations;
pub mod db;
pub mod models;

pub use db::repository::{ReliefRepository, RepositoryError};
pub use models::*;
