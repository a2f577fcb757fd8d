pub mod repository;

pub use repository::{ReliefRepository, RepositoryError};
