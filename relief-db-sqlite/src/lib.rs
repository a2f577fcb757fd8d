mod decimal;
pub mod repository;

pub use repository::SqliteRepository;
