use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relief_core::{
    NewReliefEntry, NewTaxRateSlab, NewTaxRelief, ReliefEntry, ReliefLine, ReliefRepository,
    ReplacedRelief, RepositoryError, TaxRateSlab, TaxRelief,
};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use crate::decimal::{decimal_to_text, get_decimal, get_optional_decimal};

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect to `database_url`, creating the database file if needed.
    ///
    /// Accepts sqlx URLs (`sqlite:relief.db`, `sqlite::memory:`) as well as
    /// bare paths and `:memory:`. In-memory databases get a single,
    /// never-recycled connection so every query sees the same data.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true);

        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;
        debug!(database_url, "Connected to SQLite database");
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Load and execute all SQL seed files from the specified directory.
    /// Files are executed in alphabetical order by filename.
    pub async fn run_seeds(
        &self,
        seeds_dir: &Path,
    ) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(seeds_dir)
            .with_context(|| format!("Failed to read seeds directory '{}'", seeds_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;

            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute seed file '{}'", path.display()))?;
            debug!(seed = %path.display(), "Applied seed file");
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn db_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn row_to_tax_rate_slab(row: &SqliteRow) -> Result<TaxRateSlab, RepositoryError> {
    Ok(TaxRateSlab {
        id: row.try_get("id").map_err(db_err)?,
        min_income: get_decimal(row, "min_income")?,
        max_income: get_optional_decimal(row, "max_income")?,
        rate_percent: get_decimal(row, "rate_percent")?,
        description: row.try_get("description").map_err(db_err)?,
    })
}

fn row_to_tax_relief(row: &SqliteRow) -> Result<TaxRelief, RepositoryError> {
    Ok(TaxRelief {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        tax_year: row.try_get("tax_year").map_err(db_err)?,
        income: get_decimal(row, "income")?,
        deduction: get_decimal(row, "deduction")?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(|e| RepositoryError::Database(format!("Failed to get created_at: {}", e)))?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(|e| RepositoryError::Database(format!("Failed to get updated_at: {}", e)))?,
    })
}

fn row_to_relief_entry(row: &SqliteRow) -> Result<ReliefEntry, RepositoryError> {
    Ok(ReliefEntry {
        id: row.try_get("id").map_err(db_err)?,
        relief_id: row.try_get("relief_id").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        amount: get_decimal(row, "amount")?,
    })
}

const RELIEF_COLUMNS: &str =
    "SELECT id, user_id, tax_year, income, deduction, created_at, updated_at FROM tax_relief";

#[async_trait]
impl ReliefRepository for SqliteRepository {
    async fn list_tax_rate_slabs(&self) -> Result<Vec<TaxRateSlab>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, min_income, max_income, rate_percent, description
             FROM tax_rate_slab
             ORDER BY CAST(min_income AS REAL), id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_tax_rate_slab).collect()
    }

    async fn get_tax_rate_slab(
        &self,
        id: i64,
    ) -> Result<TaxRateSlab, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, min_income, max_income, rate_percent, description
             FROM tax_rate_slab WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepositoryError::NotFound)?;

        row_to_tax_rate_slab(&row)
    }

    async fn create_tax_rate_slab(
        &self,
        slab: NewTaxRateSlab,
    ) -> Result<TaxRateSlab, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO tax_rate_slab (min_income, max_income, rate_percent, description)
             VALUES (?, ?, ?, ?)",
        )
        .bind(decimal_to_text(slab.min_income))
        .bind(slab.max_income.map(decimal_to_text))
        .bind(decimal_to_text(slab.rate_percent))
        .bind(&slab.description)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_tax_rate_slab(result.last_insert_rowid()).await
    }

    async fn update_tax_rate_slab(
        &self,
        slab: &TaxRateSlab,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE tax_rate_slab SET
                min_income = ?, max_income = ?, rate_percent = ?, description = ?
             WHERE id = ?",
        )
        .bind(decimal_to_text(slab.min_income))
        .bind(slab.max_income.map(decimal_to_text))
        .bind(decimal_to_text(slab.rate_percent))
        .bind(&slab.description)
        .bind(slab.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_tax_rate_slab(
        &self,
        id: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM tax_rate_slab WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn create_relief(
        &self,
        relief: NewTaxRelief,
    ) -> Result<TaxRelief, RepositoryError> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO tax_relief (user_id, tax_year, income, deduction, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(relief.user_id)
        .bind(relief.tax_year)
        .bind(decimal_to_text(relief.income))
        .bind(decimal_to_text(relief.deduction))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_relief(result.last_insert_rowid()).await
    }

    async fn get_relief(
        &self,
        id: i64,
    ) -> Result<TaxRelief, RepositoryError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", RELIEF_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepositoryError::NotFound)?;

        row_to_tax_relief(&row)
    }

    async fn find_relief(
        &self,
        user_id: i64,
        tax_year: i32,
    ) -> Result<Option<TaxRelief>, RepositoryError> {
        sqlx::query(&format!("{} WHERE user_id = ? AND tax_year = ?", RELIEF_COLUMNS))
            .bind(user_id)
            .bind(tax_year)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_tax_relief)
            .transpose()
    }

    async fn update_relief(
        &self,
        relief: &TaxRelief,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE tax_relief SET
                user_id = ?, tax_year = ?, income = ?, deduction = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(relief.user_id)
        .bind(relief.tax_year)
        .bind(decimal_to_text(relief.income))
        .bind(decimal_to_text(relief.deduction))
        .bind(now)
        .bind(relief.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_relief(
        &self,
        id: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM tax_relief WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn list_reliefs(
        &self,
        tax_year: Option<i32>,
    ) -> Result<Vec<TaxRelief>, RepositoryError> {
        let rows = match tax_year {
            Some(year) => {
                sqlx::query(&format!(
                    "{} WHERE tax_year = ? ORDER BY tax_year, user_id",
                    RELIEF_COLUMNS
                ))
                .bind(year)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY tax_year, user_id", RELIEF_COLUMNS))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(db_err)?;

        rows.iter().map(row_to_tax_relief).collect()
    }

    async fn replace_relief(
        &self,
        relief: NewTaxRelief,
        entries: Vec<ReliefLine>,
    ) -> Result<ReplacedRelief, RepositoryError> {
        // Dropping `tx` before commit rolls everything back.
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let replaced_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM tax_relief WHERE user_id = ? AND tax_year = ?")
                .bind(relief.user_id)
                .bind(relief.tax_year)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        if let Some(id) = replaced_id {
            sqlx::query("DELETE FROM tax_relief WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        let now = Utc::now();
        let relief_id = sqlx::query(
            "INSERT INTO tax_relief (user_id, tax_year, income, deduction, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(relief.user_id)
        .bind(relief.tax_year)
        .bind(decimal_to_text(relief.income))
        .bind(decimal_to_text(relief.deduction))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        let mut stored = Vec::with_capacity(entries.len());
        for line in entries {
            let id = sqlx::query(
                "INSERT INTO relief_entry (relief_id, description, amount) VALUES (?, ?, ?)",
            )
            .bind(relief_id)
            .bind(&line.description)
            .bind(decimal_to_text(line.amount))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .last_insert_rowid();

            stored.push(ReliefEntry {
                id,
                relief_id,
                description: line.description,
                amount: line.amount,
            });
        }

        let row = sqlx::query(&format!("{} WHERE id = ?", RELIEF_COLUMNS))
            .bind(relief_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let relief = row_to_tax_relief(&row)?;

        tx.commit().await.map_err(db_err)?;
        debug!(relief_id, ?replaced_id, entries = stored.len(), "Replaced relief record");

        Ok(ReplacedRelief {
            relief,
            entries: stored,
            replaced_id,
        })
    }

    async fn add_relief_entry(
        &self,
        entry: NewReliefEntry,
    ) -> Result<ReliefEntry, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO relief_entry (relief_id, description, amount) VALUES (?, ?, ?)",
        )
        .bind(entry.relief_id)
        .bind(&entry.description)
        .bind(decimal_to_text(entry.amount))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(ReliefEntry {
            id: result.last_insert_rowid(),
            relief_id: entry.relief_id,
            description: entry.description,
            amount: entry.amount,
        })
    }

    async fn list_relief_entries(
        &self,
        relief_id: i64,
    ) -> Result<Vec<ReliefEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, relief_id, description, amount
             FROM relief_entry WHERE relief_id = ? ORDER BY id",
        )
        .bind(relief_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_relief_entry).collect()
    }

    async fn delete_relief_entry(
        &self,
        id: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM relief_entry WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use relief_core::calculations::compare_with_schedule;
    use relief_core::BracketSchedule;
    use rust_decimal_macros::dec;

    use super::*;

    async fn setup_test_db() -> SqliteRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        let repo = SqliteRepository::new_with_pool(pool).await;
        repo.run_migrations()
            .await
            .expect("Failed to run migrations");
        repo
    }

    fn new_relief(
        user_id: i64,
        tax_year: i32,
    ) -> NewTaxRelief {
        NewTaxRelief {
            user_id,
            tax_year,
            income: dec!(5400000),
            deduction: dec!(200000),
        }
    }

    fn new_slab(
        min: rust_decimal::Decimal,
        max: Option<rust_decimal::Decimal>,
        rate_percent: rust_decimal::Decimal,
    ) -> NewTaxRateSlab {
        NewTaxRateSlab {
            min_income: min,
            max_income: max,
            rate_percent,
            description: "test slab".to_string(),
        }
    }

    // =========================================================================
    // connection
    // =========================================================================

    #[tokio::test]
    async fn test_new_in_memory_keeps_data_across_queries() {
        let repo = SqliteRepository::new(":memory:")
            .await
            .expect("Should open in-memory database");
        repo.run_migrations()
            .await
            .expect("Should run migrations");

        let created = repo
            .create_relief(new_relief(1, 2024))
            .await
            .expect("Should create relief");
        let fetched = repo.get_relief(created.id).await;

        assert_eq!(fetched, Ok(created));
    }

    #[test]
    fn test_is_in_memory() {
        assert!(is_in_memory(":memory:"));
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite:file:relief?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite:relief.db?mode=rwc"));
        assert!(!is_in_memory("relief.db"));
    }

    // =========================================================================
    // tax rate slabs
    // =========================================================================

    #[tokio::test]
    async fn test_create_and_get_tax_rate_slab() {
        let repo = setup_test_db().await;

        let created = repo
            .create_tax_rate_slab(new_slab(dec!(1200000), Some(dec!(1800000)), dec!(6)))
            .await
            .expect("Should create slab");

        assert!(created.id > 0);
        assert_eq!(created.min_income, dec!(1200000));
        assert_eq!(created.max_income, Some(dec!(1800000)));
        assert_eq!(created.rate_percent, dec!(6));

        let fetched = repo.get_tax_rate_slab(created.id).await;
        assert_eq!(fetched, Ok(created));
    }

    #[tokio::test]
    async fn test_create_open_ended_slab() {
        let repo = setup_test_db().await;

        let created = repo
            .create_tax_rate_slab(new_slab(dec!(4200000), None, dec!(36)))
            .await
            .expect("Should create slab");

        assert_eq!(created.max_income, None);
    }

    #[tokio::test]
    async fn test_get_tax_rate_slab_not_found() {
        let repo = setup_test_db().await;

        let result = repo.get_tax_rate_slab(99999).await;

        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_tax_rate_slabs_orders_numerically() {
        let repo = setup_test_db().await;
        // As text "900000" sorts after "1200000".
        for min in [dec!(1200000), dec!(0), dec!(900000)] {
            repo.create_tax_rate_slab(new_slab(min, None, dec!(0)))
                .await
                .expect("Should create slab");
        }

        let slabs = repo.list_tax_rate_slabs().await.expect("Should list slabs");

        let mins: Vec<_> = slabs.iter().map(|s| s.min_income).collect();
        assert_eq!(mins, vec![dec!(0), dec!(900000), dec!(1200000)]);
    }

    #[tokio::test]
    async fn test_update_tax_rate_slab() {
        let repo = setup_test_db().await;
        let mut slab = repo
            .create_tax_rate_slab(new_slab(dec!(0), Some(dec!(1200000)), dec!(0)))
            .await
            .expect("Should create slab");

        slab.rate_percent = dec!(2.5);
        slab.description = "edited".to_string();
        repo.update_tax_rate_slab(&slab)
            .await
            .expect("Should update slab");

        let fetched = repo.get_tax_rate_slab(slab.id).await;
        assert_eq!(fetched, Ok(slab));
    }

    #[tokio::test]
    async fn test_update_tax_rate_slab_not_found() {
        let repo = setup_test_db().await;
        let slab = TaxRateSlab {
            id: 99999,
            min_income: dec!(0),
            max_income: None,
            rate_percent: dec!(0),
            description: String::new(),
        };

        let result = repo.update_tax_rate_slab(&slab).await;

        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_tax_rate_slab() {
        let repo = setup_test_db().await;
        let slab = repo
            .create_tax_rate_slab(new_slab(dec!(0), None, dec!(0)))
            .await
            .expect("Should create slab");

        repo.delete_tax_rate_slab(slab.id)
            .await
            .expect("Should delete slab");

        assert_eq!(
            repo.get_tax_rate_slab(slab.id).await,
            Err(RepositoryError::NotFound)
        );
        assert_eq!(
            repo.delete_tax_rate_slab(slab.id).await,
            Err(RepositoryError::NotFound)
        );
    }

    // =========================================================================
    // relief records
    // =========================================================================

    #[tokio::test]
    async fn test_create_and_get_relief() {
        let repo = setup_test_db().await;

        let created = repo
            .create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");

        assert!(created.id > 0);
        assert_eq!(created.user_id, 7);
        assert_eq!(created.tax_year, 2024);
        assert_eq!(created.income, dec!(5400000));
        assert_eq!(created.deduction, dec!(200000));

        let fetched = repo.get_relief(created.id).await.expect("Should fetch relief");
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_get_relief_not_found() {
        let repo = setup_test_db().await;

        let result = repo.get_relief(99999).await;

        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_duplicate_user_year_is_rejected() {
        let repo = setup_test_db().await;
        repo.create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");

        let result = repo.create_relief(new_relief(7, 2024)).await;

        assert!(matches!(result, Err(RepositoryError::Database(_))));
    }

    #[tokio::test]
    async fn test_find_relief() {
        let repo = setup_test_db().await;
        let created = repo
            .create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");

        assert_eq!(repo.find_relief(7, 2024).await, Ok(Some(created)));
        assert_eq!(repo.find_relief(7, 2023).await, Ok(None));
        assert_eq!(repo.find_relief(8, 2024).await, Ok(None));
    }

    #[tokio::test]
    async fn test_update_relief() {
        let repo = setup_test_db().await;
        let mut relief = repo
            .create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");

        relief.income = dec!(3000000.75);
        relief.deduction = dec!(0);
        repo.update_relief(&relief)
            .await
            .expect("Should update relief");

        let fetched = repo.get_relief(relief.id).await.expect("Should fetch relief");
        assert_eq!(fetched.income, dec!(3000000.75));
        assert_eq!(fetched.deduction, dec!(0));
        assert!(fetched.updated_at >= relief.updated_at);
    }

    #[tokio::test]
    async fn test_update_relief_not_found() {
        let repo = setup_test_db().await;
        let mut relief = repo
            .create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");
        relief.id = 99999;

        let result = repo.update_relief(&relief).await;

        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_relief_removes_entries() {
        let repo = setup_test_db().await;
        let relief = repo
            .create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");
        repo.add_relief_entry(NewReliefEntry {
            relief_id: relief.id,
            description: "insurance".to_string(),
            amount: dec!(60000),
        })
        .await
        .expect("Should add entry");

        repo.delete_relief(relief.id)
            .await
            .expect("Should delete relief");

        assert_eq!(repo.get_relief(relief.id).await, Err(RepositoryError::NotFound));
        assert_eq!(repo.list_relief_entries(relief.id).await, Ok(vec![]));
    }

    fn line(
        description: &str,
        amount: rust_decimal::Decimal,
    ) -> ReliefLine {
        ReliefLine {
            description: description.to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_replace_relief_inserts_when_absent() {
        let repo = setup_test_db().await;

        let replaced = repo
            .replace_relief(
                new_relief(7, 2024),
                vec![line("insurance", dec!(60000)), line("pension", dec!(40000))],
            )
            .await
            .expect("Should replace relief");

        assert_eq!(replaced.replaced_id, None);
        assert_eq!(replaced.relief.user_id, 7);
        assert_eq!(
            repo.list_relief_entries(replaced.relief.id).await,
            Ok(replaced.entries.clone())
        );
        assert_eq!(replaced.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_relief_swaps_record_and_entries() {
        let repo = setup_test_db().await;
        let first = repo
            .replace_relief(new_relief(7, 2024), vec![line("insurance", dec!(60000))])
            .await
            .expect("Should insert relief");

        let second = repo
            .replace_relief(
                NewTaxRelief {
                    income: dec!(6000000),
                    ..new_relief(7, 2024)
                },
                vec![line("pension", dec!(40000))],
            )
            .await
            .expect("Should replace relief");

        assert_eq!(second.replaced_id, Some(first.relief.id));
        assert_eq!(repo.get_relief(first.relief.id).await, Err(RepositoryError::NotFound));
        assert_eq!(repo.list_relief_entries(first.relief.id).await, Ok(vec![]));

        let stored = repo
            .find_relief(7, 2024)
            .await
            .expect("Should query relief")
            .expect("Relief should exist");
        assert_eq!(stored.income, dec!(6000000));
        let descriptions: Vec<_> = repo
            .list_relief_entries(stored.id)
            .await
            .expect("Should list entries")
            .into_iter()
            .map(|e| e.description)
            .collect();
        assert_eq!(descriptions, vec!["pension".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_relief_failure_keeps_previous_record() {
        let repo = setup_test_db().await;
        let original = repo
            .replace_relief(new_relief(7, 2024), vec![line("insurance", dec!(60000))])
            .await
            .expect("Should insert relief");
        sqlx::query(
            "CREATE TRIGGER reject_entry BEFORE INSERT ON relief_entry
             WHEN NEW.description = 'rejected'
             BEGIN SELECT RAISE(ABORT, 'entry rejected'); END",
        )
        .execute(repo.pool())
        .await
        .expect("Should create trigger");

        let result = repo
            .replace_relief(
                new_relief(7, 2024),
                vec![line("pension", dec!(40000)), line("rejected", dec!(1))],
            )
            .await;

        assert!(matches!(result, Err(RepositoryError::Database(_))));
        assert_eq!(repo.get_relief(original.relief.id).await, Ok(original.relief.clone()));
        assert_eq!(
            repo.list_relief_entries(original.relief.id).await,
            Ok(original.entries)
        );
        assert_eq!(repo.list_reliefs(None).await.map(|r| r.len()), Ok(1));
    }

    #[tokio::test]
    async fn test_delete_relief_not_found() {
        let repo = setup_test_db().await;

        let result = repo.delete_relief(99999).await;

        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_reliefs() {
        let repo = setup_test_db().await;
        repo.create_relief(new_relief(2, 2024)).await.expect("Should create");
        repo.create_relief(new_relief(1, 2024)).await.expect("Should create");
        repo.create_relief(new_relief(1, 2023)).await.expect("Should create");

        let all = repo.list_reliefs(None).await.expect("Should list all");
        assert_eq!(all.len(), 3);

        let for_2024 = repo.list_reliefs(Some(2024)).await.expect("Should list 2024");
        let users: Vec<_> = for_2024.iter().map(|r| r.user_id).collect();
        assert_eq!(users, vec![1, 2]);
        assert!(for_2024.iter().all(|r| r.tax_year == 2024));

        let for_1999 = repo.list_reliefs(Some(1999)).await.expect("Should list 1999");
        assert!(for_1999.is_empty());
    }

    // =========================================================================
    // relief entries
    // =========================================================================

    #[tokio::test]
    async fn test_add_and_list_relief_entries() {
        let repo = setup_test_db().await;
        let relief = repo
            .create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");
        let other = repo
            .create_relief(new_relief(8, 2024))
            .await
            .expect("Should create relief");

        for (relief_id, amount) in [(relief.id, dec!(60000)), (other.id, dec!(5)), (relief.id, dec!(40000.50))] {
            repo.add_relief_entry(NewReliefEntry {
                relief_id,
                description: "entry".to_string(),
                amount,
            })
            .await
            .expect("Should add entry");
        }

        let entries = repo
            .list_relief_entries(relief.id)
            .await
            .expect("Should list entries");

        let amounts: Vec<_> = entries.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![dec!(60000), dec!(40000.50)]);
        assert!(entries.iter().all(|e| e.relief_id == relief.id));
    }

    #[tokio::test]
    async fn test_add_entry_for_missing_relief_fails() {
        let repo = setup_test_db().await;

        let result = repo
            .add_relief_entry(NewReliefEntry {
                relief_id: 99999,
                description: "orphan".to_string(),
                amount: dec!(1),
            })
            .await;

        assert!(matches!(result, Err(RepositoryError::Database(_))));
    }

    #[tokio::test]
    async fn test_delete_relief_entry() {
        let repo = setup_test_db().await;
        let relief = repo
            .create_relief(new_relief(7, 2024))
            .await
            .expect("Should create relief");
        let entry = repo
            .add_relief_entry(NewReliefEntry {
                relief_id: relief.id,
                description: "insurance".to_string(),
                amount: dec!(60000),
            })
            .await
            .expect("Should add entry");

        repo.delete_relief_entry(entry.id)
            .await
            .expect("Should delete entry");

        assert_eq!(repo.list_relief_entries(relief.id).await, Ok(vec![]));
        assert_eq!(
            repo.delete_relief_entry(entry.id).await,
            Err(RepositoryError::NotFound)
        );
    }

    // =========================================================================
    // seeds
    // =========================================================================

    #[tokio::test]
    async fn test_run_seeds() {
        let repo = setup_test_db().await;

        let seeds_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("seeds");
        repo.run_seeds(&seeds_dir)
            .await
            .expect("Should run seeds successfully");

        let slabs = repo.list_tax_rate_slabs().await.expect("Should list slabs");
        assert_eq!(slabs.len(), 7);
        assert_eq!(slabs[6].max_income, None);
        assert_eq!(slabs[6].rate_percent, dec!(36));

        // Seeded table agrees with the schedule tax is computed with.
        assert_eq!(compare_with_schedule(&slabs, &BracketSchedule::REFERENCE), vec![]);
    }

    #[tokio::test]
    async fn test_run_seeds_twice_is_harmless() {
        let repo = setup_test_db().await;
        let seeds_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("seeds");

        repo.run_seeds(&seeds_dir).await.expect("First run");
        repo.run_seeds(&seeds_dir).await.expect("Second run");

        let slabs = repo.list_tax_rate_slabs().await.expect("Should list slabs");
        assert_eq!(slabs.len(), 7);
    }

    #[tokio::test]
    async fn test_run_seeds_nonexistent_directory() {
        let repo = setup_test_db().await;

        let result = repo.run_seeds(Path::new("./nonexistent")).await;

        let err = result.expect_err("Should fail for nonexistent directory");
        assert_eq!(
            err.to_string(),
            "Failed to read seeds directory './nonexistent'"
        );
    }
}
