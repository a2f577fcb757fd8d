use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use relief_core::calculations::{TaxLiabilityCalculator, compare_with_schedule};
use relief_core::{BracketSchedule, ReliefRepository, TaxableIncomeInputs, total_relief};
use relief_data::{ReliefRecordLoader, ReliefReport};
use relief_db_sqlite::SqliteRepository;
use rust_decimal::Decimal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ─── CLI definition ──────────────────────────────────────────────────────────

/// Progressive income tax calculator with itemized tax relief.
#[derive(Debug, Parser)]
#[command(name = "relief")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    #[command(subcommand)]
    command: Command,
}

/// Database options shared by every command that reads or writes records.
#[derive(Debug, Args)]
struct DbArgs {
    /// SQLite database URL (e.g., sqlite:relief.db?mode=rwc to create if missing)
    #[arg(short, long, global = true, default_value = "sqlite:relief.db?mode=rwc")]
    database: String,

    /// Run database migrations before the command
    #[arg(short, long, global = true, default_value_t = false)]
    migrate: bool,

    /// Run seed files from the specified directory after migrations
    #[arg(short, long, global = true)]
    seeds: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the tax owed for one set of amounts. Does not touch the database.
    Calc {
        #[arg(long)]
        income: Decimal,

        #[arg(long, default_value = "0")]
        deduction: Decimal,

        /// Relief amount; repeat for each itemized entry
        #[arg(long = "relief")]
        reliefs: Vec<Decimal>,
    },

    /// Import relief records from a CSV file
    Load {
        /// Path to the CSV file (user_id,tax_year,income,deduction,description,amount)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Write a CSV report of the tax owed by every stored record
    Report {
        /// Only include records of this tax year
        #[arg(long)]
        tax_year: Option<i32>,

        /// Output file; defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the admin tax rate slabs
    Slabs {
        /// Compare the slabs with the schedule tax is computed with
        #[arg(long, default_value_t = false)]
        check: bool,
    },
}

// ─── tracing ─────────────────────────────────────────────────────────────────

/// Initialise the tracing subscriber.
///
/// * Honours `RUST_LOG` when set, falling back to `info`.
/// * Writes to stderr so report output on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::from("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

// ─── commands ────────────────────────────────────────────────────────────────

fn run_calc(
    income: Decimal,
    deduction: Decimal,
    reliefs: &[Decimal],
) -> Result<()> {
    let relief = total_relief(reliefs.iter().copied())?;
    let inputs = TaxableIncomeInputs::new(income, deduction, relief)?;
    let result = TaxLiabilityCalculator::reference().calculate(&inputs)?;

    println!("Taxable income: {}", result.taxable_income);
    for slice in &result.slices {
        println!(
            "  bracket {} at {}%: {} -> {}",
            slice.index + 1,
            (slice.rate * Decimal::ONE_HUNDRED).normalize(),
            slice.amount,
            slice.tax
        );
    }
    println!("Tax owed: {}", result.tax_owed);
    Ok(())
}

impl DbArgs {
    async fn open(&self) -> Result<SqliteRepository> {
        debug!(database = %self.database, "Opening database");
        let repo = SqliteRepository::new(&self.database)
            .await
            .with_context(|| format!("Failed to connect to database: {}", self.database))?;

        if self.migrate {
            info!("Running migrations");
            repo.run_migrations()
                .await
                .context("Failed to run migrations")?;
        }

        if let Some(seeds_dir) = &self.seeds {
            info!(seeds = %seeds_dir.display(), "Running seeds");
            repo.run_seeds(seeds_dir)
                .await
                .with_context(|| format!("Failed to run seeds from: {}", seeds_dir.display()))?;
        }

        Ok(repo)
    }
}

async fn run_load(
    repo: &dyn ReliefRepository,
    file: &Path,
) -> Result<()> {
    let reader =
        File::open(file).with_context(|| format!("Failed to open: {}", file.display()))?;

    let records = ReliefRecordLoader::parse(reader)
        .with_context(|| format!("Failed to parse CSV: {}", file.display()))?;
    info!(records = records.len(), "Parsed relief records");

    let outcome = ReliefRecordLoader::load(repo, &records)
        .await
        .context("Failed to load relief records into database")?;

    info!(
        records = outcome.records,
        entries = outcome.entries,
        replaced = outcome.replaced,
        "Loaded relief records"
    );
    Ok(())
}

async fn run_report(
    repo: &dyn ReliefRepository,
    tax_year: Option<i32>,
    output: Option<&Path>,
) -> Result<()> {
    let report = ReliefReport::build(repo, tax_year, &TaxLiabilityCalculator::reference())
        .await
        .context("Failed to build report")?;

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create: {}", path.display()))?;
            report.write_csv(file)?;
            info!(path = %path.display(), records = report.totals.records, "Wrote report");
        }
        None => report.write_csv(io::stdout().lock())?,
    }
    Ok(())
}

async fn run_slabs(
    repo: &dyn ReliefRepository,
    check: bool,
) -> Result<()> {
    let slabs = repo
        .list_tax_rate_slabs()
        .await
        .context("Failed to list tax rate slabs")?;

    for slab in &slabs {
        let upper = slab
            .max_income
            .map(|max| max.to_string())
            .unwrap_or_else(|| "and above".to_string());
        println!(
            "{:>12} - {:<12} {:>5}%  {}",
            slab.min_income, upper, slab.rate_percent, slab.description
        );
    }

    if check {
        let discrepancies = compare_with_schedule(&slabs, &BracketSchedule::REFERENCE);
        if !discrepancies.is_empty() {
            bail!(
                "{} tax rate slab discrepancies found; tax is still computed with the built-in schedule",
                discrepancies.len()
            );
        }
        info!("Tax rate slabs match the calculation schedule");
    }
    Ok(())
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let Cli { db, command } = Cli::parse();

    match command {
        Command::Calc {
            income,
            deduction,
            reliefs,
        } => run_calc(income, deduction, &reliefs),
        Command::Load { file } => run_load(&db.open().await?, &file).await,
        Command::Report { tax_year, output } => {
            run_report(&db.open().await?, tax_year, output.as_deref()).await
        }
        Command::Slabs { check } => run_slabs(&db.open().await?, check).await,
    }
}
