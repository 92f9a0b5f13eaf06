use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use invoice_reconciliation::{
    init_logging, ingest_invoices, run_ingestion, AppConfig, IngestionCoordinator,
    PersistenceGateway, SqliteStore,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Parser, Debug)]
#[command(name = "invoice-recon", version, about = "Invoice feed ingestion and reconciliation store")]
struct Cli {
    /// SQLite database path (overrides RECON_DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and, optionally, a company
    Init {
        #[arg(long)]
        company_name: Option<String>,
    },
    /// Validate a CSV feed without touching the store
    Validate { csv: PathBuf },
    /// Validate a CSV feed and persist accepted invoices
    Ingest {
        csv: PathBuf,
        /// Company to attach invoices to (overrides RECON_COMPANY_ID)
        #[arg(long)]
        company_id: Option<i64>,
        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List invoices still awaiting payment
    Outstanding {
        #[arg(long)]
        company_id: Option<i64>,
    },
    /// List payments not fully covered by reconciliations
    Unmatched {
        #[arg(long)]
        company_id: Option<i64>,
    },
    /// Verify the store can be reached
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(path) = cli.database {
        config.store.path = path;
    }
    init_logging(&config.log)?;

    match cli.command {
        Command::Init { company_name } => run_init(&config, company_name.as_deref()),
        Command::Validate { csv } => run_validate(&config, csv),
        Command::Ingest {
            csv,
            company_id,
            report,
        } => run_ingest(&config, csv, company_id.unwrap_or(config.company_id), report),
        Command::Outstanding { company_id } => {
            run_outstanding(&config, company_id.unwrap_or(config.company_id))
        }
        Command::Unmatched { company_id } => {
            run_unmatched(&config, company_id.unwrap_or(config.company_id))
        }
        Command::Check => run_check(&config),
    }
}

fn run_init(config: &AppConfig, company_name: Option<&str>) -> Result<()> {
    let store = SqliteStore::new(config.store.clone());

    println!("🔧 Setting up database at {}...", config.store.path.display());
    store.setup_database().context("Failed to set up database")?;
    println!("✓ Schema ready (WAL mode)");

    if let Some(name) = company_name {
        let id = store.create_company(name).context("Failed to create company")?;
        println!("✓ Created company '{}' with id {}", name, id);
    }

    Ok(())
}

fn print_counts(total: usize, valid: usize, rejected: usize) {
    println!("\n{}", RULE);
    println!("Total records:    {}", total);
    println!("Valid records:    {}", valid);
    println!("Rejected records: {}", rejected);
}

fn run_validate(config: &AppConfig, csv: PathBuf) -> Result<()> {
    println!("📂 Validating {}...", csv.display());
    // Field errors are reported through the log, capped at the display limit
    let outcome = ingest_invoices(&csv, config.error_display_limit);
    print_counts(outcome.total, outcome.accepted.len(), outcome.rejected());
    Ok(())
}

fn run_ingest(
    config: &AppConfig,
    csv: PathBuf,
    company_id: i64,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let store = SqliteStore::new(config.store.clone());
    let company = store
        .require_company(company_id)
        .with_context(|| format!("Company {} is not available", company_id))?;

    println!("📂 Ingesting {} for '{}'...", csv.display(), company.name);
    let coordinator = IngestionCoordinator::new(&store);
    let report = run_ingestion(&csv, company.id, &coordinator).context("Ingestion failed")?;

    println!("Run: {}", report.run_id);
    print_counts(report.total_records, report.accepted, report.rejected);

    let (shown, hidden) = report.displayed_errors(config.error_display_limit);
    if !shown.is_empty() {
        println!("\n❌ Validation errors:");
        for err in shown {
            println!("   {}", err);
        }
        if hidden > 0 {
            println!("   ... and {} more errors", hidden);
        }
    }

    println!("\n💾 Insertion:");
    println!("✓ Customers created:  {}", report.stats.customers_created);
    println!("✓ Customers existing: {}", report.stats.customers_existing);
    println!("✓ Invoices inserted:  {}", report.stats.invoices_inserted);
    if !report.stats.errors.is_empty() {
        println!("❌ Errors: {}", report.stats.errors.len());
        for err in &report.stats.errors {
            println!("   {}", err);
        }
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("\n📝 Report written to {}", path.display());
    }

    Ok(())
}

fn run_outstanding(config: &AppConfig, company_id: i64) -> Result<()> {
    let store = SqliteStore::new(config.store.clone());
    let invoices = store.get_outstanding_invoices(company_id)?;

    println!("📊 {} outstanding invoices", invoices.len());
    println!("{}", RULE);
    for invoice in &invoices {
        println!(
            "{:<12} {:>12.2} {:<3}  due {}  {:<18} {} <{}>",
            invoice.invoice_number,
            invoice.amount,
            invoice.currency,
            invoice.due_date,
            invoice.status.as_str(),
            invoice.customer_name,
            invoice.customer_email
        );
    }

    Ok(())
}

fn run_unmatched(config: &AppConfig, company_id: i64) -> Result<()> {
    let store = SqliteStore::new(config.store.clone());
    let payments = store.get_unmatched_payments(company_id)?;

    println!("📊 {} unmatched payments", payments.len());
    println!("{}", RULE);
    for payment in &payments {
        println!(
            "{:<16} {}  {:>12.2} matched {:>12.2} remaining {:>12.2}  {}",
            payment.external_id,
            payment.payment_date,
            payment.amount,
            payment.amount_matched,
            payment.amount_remaining,
            payment.customer_name
        );
    }

    Ok(())
}

fn run_check(config: &AppConfig) -> Result<()> {
    let store = SqliteStore::new(config.store.clone());
    store
        .check_connection()
        .with_context(|| format!("Cannot reach {}", config.store.path.display()))?;
    println!("✅ Database connection OK: {}", config.store.path.display());
    Ok(())
}
