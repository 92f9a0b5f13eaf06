// Invoice Reconciliation - Core Library
// Invoice feed ingestion: CSV → validation → SQLite, used by the CLI and tests

pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod source;
pub mod store;
pub mod validation;
pub mod validators;

// Re-export commonly used types
pub use config::{AppConfig, StoreConfig};
pub use db::SqliteStore;
pub use error::{ConfigError, IngestError, SourceError, StoreError};
pub use ingestion::{
    ingest_invoices, run_ingestion, validate_feed, IngestionCoordinator, IngestionReport,
    IngestionStats,
};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use source::{parse_feed, read_feed, Feed, RawRecord};
pub use store::{
    Company, Customer, InvoiceStatus, NewInvoice, NewPayment, NewReconciliation,
    OutstandingInvoice, PersistenceGateway, ReconciliationStatus, UnmatchedPayment,
};
pub use validation::{FieldError, RecordValidator, ValidationOutcome};
pub use validators::{Column, VALID_CURRENCIES};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
