// Ingestion - feed → validation → per-record persistence
//
// Records are persisted one at a time, in input order. A failure on one
// record is recorded in the stats and never stops the batch. Only an
// unreadable feed or an unreachable store before the first record is fatal.

use crate::error::{IngestError, SourceError, StoreError};
use crate::source::{read_feed, RawRecord};
use crate::store::{InvoiceStatus, NewInvoice, PersistenceGateway};
use crate::validation::{displayed_errors, FieldError, RecordValidator, ValidationOutcome};
use crate::validators::{validate_amount, validate_currency, validate_date, Column};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

// ============================================================================
// STATS
// ============================================================================

/// Insertion statistics for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub customers_created: usize,
    pub customers_existing: usize,
    pub invoices_inserted: usize,
    pub errors: Vec<String>,
}

impl IngestionStats {
    pub fn summary(&self) -> String {
        format!(
            "Customers created: {}, existing: {}, invoices inserted: {}, errors: {}",
            self.customers_created,
            self.customers_existing,
            self.invoices_inserted,
            self.errors.len()
        )
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// How a record's customer was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CustomerResolution {
    Existing(i64),
    Created(i64),
}

pub struct IngestionCoordinator<G: PersistenceGateway> {
    gateway: G,
}

impl<G: PersistenceGateway> IngestionCoordinator<G> {
    pub fn new(gateway: G) -> Self {
        IngestionCoordinator { gateway }
    }

    /// Persist accepted records for `company_id`.
    ///
    /// Fails only if the store is unreachable before any record is
    /// attempted; per-record failures land in `IngestionStats::errors`.
    pub fn insert_invoices(
        &self,
        records: &[RawRecord],
        company_id: i64,
    ) -> Result<IngestionStats, StoreError> {
        self.gateway.check_connection()?;

        info!(count = records.len(), company_id, "Inserting invoices");

        let mut stats = IngestionStats::default();
        for record in records {
            let invoice_number = record.value(Column::InvoiceNumber.name()).trim();

            match self.persist_record(record, company_id, &mut stats) {
                Ok((customer_id, invoice_id)) => {
                    stats.invoices_inserted += 1;
                    info!(
                        invoice_id,
                        customer_id,
                        invoice_number,
                        amount = record.value(Column::Amount.name()),
                        "Inserted invoice"
                    );
                }
                Err(e) => {
                    let message = format!("Failed to insert {}: {}", invoice_number, e);
                    if e.is_constraint_violation() {
                        warn!(line = record.line_number, "{}", message);
                    } else {
                        error!(line = record.line_number, "{}", message);
                    }
                    stats.errors.push(message);
                }
            }
        }

        Ok(stats)
    }

    /// Resolve the customer, then write the invoice. The customer counters
    /// move as soon as the customer is resolved.
    fn persist_record(
        &self,
        record: &RawRecord,
        company_id: i64,
        stats: &mut IngestionStats,
    ) -> Result<(i64, i64), StoreError> {
        let customer_id = match self.resolve_customer(record, company_id)? {
            CustomerResolution::Existing(id) => {
                stats.customers_existing += 1;
                id
            }
            CustomerResolution::Created(id) => {
                stats.customers_created += 1;
                id
            }
        };

        let invoice = new_invoice(record, company_id, customer_id)?;
        let invoice_id = self.gateway.create_invoice(&invoice)?;
        Ok((customer_id, invoice_id))
    }

    /// Reuse the company's customer with this email, or create one
    fn resolve_customer(
        &self,
        record: &RawRecord,
        company_id: i64,
    ) -> Result<CustomerResolution, StoreError> {
        let email = record.value(Column::CustomerEmail.name()).trim();
        let name = record.value(Column::CustomerName.name()).trim();

        if let Some(customer) = self.gateway.find_customer_by_email(company_id, email)? {
            info!(customer_id = customer.id, name = %customer.name, "Found customer");
            return Ok(CustomerResolution::Existing(customer.id));
        }

        let id = self.gateway.create_customer(company_id, name, email, None)?;
        info!(customer_id = id, name, "Created customer");
        Ok(CustomerResolution::Created(id))
    }
}

/// Typed invoice from an accepted record. Re-parses the raw fields, so a
/// record that skipped validation fails here instead of in the store.
pub fn new_invoice(
    record: &RawRecord,
    company_id: i64,
    customer_id: i64,
) -> Result<NewInvoice, StoreError> {
    let field = |column: Column| record.value(column.name());
    let invalid = |column: Column, reason: String| {
        StoreError::InvalidData(format!("{}: {}", column.name(), reason))
    };

    let amount =
        validate_amount(field(Column::Amount)).map_err(|e| invalid(Column::Amount, e))?;
    let currency =
        validate_currency(field(Column::Currency)).map_err(|e| invalid(Column::Currency, e))?;
    let issue_date =
        validate_date(field(Column::IssueDate)).map_err(|e| invalid(Column::IssueDate, e))?;
    let due_date =
        validate_date(field(Column::DueDate)).map_err(|e| invalid(Column::DueDate, e))?;

    Ok(NewInvoice {
        company_id,
        customer_id,
        invoice_number: field(Column::InvoiceNumber).trim().to_string(),
        amount,
        currency,
        issue_date,
        due_date,
        status: InvoiceStatus::Open,
    })
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Read and validate a feed. `Ok(None)` means the feed had no rows.
pub fn validate_feed(path: &Path) -> Result<Option<(ValidationOutcome, String)>, SourceError> {
    let feed = read_feed(path)?;
    info!(path = %path.display(), records = feed.records.len(), "Read invoice feed");

    let outcome = RecordValidator::new().validate(&feed.records);
    Ok(outcome.map(|o| (o, feed.sha256)))
}

/// Read and validate a feed, reporting an unreadable feed as an empty
/// outcome (zero valid, zero rejected) instead of failing.
pub fn ingest_invoices(path: &Path, display_limit: usize) -> ValidationOutcome {
    let outcome = match validate_feed(path) {
        Ok(Some((outcome, _))) => outcome,
        Ok(None) => {
            warn!(path = %path.display(), "Feed contains no records");
            ValidationOutcome::default()
        }
        Err(e) => {
            error!(path = %path.display(), "Failed to parse CSV: {}", e);
            ValidationOutcome::default()
        }
    };

    outcome.log_errors(display_limit);
    outcome
}

/// Everything observable about one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub source: String,
    pub feed_sha256: Option<String>,
    pub company_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_records: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub validation_errors: Vec<FieldError>,
    pub stats: IngestionStats,
}

impl IngestionReport {
    /// First `limit` validation errors for display, plus the hidden count
    pub fn displayed_errors(&self, limit: usize) -> (&[FieldError], usize) {
        displayed_errors(&self.validation_errors, limit)
    }

    pub fn summary(&self) -> String {
        format!(
            "Run {}: {} records, {} accepted, {} rejected | {}",
            self.run_id,
            self.total_records,
            self.accepted,
            self.rejected,
            self.stats.summary()
        )
    }
}

/// Full run: read, validate, persist accepted records
pub fn run_ingestion<G: PersistenceGateway>(
    path: &Path,
    company_id: i64,
    coordinator: &IngestionCoordinator<G>,
) -> Result<IngestionReport, IngestError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("ingestion", %run_id, company_id);
    let _guard = span.enter();
    let started_at = Utc::now();

    let (outcome, sha256) = match validate_feed(path)? {
        Some((outcome, sha256)) => (outcome, Some(sha256)),
        None => (ValidationOutcome::default(), None),
    };

    let stats = if outcome.accepted.is_empty() {
        warn!("No valid records to insert");
        IngestionStats::default()
    } else {
        coordinator.insert_invoices(&outcome.accepted, company_id)?
    };

    let report = IngestionReport {
        run_id,
        source: path.display().to_string(),
        feed_sha256: sha256,
        company_id,
        started_at,
        finished_at: Utc::now(),
        total_records: outcome.total,
        accepted: outcome.accepted.len(),
        rejected: outcome.rejected(),
        validation_errors: outcome.errors,
        stats,
    };
    info!("{}", report.summary());
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
