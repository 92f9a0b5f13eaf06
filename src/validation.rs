// Record Validator - runs every column rule plus the cross-field date rule
//
// A record is accepted only when all of its checks pass. Every failing
// check becomes one FieldError; rejected records are never partially kept.

use crate::source::RawRecord;
use crate::validators::{validate_invoice_dates, Column};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ============================================================================
// FIELD ERROR
// ============================================================================

/// One failed check on one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub line_number: usize,
    pub field: String,
    pub value: String,
    pub error: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.error
        )
    }
}

// ============================================================================
// VALIDATION OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub accepted: Vec<RawRecord>,
    pub errors: Vec<FieldError>,
    /// Records examined
    pub total: usize,
}

impl ValidationOutcome {
    /// Records excluded from `accepted`
    pub fn rejected(&self) -> usize {
        self.total.saturating_sub(self.accepted.len())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records: {} valid, {} rejected, {} field errors",
            self.total,
            self.accepted.len(),
            self.rejected(),
            self.errors.len()
        )
    }

    /// First `limit` errors for display. All errors stay in `errors`.
    pub fn displayed_errors(&self, limit: usize) -> (&[FieldError], usize) {
        displayed_errors(&self.errors, limit)
    }

    /// Log the summary and up to `limit` errors
    pub fn log_errors(&self, limit: usize) {
        info!(
            total = self.total,
            valid = self.accepted.len(),
            rejected = self.rejected(),
            "Validation complete"
        );

        let (shown, hidden) = self.displayed_errors(limit);
        for err in shown {
            warn!(
                line = err.line_number,
                field = %err.field,
                value = %err.value,
                "{}",
                err.error
            );
        }
        if hidden > 0 {
            warn!("... and {} more errors", hidden);
        }
    }
}

/// Split `errors` into the first `limit` to show and the count left hidden
pub fn displayed_errors(errors: &[FieldError], limit: usize) -> (&[FieldError], usize) {
    let shown = errors.len().min(limit);
    (&errors[..shown], errors.len() - shown)
}

// ============================================================================
// RECORD VALIDATOR
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        RecordValidator
    }

    /// Validate all records. `None` means there was nothing to validate.
    ///
    /// The column set comes from the first record; every record is
    /// checked against that set in header order.
    pub fn validate(&self, records: &[RawRecord]) -> Option<ValidationOutcome> {
        let first = records.first()?;

        let columns: Vec<Column> = first.columns().map(Column::from_name).collect();
        let mut outcome = ValidationOutcome {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            let errors_before = outcome.errors.len();
            self.validate_record(record, &columns, &mut outcome.errors);

            if outcome.errors.len() == errors_before {
                outcome.accepted.push(record.clone());
            } else {
                debug!(
                    line = record.line_number,
                    errors = outcome.errors.len() - errors_before,
                    "Record rejected"
                );
            }
        }

        Some(outcome)
    }

    /// Append one FieldError per failing check on `record`
    pub fn validate_record(
        &self,
        record: &RawRecord,
        columns: &[Column],
        errors: &mut Vec<FieldError>,
    ) {
        for column in columns {
            let value = record.value(column.name());
            if let Err(error) = column.check(value) {
                errors.push(FieldError {
                    line_number: record.line_number,
                    field: column.name().to_string(),
                    value: value.to_string(),
                    error,
                });
            }
        }

        let issue_date = record.value(Column::IssueDate.name());
        let due_date = record.value(Column::DueDate.name());
        if let Err((failure, error)) = validate_invoice_dates(issue_date, due_date) {
            let column = failure.column();
            errors.push(FieldError {
                line_number: record.line_number,
                field: column.name().to_string(),
                value: record.value(column.name()).to_string(),
                error,
            });
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
