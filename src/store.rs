// Store - entities and the persistence contract used by ingestion
//
// Entities are owned by the store and identified by store-assigned ids.
// The ingestion pipeline only talks to the store through PersistenceGateway.

use crate::error::StoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Invoice lifecycle. Ingestion only ever creates `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Open,
    PartiallyMatched,
    Overdue,
    Paid,
    Closed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "OPEN",
            InvoiceStatus::PartiallyMatched => "PARTIALLY_MATCHED",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Closed => "CLOSED",
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(InvoiceStatus::Open),
            "PARTIALLY_MATCHED" => Ok(InvoiceStatus::PartiallyMatched),
            "OVERDUE" => Ok(InvoiceStatus::Overdue),
            "PAID" => Ok(InvoiceStatus::Paid),
            "CLOSED" => Ok(InvoiceStatus::Closed),
            other => Err(StoreError::InvalidData(format!(
                "Unknown invoice status: {}",
                other
            ))),
        }
    }
}

/// Review state of an invoice/payment match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::PendingReview => "PENDING_REVIEW",
            ReconciliationStatus::Approved => "APPROVED",
            ReconciliationStatus::Rejected => "REJECTED",
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Invoice to be written. `amount > 0` and `due_date >= issue_date` are
/// guaranteed by validation upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub company_id: i64,
    pub customer_id: i64,
    pub invoice_number: String,
    pub amount: f64,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
}

/// Outstanding invoice joined with its customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutstandingInvoice {
    pub id: i64,
    pub customer_id: i64,
    pub invoice_number: String,
    pub amount: f64,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub customer_name: String,
    pub customer_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub company_id: i64,
    pub customer_id: i64,
    pub external_id: String,
    pub amount: f64,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
}

/// Payment with amount not yet covered by live reconciliations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedPayment {
    pub id: i64,
    pub external_id: String,
    pub payment_date: NaiveDate,
    pub amount: f64,
    pub customer_name: String,
    pub amount_matched: f64,
    pub amount_remaining: f64,
}

/// Storage shape of an invoice/payment match. How matches and scores are
/// produced is outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReconciliation {
    pub company_id: i64,
    pub invoice_id: i64,
    pub payment_id: i64,
    pub matched_amount: f64,
    /// 0..=100
    pub confidence_score: u8,
    pub status: ReconciliationStatus,
    pub matched_by: String,
}

impl NewReconciliation {
    /// System-proposed match awaiting review
    pub fn proposed(
        company_id: i64,
        invoice_id: i64,
        payment_id: i64,
        matched_amount: f64,
        confidence_score: u8,
    ) -> Self {
        NewReconciliation {
            company_id,
            invoice_id,
            payment_id,
            matched_amount,
            confidence_score,
            status: ReconciliationStatus::PendingReview,
            matched_by: "SYSTEM".to_string(),
        }
    }
}

// ============================================================================
// PERSISTENCE GATEWAY
// ============================================================================

/// Operations the ingestion coordinator needs from the store.
///
/// Each call is one logical write (or read) with its own connection and,
/// for writes, its own transaction. Nothing is held across calls.
pub trait PersistenceGateway {
    /// Fail fast when the store cannot be reached at all
    fn check_connection(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn find_customer_by_email(
        &self,
        company_id: i64,
        email: &str,
    ) -> Result<Option<Customer>, StoreError>;

    /// Returns the new customer id
    fn create_customer(
        &self,
        company_id: i64,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<i64, StoreError>;

    /// Returns the new invoice id
    fn create_invoice(&self, invoice: &NewInvoice) -> Result<i64, StoreError>;
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for &G {
    fn check_connection(&self) -> Result<(), StoreError> {
        (**self).check_connection()
    }

    fn find_customer_by_email(
        &self,
        company_id: i64,
        email: &str,
    ) -> Result<Option<Customer>, StoreError> {
        (**self).find_customer_by_email(company_id, email)
    }

    fn create_customer(
        &self,
        company_id: i64,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<i64, StoreError> {
        (**self).create_customer(company_id, name, email, phone)
    }

    fn create_invoice(&self, invoice: &NewInvoice) -> Result<i64, StoreError> {
        (**self).create_invoice(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_status_round_trip_through_str() {
        for status in [
            InvoiceStatus::Open,
            InvoiceStatus::PartiallyMatched,
            InvoiceStatus::Overdue,
            InvoiceStatus::Paid,
            InvoiceStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("open".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_as_store_value() {
        let json = serde_json::to_string(&InvoiceStatus::PartiallyMatched).unwrap();
        assert_eq!(json, "\"PARTIALLY_MATCHED\"");

        let json = serde_json::to_string(&ReconciliationStatus::PendingReview).unwrap();
        assert_eq!(json, "\"PENDING_REVIEW\"");
    }

    #[test]
    fn test_proposed_reconciliation_defaults() {
        let rec = NewReconciliation::proposed(1, 2, 3, 50.0, 87);
        assert_eq!(rec.status, ReconciliationStatus::PendingReview);
        assert_eq!(rec.matched_by, "SYSTEM");
    }
}
