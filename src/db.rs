// SQLite store - PersistenceGateway backed by rusqlite
//
// One connection per operation, dropped on every exit path. Writes run in
// `with_transaction`: commit on success, rollback when the Transaction is
// dropped uncommitted.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::store::{
    Company, Customer, InvoiceStatus, NewInvoice, NewPayment, NewReconciliation,
    OutstandingInvoice, PersistenceGateway, UnmatchedPayment,
};
use crate::validators::DATE_FORMAT;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

pub struct SqliteStore {
    config: StoreConfig,
}

impl SqliteStore {
    pub fn new(config: StoreConfig) -> Self {
        SqliteStore { config }
    }

    /// Open a fresh connection with per-connection pragmas applied
    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.config.path).map_err(|source| StoreError::Connect {
            path: self.config.path.clone(),
            source,
        })?;
        conn.busy_timeout(self.config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Run `f` inside one transaction on a fresh connection
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read on a fresh connection
    fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    // ========================================================================
    // SCHEMA
    // ========================================================================

    /// Create tables and indexes if they do not exist yet
    pub fn setup_database(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;

        // Enable WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- (company_id, email) uniqueness is enforced by ingestion, not here
            CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                invoice_number TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount > 0),
                currency TEXT NOT NULL,
                issue_date TEXT NOT NULL,
                due_date TEXT NOT NULL CHECK (due_date >= issue_date),
                status TEXT NOT NULL DEFAULT 'OPEN'
                    CHECK (status IN ('OPEN', 'PARTIALLY_MATCHED', 'OVERDUE', 'PAID', 'CLOSED')),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (company_id, invoice_number)
            );

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                external_id TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount > 0),
                currency TEXT NOT NULL,
                payment_date TEXT NOT NULL,
                reference TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS reconciliations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                invoice_id INTEGER NOT NULL REFERENCES invoices(id),
                payment_id INTEGER NOT NULL REFERENCES payments(id),
                matched_amount REAL NOT NULL CHECK (matched_amount > 0),
                confidence_score INTEGER NOT NULL CHECK (confidence_score BETWEEN 0 AND 100),
                status TEXT NOT NULL DEFAULT 'PENDING_REVIEW'
                    CHECK (status IN ('PENDING_REVIEW', 'APPROVED', 'REJECTED')),
                matched_by TEXT NOT NULL DEFAULT 'SYSTEM',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS reconciliation_audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reconciliation_id INTEGER NOT NULL REFERENCES reconciliations(id),
                action TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                notes TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_customers_company_email ON customers(company_id, email);
            CREATE INDEX IF NOT EXISTS idx_invoices_company_status ON invoices(company_id, status);
            CREATE INDEX IF NOT EXISTS idx_invoices_due_date ON invoices(due_date);
            CREATE INDEX IF NOT EXISTS idx_payments_company ON payments(company_id);
            CREATE INDEX IF NOT EXISTS idx_reconciliations_payment ON reconciliations(payment_id);",
        )?;

        info!(path = %self.config.path.display(), "Database schema ready");
        Ok(())
    }

    // ========================================================================
    // COMPANIES
    // ========================================================================

    pub fn create_company(&self, name: &str) -> Result<i64, StoreError> {
        self.with_transaction(|tx| {
            tx.execute("INSERT INTO companies (name) VALUES (?1)", params![name])?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn get_company_by_id(&self, company_id: i64) -> Result<Option<Company>, StoreError> {
        self.with_connection(|conn| {
            let company = conn
                .query_row(
                    "SELECT id, name FROM companies WHERE id = ?1",
                    params![company_id],
                    |row| {
                        Ok(Company {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(company)
        })
    }

    /// Like `get_company_by_id`, but absence is an error
    pub fn require_company(&self, company_id: i64) -> Result<Company, StoreError> {
        self.get_company_by_id(company_id)?
            .ok_or(StoreError::NotFound {
                entity: "company",
                id: company_id,
            })
    }

    // ========================================================================
    // PAYMENTS / RECONCILIATIONS
    // ========================================================================

    pub fn insert_payment(&self, payment: &NewPayment) -> Result<i64, StoreError> {
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO payments (
                    company_id, customer_id, external_id, amount, currency, payment_date, reference
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    payment.company_id,
                    payment.customer_id,
                    payment.external_id,
                    payment.amount,
                    payment.currency,
                    format_date(payment.payment_date),
                    payment.reference,
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn insert_reconciliation(&self, rec: &NewReconciliation) -> Result<i64, StoreError> {
        if rec.confidence_score > 100 {
            return Err(StoreError::InvalidData(format!(
                "confidence_score must be 0..=100, got {}",
                rec.confidence_score
            )));
        }

        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO reconciliations (
                    company_id, invoice_id, payment_id, matched_amount,
                    confidence_score, status, matched_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    rec.company_id,
                    rec.invoice_id,
                    rec.payment_id,
                    rec.matched_amount,
                    rec.confidence_score,
                    rec.status.as_str(),
                    rec.matched_by,
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn insert_audit_log(
        &self,
        reconciliation_id: i64,
        action: &str,
        performed_by: &str,
        notes: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO reconciliation_audit_log (reconciliation_id, action, performed_by, notes)
                 VALUES (?1, ?2, ?3, ?4)",
                params![reconciliation_id, action, performed_by, notes],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Invoices still awaiting payment, earliest due date first
    pub fn get_outstanding_invoices(
        &self,
        company_id: i64,
    ) -> Result<Vec<OutstandingInvoice>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.id, i.customer_id, i.invoice_number, i.amount, i.currency,
                        i.issue_date, i.due_date, i.status,
                        c.name AS customer_name, c.email AS customer_email
                 FROM invoices AS i
                 JOIN customers AS c ON i.customer_id = c.id
                 WHERE i.company_id = ?1
                   AND i.status IN ('OPEN', 'PARTIALLY_MATCHED', 'OVERDUE')
                 ORDER BY i.due_date, i.id",
            )?;

            let invoices = stmt
                .query_map(params![company_id], |row| {
                    Ok(OutstandingInvoice {
                        id: row.get(0)?,
                        customer_id: row.get(1)?,
                        invoice_number: row.get(2)?,
                        amount: row.get(3)?,
                        currency: row.get(4)?,
                        issue_date: date_column(row, 5)?,
                        due_date: date_column(row, 6)?,
                        status: status_column(row, 7)?,
                        customer_name: row.get(8)?,
                        customer_email: row.get(9)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(invoices)
        })
    }

    /// Payments whose amount exceeds what non-rejected matches cover
    pub fn get_unmatched_payments(
        &self,
        company_id: i64,
    ) -> Result<Vec<UnmatchedPayment>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT
                    p.id,
                    p.external_id,
                    p.payment_date,
                    p.amount,
                    c.name AS customer_name,
                    COALESCE(SUM(r.matched_amount), 0) AS amount_matched,
                    p.amount - COALESCE(SUM(r.matched_amount), 0) AS amount_remaining
                 FROM payments AS p
                 JOIN customers AS c ON p.customer_id = c.id
                 LEFT JOIN reconciliations AS r
                   ON p.id = r.payment_id
                  AND r.status != 'REJECTED'
                 WHERE p.company_id = ?1
                 GROUP BY p.id, p.external_id, p.payment_date, p.amount, c.name
                 HAVING p.amount > COALESCE(SUM(r.matched_amount), 0)
                 ORDER BY p.payment_date, p.id",
            )?;

            let payments = stmt
                .query_map(params![company_id], |row| {
                    Ok(UnmatchedPayment {
                        id: row.get(0)?,
                        external_id: row.get(1)?,
                        payment_date: date_column(row, 2)?,
                        amount: row.get(3)?,
                        customer_name: row.get(4)?,
                        amount_matched: row.get(5)?,
                        amount_remaining: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(payments)
        })
    }

    pub fn count_invoices(&self, company_id: i64) -> Result<i64, StoreError> {
        self.with_connection(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM invoices WHERE company_id = ?1",
                params![company_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn count_customers(&self, company_id: i64) -> Result<i64, StoreError> {
        self.with_connection(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM customers WHERE company_id = ?1",
                params![company_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

// ============================================================================
// GATEWAY IMPL
// ============================================================================

impl PersistenceGateway for SqliteStore {
    fn check_connection(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    fn find_customer_by_email(
        &self,
        company_id: i64,
        email: &str,
    ) -> Result<Option<Customer>, StoreError> {
        self.with_connection(|conn| {
            let customer = conn
                .query_row(
                    "SELECT id, company_id, name, email, phone
                     FROM customers
                     WHERE company_id = ?1 AND email = ?2
                     ORDER BY id
                     LIMIT 1",
                    params![company_id, email],
                    |row| {
                        Ok(Customer {
                            id: row.get(0)?,
                            company_id: row.get(1)?,
                            name: row.get(2)?,
                            email: row.get(3)?,
                            phone: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(customer)
        })
    }

    fn create_customer(
        &self,
        company_id: i64,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<i64, StoreError> {
        let id = self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO customers (company_id, name, email, phone) VALUES (?1, ?2, ?3, ?4)",
                params![company_id, name, email, phone],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        debug!(customer_id = id, company_id, email, "Created customer");
        Ok(id)
    }

    fn create_invoice(&self, invoice: &NewInvoice) -> Result<i64, StoreError> {
        let id = self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO invoices (
                    company_id, customer_id, invoice_number, amount,
                    currency, issue_date, due_date, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    invoice.company_id,
                    invoice.customer_id,
                    invoice.invoice_number,
                    invoice.amount,
                    invoice.currency,
                    format_date(invoice.issue_date),
                    format_date(invoice.due_date),
                    invoice.status.as_str(),
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        debug!(invoice_id = id, invoice_number = %invoice.invoice_number, "Created invoice");
        Ok(id)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<InvoiceStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: StoreError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(StoreConfig {
            path: dir.path().join("test.db"),
            busy_timeout: Duration::from_millis(500),
        });
        store.setup_database().unwrap();
        (dir, store)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn new_invoice(company_id: i64, customer_id: i64, number: &str) -> NewInvoice {
        NewInvoice {
            company_id,
            customer_id,
            invoice_number: number.to_string(),
            amount: 100.0,
            currency: "USD".to_string(),
            issue_date: date("2024-01-01"),
            due_date: date("2024-02-01"),
            status: InvoiceStatus::Open,
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let (_dir, store) = test_store();
        store.setup_database().unwrap();
        store.check_connection().unwrap();
    }

    #[test]
    fn test_customer_lookup_by_email_is_scoped_to_company() {
        let (_dir, store) = test_store();
        let acme = store.create_company("Acme Corp").unwrap();
        let globex = store.create_company("Globex").unwrap();

        assert!(store.find_customer_by_email(acme, "a@x.com").unwrap().is_none());

        let id = store.create_customer(acme, "Alice", "a@x.com", None).unwrap();
        let found = store.find_customer_by_email(acme, "a@x.com").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.name, "Alice");
        assert_eq!(found.phone, None);

        assert!(store.find_customer_by_email(globex, "a@x.com").unwrap().is_none());
        assert_eq!(store.count_customers(acme).unwrap(), 1);
    }

    #[test]
    fn test_create_invoice_and_list_outstanding() {
        let (_dir, store) = test_store();
        let company = store.create_company("Acme Corp").unwrap();
        let customer = store.create_customer(company, "Alice", "a@x.com", None).unwrap();

        let mut later = new_invoice(company, customer, "INV-002");
        later.due_date = date("2024-03-01");
        store.create_invoice(&later).unwrap();
        store.create_invoice(&new_invoice(company, customer, "INV-001")).unwrap();

        let mut paid = new_invoice(company, customer, "INV-003");
        paid.status = InvoiceStatus::Paid;
        store.create_invoice(&paid).unwrap();

        let outstanding = store.get_outstanding_invoices(company).unwrap();
        let numbers: Vec<&str> = outstanding.iter().map(|i| i.invoice_number.as_str()).collect();
        assert_eq!(numbers, vec!["INV-001", "INV-002"]);
        assert_eq!(outstanding[0].customer_email, "a@x.com");
        assert_eq!(outstanding[0].status, InvoiceStatus::Open);
        assert_eq!(store.count_invoices(company).unwrap(), 3);
    }

    #[test]
    fn test_outstanding_invoices_carry_stored_status() {
        let (_dir, store) = test_store();
        let company = store.create_company("Acme Corp").unwrap();
        let customer = store.create_customer(company, "Alice", "a@x.com", None).unwrap();

        let mut partial = new_invoice(company, customer, "INV-001");
        partial.status = InvoiceStatus::PartiallyMatched;
        store.create_invoice(&partial).unwrap();

        let mut overdue = new_invoice(company, customer, "INV-002");
        overdue.status = InvoiceStatus::Overdue;
        overdue.due_date = date("2024-03-01");
        store.create_invoice(&overdue).unwrap();

        let statuses: Vec<InvoiceStatus> = store
            .get_outstanding_invoices(company)
            .unwrap()
            .iter()
            .map(|i| i.status)
            .collect();
        assert_eq!(
            statuses,
            vec![InvoiceStatus::PartiallyMatched, InvoiceStatus::Overdue]
        );
    }

    #[test]
    fn test_duplicate_invoice_number_is_rolled_back() {
        let (_dir, store) = test_store();
        let company = store.create_company("Acme Corp").unwrap();
        let customer = store.create_customer(company, "Alice", "a@x.com", None).unwrap();

        store.create_invoice(&new_invoice(company, customer, "INV-001")).unwrap();
        let err = store
            .create_invoice(&new_invoice(company, customer, "INV-001"))
            .unwrap_err();

        assert!(err.is_constraint_violation());
        assert_eq!(store.count_invoices(company).unwrap(), 1);
    }

    #[test]
    fn test_failed_closure_rolls_back_transaction() {
        let (_dir, store) = test_store();
        let company = store.create_company("Acme Corp").unwrap();

        let result: Result<(), StoreError> = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO customers (company_id, name, email) VALUES (?1, 'Bob', 'b@x.com')",
                params![company],
            )?;
            Err(StoreError::InvalidData("abort".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.count_customers(company).unwrap(), 0);
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let (_dir, store) = test_store();
        let err = store.create_customer(999, "Ghost", "g@x.com", None).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_unmatched_payments_ignore_rejected_matches() {
        let (_dir, store) = test_store();
        let company = store.create_company("Acme Corp").unwrap();
        let customer = store.create_customer(company, "Alice", "a@x.com", None).unwrap();
        let invoice = store.create_invoice(&new_invoice(company, customer, "INV-001")).unwrap();

        let payment = |external_id: &str, amount: f64, day: &str| NewPayment {
            company_id: company,
            customer_id: customer,
            external_id: external_id.to_string(),
            amount,
            currency: "USD".to_string(),
            payment_date: date(day),
            reference: None,
        };

        let partial = store.insert_payment(&payment("PAY-1", 100.0, "2024-01-10")).unwrap();
        let full = store.insert_payment(&payment("PAY-2", 40.0, "2024-01-05")).unwrap();
        let rejected = store.insert_payment(&payment("PAY-3", 70.0, "2024-01-20")).unwrap();

        store
            .insert_reconciliation(&NewReconciliation::proposed(company, invoice, partial, 60.0, 90))
            .unwrap();
        store
            .insert_reconciliation(&NewReconciliation::proposed(company, invoice, full, 40.0, 95))
            .unwrap();
        let mut bad = NewReconciliation::proposed(company, invoice, rejected, 70.0, 20);
        bad.status = crate::store::ReconciliationStatus::Rejected;
        let rec_id = store.insert_reconciliation(&bad).unwrap();
        store
            .insert_audit_log(rec_id, "REJECTED", "reviewer@acme.com", Some("wrong customer"))
            .unwrap();

        let unmatched = store.get_unmatched_payments(company).unwrap();
        let ids: Vec<&str> = unmatched.iter().map(|p| p.external_id.as_str()).collect();
        assert_eq!(ids, vec!["PAY-1", "PAY-3"]);
        assert!((unmatched[0].amount_remaining - 40.0).abs() < 1e-9);
        assert!((unmatched[1].amount_matched - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_score_out_of_range_is_rejected() {
        let (_dir, store) = test_store();
        let rec = NewReconciliation::proposed(1, 1, 1, 10.0, 101);
        assert!(matches!(
            store.insert_reconciliation(&rec),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_require_company() {
        let (_dir, store) = test_store();
        let id = store.create_company("Acme Corp").unwrap();
        assert_eq!(store.require_company(id).unwrap().name, "Acme Corp");
        assert!(matches!(
            store.require_company(id + 1),
            Err(StoreError::NotFound { entity: "company", .. })
        ));
    }

    #[test]
    fn test_unreachable_store_fails_connection_check() {
        let store = SqliteStore::new(StoreConfig {
            path: "/nonexistent-dir/sub/test.db".into(),
            busy_timeout: Duration::from_millis(100),
        });
        assert!(matches!(
            store.check_connection(),
            Err(StoreError::Connect { .. })
        ));
    }
}
