// Record Source - CSV feed → RawRecord
//
// Reads the whole feed into memory. Every row must have the header's
// field count; anything else is a SourceError for the whole feed.

use crate::error::SourceError;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

// ============================================================================
// RAW RECORD
// ============================================================================

/// One feed row: column name → raw value, in header order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Line in the feed file (1-indexed, header is line 1)
    pub line_number: usize,
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(line_number: usize, fields: Vec<(String, String)>) -> Self {
        RawRecord { line_number, fields }
    }

    /// Build a record from `(column, value)` pairs
    pub fn from_pairs(line_number: usize, pairs: &[(&str, &str)]) -> Self {
        RawRecord {
            line_number,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Raw value of a column, `None` if the column is absent
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Raw value of a column, empty string if absent
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

// ============================================================================
// FEED
// ============================================================================

/// Parsed feed: the records plus a fingerprint of the bytes they came from
#[derive(Debug, Clone)]
pub struct Feed {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
    /// SHA-256 of the raw feed bytes (hex)
    pub sha256: String,
}

/// Read a CSV feed from disk
pub fn read_feed(path: &Path) -> Result<Feed, SourceError> {
    let bytes = fs::read(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let feed = parse_feed(bytes.as_slice())?;
    debug!(
        path = %path.display(),
        records = feed.records.len(),
        sha256 = %feed.sha256,
        "Read feed"
    );
    Ok(feed)
}

/// Parse a CSV feed from any reader
pub fn parse_feed<R: Read>(mut reader: R) -> Result<Feed, SourceError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|source| SourceError::Open {
            path: "<reader>".into(),
            source,
        })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = format!("{:x}", hasher.finalize());

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::None)
        .from_reader(bytes.as_slice());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|source| SourceError::Csv { line: 1, source })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(SourceError::MissingHeader);
    }

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let row = result.map_err(|source| SourceError::Csv {
            line: idx as u64 + 2,
            source,
        })?;

        let line_number = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2); // +2 because: 1-indexed + header row

        let fields = headers
            .iter()
            .cloned()
            .zip(row.iter().map(str::to_string))
            .collect();

        records.push(RawRecord::new(line_number, fields));
    }

    Ok(Feed {
        headers,
        records,
        sha256,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FEED: &str = "\
invoice_number,customer_name,customer_email,amount,currency,issue_date,due_date
INV-001,Acme,a@x.com,1000.00,usd,2024-01-01,2024-02-01
INV-002,\"Globex, Inc\",g@x.com,250.5,EUR,2024-01-05,2024-02-05
";

    #[test]
    fn test_parse_feed_keeps_header_order() {
        let feed = parse_feed(FEED.as_bytes()).unwrap();

        assert_eq!(feed.headers.len(), 7);
        assert_eq!(feed.records.len(), 2);

        let columns: Vec<&str> = feed.records[0].columns().collect();
        assert_eq!(columns, feed.headers.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(feed.records[0].get("invoice_number"), Some("INV-001"));
        assert_eq!(feed.records[1].get("customer_name"), Some("Globex, Inc"));
        assert_eq!(feed.records[0].line_number, 2);
        assert_eq!(feed.records[1].line_number, 3);
    }

    #[test]
    fn test_values_are_not_trimmed() {
        let feed = parse_feed("invoice_number,customer_name\n INV-1 ,  Acme\n".as_bytes()).unwrap();
        assert_eq!(feed.records[0].value("invoice_number"), " INV-1 ");
        assert_eq!(feed.records[0].value("customer_name"), "  Acme");
        assert_eq!(feed.records[0].value("missing"), "");
    }

    #[test]
    fn test_ragged_row_is_source_error() {
        let result = parse_feed("a,b,c\n1,2,3\n4,5\n".as_bytes());
        match result {
            Err(SourceError::Csv { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected csv error, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_feed_has_no_records() {
        let feed = parse_feed("invoice_number,amount\n".as_bytes()).unwrap();
        assert!(feed.records.is_empty());
    }

    #[test]
    fn test_empty_input_has_no_header() {
        assert!(matches!(
            parse_feed("".as_bytes()),
            Err(SourceError::MissingHeader)
        ));
    }

    #[test]
    fn test_read_feed_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FEED.as_bytes()).unwrap();

        let feed = read_feed(file.path()).unwrap();
        assert_eq!(feed.records.len(), 2);
        assert_eq!(feed.sha256.len(), 64);

        let again = parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(feed.sha256, again.sha256);
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let result = read_feed(Path::new("/definitely/not/here.csv"));
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }
}
