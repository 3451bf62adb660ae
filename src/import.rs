// Bulk Import Processor - guest sheets in, one batched delta out
//
// Parses an uploaded name/email sheet, drops rows without a usable email
// (the original behavior of assigning a shared placeholder address made
// every such row collide with the uniqueness constraint; rejecting them
// is the fix), and hands the surviving rows to the engine as ONE batch so
// vendor rescaling and budget updates run once, not once per row.

use serde::{Deserialize, Serialize};

use crate::entities::guest::normalize_email;
use crate::error::Result;
use crate::reconciliation::{BulkOutcome, ReconciliationEngine};
use crate::roster::SheetRow;

// ============================================================================
// IMPORT POLICY
// ============================================================================

/// What to do when an import would push the event past its guest limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImportPolicy {
    /// Accept the batch; the engine flags the overage with a warning.
    /// Matches the single-guest path and is the default.
    #[default]
    Advisory,

    /// Reject the whole batch with LimitExceeded before any roster write.
    Strict,
}

// ============================================================================
// SHEET PARSING
// ============================================================================

/// Parsed candidate rows plus the count of rows dropped for lacking an
/// email address.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub rows: Vec<SheetRow>,
    pub rows_skipped_no_email: usize,
}

/// Parse a CSV guest sheet. Header matching is case-insensitive; the
/// `email` column is required, `name` is optional, extra columns are
/// ignored. A malformed sheet aborts the import before any roster write.
pub fn parse_guest_sheet(bytes: &[u8]) -> Result<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let name_idx = find_column(&headers, "name");
    let email_idx = find_column(&headers, "email");

    let mut rows = Vec::new();
    let mut rows_skipped_no_email = 0;

    for record in reader.records() {
        let record = record?;

        let email = email_idx
            .and_then(|idx| record.get(idx))
            .map(normalize_email)
            .unwrap_or_default();
        if email.is_empty() || !email.contains('@') {
            rows_skipped_no_email += 1;
            continue;
        }

        let name = name_idx
            .and_then(|idx| record.get(idx))
            .unwrap_or("")
            .trim()
            .to_string();

        rows.push(SheetRow {
            // A missing name is tolerable; fall back to the mailbox part
            name: if name.is_empty() {
                email.split('@').next().unwrap_or("guest").to_string()
            } else {
                name
            },
            email,
        });
    }

    Ok(ParsedSheet {
        rows,
        rows_skipped_no_email,
    })
}

fn find_column(headers: &csv::StringRecord, wanted: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(wanted))
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Outcome of one sheet import, for caller display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkImportOutcome {
    pub bulk: BulkOutcome,
    pub rows_skipped_no_email: usize,
}

impl BulkImportOutcome {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Guests added: {}, Duplicates skipped: {}",
            self.bulk.guests_added, self.bulk.duplicates_skipped
        );
        if self.rows_skipped_no_email > 0 {
            summary.push_str(&format!(
                ", Rows without email: {}",
                self.rows_skipped_no_email
            ));
        }
        let rest = self.bulk.reconcile.summary();
        summary.push_str(", ");
        summary.push_str(&rest);
        summary
    }
}

pub struct BulkImportProcessor<'a> {
    engine: &'a ReconciliationEngine,
}

impl<'a> BulkImportProcessor<'a> {
    pub fn new(engine: &'a ReconciliationEngine) -> Self {
        BulkImportProcessor { engine }
    }

    /// Parse, dedup, and reconcile a whole sheet as a single batch.
    pub fn import(
        &self,
        event_id: &str,
        sheet: &[u8],
        policy: ImportPolicy,
    ) -> Result<BulkImportOutcome> {
        let parsed = parse_guest_sheet(sheet)?;
        let bulk = self.engine.bulk_add_guests(event_id, &parsed.rows, policy)?;
        Ok(BulkImportOutcome {
            bulk,
            rows_skipped_no_email: parsed.rows_skipped_no_email,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;

    use crate::db;
    use crate::entities::Event;
    use crate::error::LedgerError;
    use crate::notify::RecordingEmitter;

    fn engine_and_event(guest_limit: u32) -> (Arc<Mutex<Connection>>, ReconciliationEngine, Event) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        let engine =
            ReconciliationEngine::new(db.clone(), Arc::new(RecordingEmitter::new()));

        let event = Event::new("Reception", "organizer-1", guest_limit, 0.0);
        db::insert_event(&db.lock().unwrap(), &event).unwrap();
        (db, engine, event)
    }

    #[test]
    fn test_parse_sheet_basic() {
        let sheet = b"name,email\nAsha,asha@example.com\nBen,BEN@Example.com\n";
        let parsed = parse_guest_sheet(sheet).unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].name, "Asha");
        assert_eq!(parsed.rows[1].email, "ben@example.com");
        assert_eq!(parsed.rows_skipped_no_email, 0);
    }

    #[test]
    fn test_parse_sheet_rejects_emailless_rows() {
        let sheet = b"Name,Email\nAsha,asha@example.com\nNoMail,\nAlsoNoMail,not-an-email\n";
        let parsed = parse_guest_sheet(sheet).unwrap();

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows_skipped_no_email, 2);
    }

    #[test]
    fn test_parse_sheet_fills_missing_name() {
        let sheet = b"name,email\n,priya@example.com\n";
        let parsed = parse_guest_sheet(sheet).unwrap();

        assert_eq!(parsed.rows[0].name, "priya");
    }

    #[test]
    fn test_parse_sheet_extra_columns_ignored() {
        let sheet = b"phone,EMAIL,name,notes\n123,dev@example.com,Dev,vip\n";
        let parsed = parse_guest_sheet(sheet).unwrap();

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].name, "Dev");
        assert_eq!(parsed.rows[0].email, "dev@example.com");
    }

    #[test]
    fn test_parse_sheet_malformed() {
        // Invalid UTF-8 in a record makes the reader error out
        let sheet = b"name,email\nAsha,\xff\xfe\n";
        assert!(matches!(
            parse_guest_sheet(sheet).unwrap_err(),
            LedgerError::Sheet(_)
        ));
    }

    #[test]
    fn test_import_same_sheet_twice_is_idempotent() {
        let (db, engine, event) = engine_and_event(0);
        let processor = BulkImportProcessor::new(&engine);

        let sheet = b"name,email\n\
                      Asha,asha@example.com\n\
                      Ben,ben@example.com\n\
                      Chitra,chitra@example.com\n";

        let first = processor
            .import(&event.id, sheet, ImportPolicy::Advisory)
            .unwrap();
        assert_eq!(first.bulk.guests_added, 3);
        assert_eq!(first.bulk.duplicates_skipped, 0);

        // Second import of the same sheet: zero new guests, every row a
        // duplicate
        let second = processor
            .import(&event.id, sheet, ImportPolicy::Advisory)
            .unwrap();
        assert_eq!(second.bulk.guests_added, 0);
        assert_eq!(second.bulk.duplicates_skipped, 3);
        assert_eq!(second.bulk.reconcile.headcount, 3);

        let conn = db.lock().unwrap();
        assert_eq!(db::count_guests(&conn, &event.id).unwrap(), 3);
    }

    #[test]
    fn test_import_strict_mode_rejects_over_limit_batch() {
        let (db, engine, event) = engine_and_event(2);
        let processor = BulkImportProcessor::new(&engine);

        let sheet = b"name,email\n\
                      Asha,asha@example.com\n\
                      Ben,ben@example.com\n\
                      Chitra,chitra@example.com\n";

        let err = processor
            .import(&event.id, sheet, ImportPolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, LedgerError::LimitExceeded { limit: 2, .. }));

        {
            let conn = db.lock().unwrap();
            assert_eq!(db::count_guests(&conn, &event.id).unwrap(), 0);
        }

        // The default policy lets it through and flags the overage
        let outcome = processor
            .import(&event.id, sheet, ImportPolicy::Advisory)
            .unwrap();
        assert_eq!(outcome.bulk.guests_added, 3);
        assert!(outcome.bulk.reconcile.guest_limit_exceeded);
    }

    #[test]
    fn test_import_summary_mentions_every_count() {
        let (_db, engine, event) = engine_and_event(0);
        let processor = BulkImportProcessor::new(&engine);

        let sheet = b"name,email\n\
                      Asha,asha@example.com\n\
                      Asha again,asha@example.com\n\
                      NoMail,\n";

        let outcome = processor
            .import(&event.id, sheet, ImportPolicy::Advisory)
            .unwrap();
        let summary = outcome.summary();
        assert!(summary.contains("Guests added: 1"));
        assert!(summary.contains("Duplicates skipped: 1"));
        assert!(summary.contains("Rows without email: 1"));
    }

    #[test]
    fn test_malformed_sheet_aborts_before_roster_write() {
        let (db, engine, event) = engine_and_event(0);
        let processor = BulkImportProcessor::new(&engine);

        let sheet = b"name,email\nAsha,asha@example.com\nBroken,\xff\xfe\n";
        assert!(processor
            .import(&event.id, sheet, ImportPolicy::Advisory)
            .is_err());

        let conn = db.lock().unwrap();
        assert_eq!(db::count_guests(&conn, &event.id).unwrap(), 0);
    }
}
