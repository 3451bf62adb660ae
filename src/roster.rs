// Guest Roster - durable per-event guest collection
//
// Enforces per-event email uniqueness. Bulk insert silently drops rows
// whose lower-cased email already exists in the roster or is repeated
// within the batch; duplicates are counted, never errors.

use chrono::Utc;
use rusqlite::Connection;

use crate::db;
use crate::entities::guest::normalize_email;
use crate::entities::{Guest, GuestStatus};
use crate::error::{LedgerError, Result};

/// Candidate row for a bulk insert: a name/email pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub name: String,
    pub email: String,
}

/// Outcome of a bulk insert: the guests actually created plus the number
/// of candidate rows dropped as duplicates.
#[derive(Debug, Clone)]
pub struct BulkInsertReport {
    pub inserted: Vec<Guest>,
    pub duplicates: usize,
}

pub fn add_guest(conn: &Connection, event_id: &str, name: &str, email: &str) -> Result<Guest> {
    let email = normalize_email(email);
    validate_email(&email)?;
    if name.trim().is_empty() {
        return Err(LedgerError::validation("guest name is required"));
    }

    if db::guest_email_exists(conn, event_id, &email)? {
        return Err(LedgerError::conflict(format!(
            "guest {email} already invited to this event"
        )));
    }

    let guest = Guest::new(event_id, name.trim(), &email);
    db::insert_guest(conn, &guest)?;
    Ok(guest)
}

/// Deletes and returns the prior record; the engine needs it to compute
/// the headcount delta and report which event changed.
pub fn remove_guest(conn: &Connection, guest_id: &str) -> Result<Guest> {
    let guest = db::get_guest(conn, guest_id)?
        .ok_or_else(|| LedgerError::not_found("guest", guest_id))?;
    db::delete_guest(conn, guest_id)?;
    Ok(guest)
}

/// Insert a batch of candidate rows, leaning on the (event_id, email)
/// uniqueness constraint for dedup: a row duplicating the roster or an
/// earlier row in the same batch fails the constraint and is counted.
pub fn bulk_insert(
    conn: &Connection,
    event_id: &str,
    rows: &[SheetRow],
) -> Result<BulkInsertReport> {
    let mut inserted = Vec::new();
    let mut duplicates = 0;

    for row in rows {
        let email = normalize_email(&row.email);
        if validate_email(&email).is_err() {
            // Emailless rows are rejected upstream; anything that slips
            // through is skipped rather than stored under a placeholder.
            duplicates += 1;
            continue;
        }

        let guest = Guest::new(event_id, row.name.trim(), &email);
        match db::insert_guest(conn, &guest) {
            Ok(()) => inserted.push(guest),
            Err(err) if db::is_constraint_violation(&err) => duplicates += 1,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(BulkInsertReport {
        inserted,
        duplicates,
    })
}

/// RSVP transition. Pending may move to either terminal state, and the
/// two terminal states may swap as a correction; moving back to Pending
/// is not a thing. `joined_at` is stamped only on entering Confirmed.
pub fn set_status(conn: &Connection, guest_id: &str, status: GuestStatus) -> Result<Guest> {
    let mut guest = db::get_guest(conn, guest_id)?
        .ok_or_else(|| LedgerError::not_found("guest", guest_id))?;

    if guest.status == status {
        return Ok(guest);
    }
    if status == GuestStatus::Pending {
        return Err(LedgerError::validation(
            "a guest cannot be moved back to pending",
        ));
    }

    guest.status = status;
    if status == GuestStatus::Confirmed {
        guest.joined_at = Some(Utc::now());
    }
    db::update_guest_status(conn, guest_id, guest.status, guest.joined_at)?;
    Ok(guest)
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() || !email.contains('@') {
        return Err(LedgerError::validation(format!(
            "invalid guest email: {email:?}"
        )));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
