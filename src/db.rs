// SQLite persistence for events, guests, vendors, and notifications.
//
// The uniqueness constraints carry the dedup semantics the engine relies
// on: (event_id, email) for guests and (event_id, place_id) for vendors.
// All timestamps are stored as RFC 3339 text.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::entities::{Budget, Event, Guest, GuestStatus, PricingUnit, Vendor};
use crate::notify::NotificationRecord;

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            creator_id TEXT NOT NULL,
            guest_limit INTEGER NOT NULL DEFAULT 0,
            no_of_guest_added INTEGER NOT NULL DEFAULT 0,
            budget_allocated REAL NOT NULL DEFAULT 0,
            budget_spent REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS guests (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            joined_at TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(event_id, email)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS vendors (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            place_id TEXT,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            price REAL NOT NULL DEFAULT 0,
            pricing_unit TEXT NOT NULL,
            number_of_guests INTEGER NOT NULL DEFAULT 0,
            min_guest_limit INTEGER,
            created_at TEXT NOT NULL,
            UNIQUE(event_id, place_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            recipient_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_guests_event ON guests(event_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vendors_event ON vendors(event_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_event ON notifications(event_id)",
        [],
    )?;

    Ok(())
}

fn parse_timestamp(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// EVENTS
// ============================================================================

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let created_at: String = row.get(7)?;
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        creator_id: row.get(2)?,
        guest_limit: row.get(3)?,
        no_of_guest_added: row.get(4)?,
        budget: Budget {
            allocated: row.get(5)?,
            spent: row.get(6)?,
        },
        created_at: parse_timestamp(created_at),
    })
}

pub fn insert_event(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO events (
            id, title, creator_id, guest_limit, no_of_guest_added,
            budget_allocated, budget_spent, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.id,
            event.title,
            event.creator_id,
            event.guest_limit,
            event.no_of_guest_added,
            event.budget.allocated,
            event.budget.spent,
            event.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_event(conn: &Connection, id: &str) -> rusqlite::Result<Option<Event>> {
    conn.query_row(
        "SELECT id, title, creator_id, guest_limit, no_of_guest_added,
                budget_allocated, budget_spent, created_at
         FROM events WHERE id = ?1",
        params![id],
        map_event_row,
    )
    .optional()
}

pub fn update_headcount(conn: &Connection, event_id: &str, count: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE events SET no_of_guest_added = ?1 WHERE id = ?2",
        params![count, event_id],
    )?;
    Ok(())
}

pub fn update_spent(conn: &Connection, event_id: &str, spent: f64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE events SET budget_spent = ?1 WHERE id = ?2",
        params![spent, event_id],
    )?;
    Ok(())
}

pub fn update_allocated(conn: &Connection, event_id: &str, allocated: f64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE events SET budget_allocated = ?1 WHERE id = ?2",
        params![allocated, event_id],
    )?;
    Ok(())
}

// ============================================================================
// GUESTS
// ============================================================================

fn map_guest_row(row: &Row<'_>) -> rusqlite::Result<Guest> {
    let status: String = row.get(4)?;
    let joined_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(Guest {
        id: row.get(0)?,
        event_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        status: GuestStatus::parse(&status).unwrap_or(GuestStatus::Pending),
        joined_at: joined_at.map(parse_timestamp),
        created_at: parse_timestamp(created_at),
    })
}

const GUEST_COLUMNS: &str = "id, event_id, email, name, status, joined_at, created_at";

pub fn insert_guest(conn: &Connection, guest: &Guest) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO guests (id, event_id, email, name, status, joined_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            guest.id,
            guest.event_id,
            guest.email,
            guest.name,
            guest.status.as_str(),
            guest.joined_at.map(|dt| dt.to_rfc3339()),
            guest.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_guest(conn: &Connection, id: &str) -> rusqlite::Result<Option<Guest>> {
    conn.query_row(
        &format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = ?1"),
        params![id],
        map_guest_row,
    )
    .optional()
}

pub fn guest_email_exists(
    conn: &Connection,
    event_id: &str,
    email: &str,
) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM guests WHERE event_id = ?1 AND email = ?2",
        params![event_id, email],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn delete_guest(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM guests WHERE id = ?1", params![id])
}

pub fn delete_guests_for_event(conn: &Connection, event_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM guests WHERE event_id = ?1", params![event_id])
}

pub fn count_guests(conn: &Connection, event_id: &str) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM guests WHERE event_id = ?1",
        params![event_id],
        |row| row.get::<_, i64>(0).map(|n| n as u32),
    )
}

pub fn guests_for_event(conn: &Connection, event_id: &str) -> rusqlite::Result<Vec<Guest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GUEST_COLUMNS} FROM guests WHERE event_id = ?1 ORDER BY created_at"
    ))?;
    let guests = stmt
        .query_map(params![event_id], map_guest_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(guests)
}

pub fn update_guest_status(
    conn: &Connection,
    id: &str,
    status: GuestStatus,
    joined_at: Option<DateTime<Utc>>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE guests SET status = ?1, joined_at = ?2 WHERE id = ?3",
        params![status.as_str(), joined_at.map(|dt| dt.to_rfc3339()), id],
    )?;
    Ok(())
}

// ============================================================================
// VENDORS
// ============================================================================

fn map_vendor_row(row: &Row<'_>) -> rusqlite::Result<Vendor> {
    let pricing_unit: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    Ok(Vendor {
        id: row.get(0)?,
        event_id: row.get(1)?,
        place_id: row.get(2)?,
        title: row.get(3)?,
        category: row.get(4)?,
        price: row.get(5)?,
        pricing_unit: PricingUnit::parse(&pricing_unit).unwrap_or(PricingUnit::Flat),
        number_of_guests: row.get(7)?,
        min_guest_limit: row.get(8)?,
        created_at: parse_timestamp(created_at),
    })
}

const VENDOR_COLUMNS: &str = "id, event_id, place_id, title, category, price, pricing_unit, \
                              number_of_guests, min_guest_limit, created_at";

pub fn insert_vendor(conn: &Connection, vendor: &Vendor) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO vendors (
            id, event_id, place_id, title, category, price, pricing_unit,
            number_of_guests, min_guest_limit, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            vendor.id,
            vendor.event_id,
            vendor.place_id,
            vendor.title,
            vendor.category,
            vendor.price,
            vendor.pricing_unit.as_str(),
            vendor.number_of_guests,
            vendor.min_guest_limit,
            vendor.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_vendor(conn: &Connection, id: &str) -> rusqlite::Result<Option<Vendor>> {
    conn.query_row(
        &format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = ?1"),
        params![id],
        map_vendor_row,
    )
    .optional()
}

pub fn vendor_place_exists(
    conn: &Connection,
    event_id: &str,
    place_id: &str,
) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM vendors WHERE event_id = ?1 AND place_id = ?2",
        params![event_id, place_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn delete_vendor(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM vendors WHERE id = ?1", params![id])
}

pub fn delete_vendors_for_event(conn: &Connection, event_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM vendors WHERE event_id = ?1", params![event_id])
}

pub fn vendors_for_event(conn: &Connection, event_id: &str) -> rusqlite::Result<Vec<Vendor>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors WHERE event_id = ?1 ORDER BY created_at"
    ))?;
    let vendors = stmt
        .query_map(params![event_id], map_vendor_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(vendors)
}

pub fn per_plate_vendors_for_event(
    conn: &Connection,
    event_id: &str,
) -> rusqlite::Result<Vec<Vendor>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors
         WHERE event_id = ?1 AND pricing_unit = 'per_plate'
         ORDER BY created_at"
    ))?;
    let vendors = stmt
        .query_map(params![event_id], map_vendor_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(vendors)
}

pub fn update_vendor_scaling(
    conn: &Connection,
    id: &str,
    number_of_guests: u32,
    price: f64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE vendors SET number_of_guests = ?1, price = ?2 WHERE id = ?3",
        params![number_of_guests, price, id],
    )?;
    Ok(())
}

/// Source-of-truth sum used by the spent-repair pass.
pub fn sum_vendor_prices(conn: &Connection, event_id: &str) -> rusqlite::Result<f64> {
    conn.query_row(
        "SELECT COALESCE(SUM(price), 0) FROM vendors WHERE event_id = ?1",
        params![event_id],
        |row| row.get(0),
    )
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

pub fn insert_notification(conn: &Connection, record: &NotificationRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO notifications (
            id, recipient_id, event_id, kind, message, metadata, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.recipient_id,
            record.event_id,
            record.kind.as_str(),
            record.message,
            record.metadata.to_string(),
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn notifications_for_event(
    conn: &Connection,
    event_id: &str,
) -> rusqlite::Result<Vec<NotificationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient_id, event_id, kind, message, metadata, created_at
         FROM notifications WHERE event_id = ?1 ORDER BY created_at",
    )?;
    let records = stmt
        .query_map(params![event_id], |row| {
            let kind: String = row.get(3)?;
            let metadata: String = row.get(5)?;
            let created_at: String = row.get(6)?;
            Ok(NotificationRecord {
                id: row.get(0)?,
                recipient_id: row.get(1)?,
                event_id: row.get(2)?,
                kind: crate::notify::NotificationKind::parse(&kind)
                    .unwrap_or(crate::notify::NotificationKind::Warning),
                message: row.get(4)?,
                metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
                created_at: parse_timestamp(created_at),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// True when an insert failed because a uniqueness constraint fired.
/// The roster and ledger lean on this to turn raw storage errors into
/// Conflict / silent-duplicate outcomes.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new("Sangeet Night", "organizer-1", 50, 20_000.0);
        insert_event(&conn, &event).unwrap();

        let loaded = get_event(&conn, &event.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Sangeet Night");
        assert_eq!(loaded.guest_limit, 50);
        assert_eq!(loaded.budget.allocated, 20_000.0);
        assert_eq!(loaded.budget.spent, 0.0);

        assert!(get_event(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_guest_uniqueness_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new("Reception", "organizer-1", 0, 0.0);
        insert_event(&conn, &event).unwrap();

        let first = Guest::new(&event.id, "Asha", "asha@example.com");
        insert_guest(&conn, &first).unwrap();

        // Same email, different row id: the constraint fires
        let dup = Guest::new(&event.id, "Asha again", "ASHA@example.com");
        let err = insert_guest(&conn, &dup).unwrap_err();
        assert!(is_constraint_violation(&err));

        // Same email on a different event is fine
        let other = Event::new("Mehendi", "organizer-1", 0, 0.0);
        insert_event(&conn, &other).unwrap();
        insert_guest(&conn, &Guest::new(&other.id, "Asha", "asha@example.com")).unwrap();

        assert_eq!(count_guests(&conn, &event.id).unwrap(), 1);
    }

    #[test]
    fn test_vendor_place_uniqueness_allows_null() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new("Reception", "organizer-1", 0, 0.0);
        insert_event(&conn, &event).unwrap();

        let mut caterer =
            Vendor::new(&event.id, "Caterer", "Catering", 1000.0, PricingUnit::PerPlate);
        caterer.place_id = Some("place-123".to_string());
        insert_vendor(&conn, &caterer).unwrap();

        let mut dup =
            Vendor::new(&event.id, "Caterer again", "Catering", 900.0, PricingUnit::PerPlate);
        dup.place_id = Some("place-123".to_string());
        assert!(is_constraint_violation(&insert_vendor(&conn, &dup).unwrap_err()));

        // Multiple manual rows without a place id coexist
        insert_vendor(&conn, &Vendor::expense(&event.id, "Flowers", 250.0)).unwrap();
        insert_vendor(&conn, &Vendor::expense(&event.id, "Lighting", 400.0)).unwrap();

        assert_eq!(vendors_for_event(&conn, &event.id).unwrap().len(), 3);
        assert!((sum_vendor_prices(&conn, &event.id).unwrap() - 1650.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_plate_filter_and_scaling_update() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new("Reception", "organizer-1", 0, 0.0);
        insert_event(&conn, &event).unwrap();

        let mut caterer =
            Vendor::new(&event.id, "Caterer", "Catering", 1000.0, PricingUnit::PerPlate);
        caterer.number_of_guests = 10;
        insert_vendor(&conn, &caterer).unwrap();
        insert_vendor(
            &conn,
            &Vendor::new(&event.id, "Venue", "Venue", 5000.0, PricingUnit::Flat),
        )
        .unwrap();

        let per_plate = per_plate_vendors_for_event(&conn, &event.id).unwrap();
        assert_eq!(per_plate.len(), 1);
        assert_eq!(per_plate[0].id, caterer.id);

        update_vendor_scaling(&conn, &caterer.id, 12, 1200.0).unwrap();
        let reloaded = get_vendor(&conn, &caterer.id).unwrap().unwrap();
        assert_eq!(reloaded.number_of_guests, 12);
        assert!((reloaded.price - 1200.0).abs() < 1e-9);
    }
}
