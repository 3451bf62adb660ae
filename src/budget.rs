// Budget Ledger - per-event allocated/spent pair
//
// `spent` moves by incremental deltas from the reconciliation engine and
// is clamped at zero after any reduction. Because delta-only updates can
// drift over many operations, recompute_spent rewrites the aggregate from
// the vendor rows as an explicit repair operation.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::{LedgerError, Result};

/// Outcome of the spent-repair pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpentRepair {
    pub previous: f64,
    pub recomputed: f64,
    /// Signed drift the repair corrected (recomputed - previous)
    pub drift: f64,
}

/// `spent = max(0, spent + amount)`. No-op when amount is 0.
/// Returns the new spent value.
pub fn apply_delta(conn: &Connection, event_id: &str, amount: f64) -> Result<f64> {
    let event = db::get_event(conn, event_id)?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;

    if amount == 0.0 {
        return Ok(event.budget.spent);
    }

    let spent = event.budget.apply(amount);
    db::update_spent(conn, event_id, spent)?;
    Ok(spent)
}

/// Raise `allocated` toward actual spend. Only positive increases are
/// accepted, and only while the allocation still trails what has been
/// spent; an allocation already covering spend has nothing to correct.
pub fn adjust_allocated(conn: &Connection, event_id: &str, amount: f64) -> Result<f64> {
    let event = db::get_event(conn, event_id)?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;

    if amount <= 0.0 {
        return Err(LedgerError::validation(
            "allocation adjustment must be a positive amount",
        ));
    }
    if event.budget.allocated >= event.budget.spent {
        return Err(LedgerError::validation(
            "allocation already covers spend; nothing to correct",
        ));
    }

    let allocated = event.budget.allocated + amount;
    db::update_allocated(conn, event_id, allocated)?;
    Ok(allocated)
}

/// Rewrite `spent` as the sum of current vendor prices and report the
/// drift corrected. Idempotent.
pub fn recompute_spent(conn: &Connection, event_id: &str) -> Result<SpentRepair> {
    let event = db::get_event(conn, event_id)?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;

    let recomputed = db::sum_vendor_prices(conn, event_id)?.max(0.0);
    if (recomputed - event.budget.spent).abs() > f64::EPSILON {
        db::update_spent(conn, event_id, recomputed)?;
    }

    Ok(SpentRepair {
        previous: event.budget.spent,
        recomputed,
        drift: recomputed - event.budget.spent,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Event, Vendor};

    fn setup(allocated: f64) -> (Connection, Event) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let event = Event::new("Reception", "organizer-1", 0, allocated);
        db::insert_event(&conn, &event).unwrap();
        (conn, event)
    }

    #[test]
    fn test_apply_delta_clamps_at_zero() {
        let (conn, event) = setup(1000.0);

        assert_eq!(apply_delta(&conn, &event.id, 600.0).unwrap(), 600.0);
        assert_eq!(apply_delta(&conn, &event.id, -200.0).unwrap(), 400.0);
        // Reduction past zero clamps rather than going negative
        assert_eq!(apply_delta(&conn, &event.id, -900.0).unwrap(), 0.0);
        // Zero delta is a no-op
        assert_eq!(apply_delta(&conn, &event.id, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_spent_may_exceed_allocated() {
        let (conn, event) = setup(500.0);

        let spent = apply_delta(&conn, &event.id, 800.0).unwrap();
        assert_eq!(spent, 800.0);
        let reloaded = db::get_event(&conn, &event.id).unwrap().unwrap();
        assert!(reloaded.budget.is_over_allocated());
    }

    #[test]
    fn test_adjust_allocated_guard() {
        let (conn, event) = setup(500.0);
        apply_delta(&conn, &event.id, 800.0).unwrap();

        // Catching up to spend is allowed
        assert_eq!(adjust_allocated(&conn, &event.id, 300.0).unwrap(), 800.0);

        // Now allocation covers spend; a further raise is meaningless
        assert!(matches!(
            adjust_allocated(&conn, &event.id, 100.0).unwrap_err(),
            LedgerError::Validation(_)
        ));
        // Negative adjustments are rejected outright
        assert!(matches!(
            adjust_allocated(&conn, &event.id, -50.0).unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    #[test]
    fn test_recompute_spent_corrects_drift() {
        let (conn, event) = setup(5000.0);

        db::insert_vendor(&conn, &Vendor::expense(&event.id, "Flowers", 250.0)).unwrap();
        db::insert_vendor(&conn, &Vendor::expense(&event.id, "Lighting", 400.0)).unwrap();

        // spent has drifted away from the vendor-price truth
        db::update_spent(&conn, &event.id, 700.0).unwrap();

        let repair = recompute_spent(&conn, &event.id).unwrap();
        assert_eq!(repair.previous, 700.0);
        assert!((repair.recomputed - 650.0).abs() < 1e-9);
        assert!((repair.drift + 50.0).abs() < 1e-9);

        // Second pass finds nothing to correct
        let again = recompute_spent(&conn, &event.id).unwrap();
        assert_eq!(again.drift, 0.0);
    }

    #[test]
    fn test_missing_event() {
        let (conn, _event) = setup(0.0);
        assert!(matches!(
            apply_delta(&conn, "missing", 10.0).unwrap_err(),
            LedgerError::NotFound { .. }
        ));
    }
}
