// ⚖️ Reconciliation Engine - keeps the three aggregates consistent
//
// Every mutation follows the same template:
//   1. resolve the event
//   2. apply the roster mutation, obtaining a signed headcount delta
//   3. rescale per-plate vendors for the delta
//   4. apply the summed price delta to the budget
//   5. refresh the cached headcount from the live roster
//   6. emit a limit warning if the overage strictly increased
//   7. return the outcome payload
//
// Steps 2-5 run inside a per-event critical section so that concurrent
// mutations on one event serialize; events do not contend with each
// other beyond individual statements. A failure after the roster write
// committed surfaces as PartialReconciliation; repair() restores the
// derived aggregates from stored state and is safe to re-run.
//
// Notifications are emitted only after the connection guard is released:
// the production emitter shares the engine's connection and would
// deadlock relocking it. The per-event lock still covers the emission.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::budget::{self, SpentRepair};
use crate::db;
use crate::entities::{Event, Guest, GuestStatus, Vendor};
use crate::error::{LedgerError, Result};
use crate::import::ImportPolicy;
use crate::ledger::{self, NewVendor, VendorAdjustment};
use crate::notify::{NotificationEmitter, NotificationKind, NotificationRequest};
use crate::roster::{self, SheetRow};

// ============================================================================
// PER-EVENT LOCKS
// ============================================================================

/// Mutual-exclusion scope keyed by event id. Lock entries are created on
/// first use and kept for the lifetime of the engine.
#[derive(Default)]
struct EventLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EventLocks {
    fn for_event(&self, event_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(event_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

// ============================================================================
// OUTCOME PAYLOADS
// ============================================================================

/// Result of one reconciled mutation, for caller display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub event_id: String,

    /// Live roster cardinality after the mutation
    pub headcount: u32,

    /// Signed headcount change this mutation produced
    pub guest_delta: i64,

    /// Net budget change applied (sum of vendor price deltas)
    pub budget_delta: f64,

    /// Vendors whose price changed
    pub vendor_adjustments: Vec<VendorAdjustment>,

    /// Vendors whose min-guest floor cut the reduction short
    pub floor_preserved: Vec<String>,

    pub guest_limit_exceeded: bool,

    /// True when a limit warning was actually handed to the emitter
    pub warning_emitted: bool,
}

impl ReconcileOutcome {
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "Headcount: {} ({}{})",
            self.headcount,
            if self.guest_delta >= 0 { "+" } else { "" },
            self.guest_delta
        )];
        if !self.vendor_adjustments.is_empty() {
            parts.push(format!(
                "Vendor pricing updated for {} vendors",
                self.vendor_adjustments.len()
            ));
        }
        if self.budget_delta > 0.0 {
            parts.push(format!("Budget increased by {:.2}", self.budget_delta));
        } else if self.budget_delta < 0.0 {
            parts.push(format!("Budget reduced by {:.2}", -self.budget_delta));
        }
        if !self.floor_preserved.is_empty() {
            parts.push(format!(
                "Minimum-guest floor preserved for {} vendors",
                self.floor_preserved.len()
            ));
        }
        if self.guest_limit_exceeded {
            parts.push("Guest limit exceeded".to_string());
        }
        parts.join(", ")
    }
}

/// A guest mutation plus the reconciliation it triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestMutation {
    pub guest: Guest,
    pub reconcile: ReconcileOutcome,
}

/// A vendor mutation: no guest rescaling, just the budget delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorMutation {
    pub vendor: Vendor,
    pub budget_delta: f64,
    pub new_spent: f64,
}

/// A bulk guest insert plus the single batched reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub reconcile: ReconcileOutcome,
    pub guests_added: usize,
    pub duplicates_skipped: usize,
}

/// Result of the explicit repair pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub vendor_adjustments: Vec<VendorAdjustment>,
    pub spent: SpentRepair,
    pub headcount: u32,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    db: Arc<Mutex<Connection>>,
    emitter: Arc<dyn NotificationEmitter>,
    locks: EventLocks,
}

impl ReconciliationEngine {
    pub fn new(db: Arc<Mutex<Connection>>, emitter: Arc<dyn NotificationEmitter>) -> Self {
        ReconciliationEngine {
            db,
            emitter,
            locks: EventLocks::default(),
        }
    }

    // ------------------------------------------------------------------
    // Guest mutations
    // ------------------------------------------------------------------

    pub fn add_guest(&self, event_id: &str, name: &str, email: &str) -> Result<GuestMutation> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        let event = Self::resolve_event(&conn, event_id)?;
        let guest = roster::add_guest(&conn, event_id, name, email)?;
        let (reconcile, warning) = self.finish(&conn, &event, 1)?;
        drop(conn);
        let reconcile = self.deliver(reconcile, warning);
        Ok(GuestMutation { guest, reconcile })
    }

    pub fn remove_guest(&self, guest_id: &str) -> Result<GuestMutation> {
        let event_id = self.event_of_guest(guest_id)?;
        let lock = self.locks.for_event(&event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        let event = Self::resolve_event(&conn, &event_id)?;
        let guest = roster::remove_guest(&conn, guest_id)?;
        let (reconcile, warning) = self.finish(&conn, &event, -1)?;
        drop(conn);
        let reconcile = self.deliver(reconcile, warning);
        Ok(GuestMutation { guest, reconcile })
    }

    /// Clear the roster with one batched `-N` delta.
    pub fn remove_all_guests(&self, event_id: &str) -> Result<ReconcileOutcome> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        let event = Self::resolve_event(&conn, event_id)?;
        let removed = db::delete_guests_for_event(&conn, event_id)?;
        let (reconcile, warning) = self.finish(&conn, &event, -(removed as i64))?;
        drop(conn);
        Ok(self.deliver(reconcile, warning))
    }

    /// RSVP response: a pure status change, headcount delta 0, so no
    /// rescaling runs. Ripples a `response` notification to the creator.
    pub fn set_guest_status(&self, guest_id: &str, status: GuestStatus) -> Result<Guest> {
        let event_id = self.event_of_guest(guest_id)?;
        let lock = self.locks.for_event(&event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        let event = Self::resolve_event(&conn, &event_id)?;
        let guest = roster::set_status(&conn, guest_id, status)?;
        drop(conn);

        self.emit(NotificationRequest {
            recipient_id: event.creator_id.clone(),
            event_id: event.id.clone(),
            kind: NotificationKind::Response,
            message: format!("{} {} for {}", guest.name, status.as_str(), event.title),
            metadata: serde_json::json!({
                "guest_id": guest.id,
                "status": status.as_str(),
            }),
        });

        Ok(guest)
    }

    /// Insert a batch of candidate rows and reconcile once with a single
    /// `+N` delta, so vendor rescaling and budget updates happen exactly
    /// once for the whole batch.
    pub fn bulk_add_guests(
        &self,
        event_id: &str,
        rows: &[SheetRow],
        policy: ImportPolicy,
    ) -> Result<BulkOutcome> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        let event = Self::resolve_event(&conn, event_id)?;

        if policy == ImportPolicy::Strict && event.guest_limit > 0 {
            // Fail fast before any roster write: count the rows that would
            // actually land, then compare the prospective total to the cap.
            let net_new = Self::prospective_new(&conn, &event, rows)?;
            let attempted = event.no_of_guest_added + net_new;
            if attempted > event.guest_limit {
                return Err(LedgerError::LimitExceeded {
                    limit: event.guest_limit,
                    attempted,
                });
            }
        }

        let report = roster::bulk_insert(&conn, event_id, rows)?;
        let delta = report.inserted.len() as i64;
        let (reconcile, warning) = self.finish(&conn, &event, delta)?;
        drop(conn);
        let reconcile = self.deliver(reconcile, warning);

        Ok(BulkOutcome {
            reconcile,
            guests_added: report.inserted.len(),
            duplicates_skipped: report.duplicates,
        })
    }

    // ------------------------------------------------------------------
    // Vendor mutations: ledger write, then budget delta. No rescaling.
    // ------------------------------------------------------------------

    pub fn add_vendor(&self, event_id: &str, data: NewVendor) -> Result<VendorMutation> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        Self::resolve_event(&conn, event_id)?;
        let vendor = ledger::add_vendor(&conn, event_id, data)?;
        let new_spent = budget::apply_delta(&conn, event_id, vendor.price)?;
        Ok(VendorMutation {
            budget_delta: vendor.price,
            new_spent,
            vendor,
        })
    }

    pub fn remove_vendor(&self, vendor_id: &str) -> Result<VendorMutation> {
        let event_id = self.event_of_vendor(vendor_id)?;
        let lock = self.locks.for_event(&event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        Self::resolve_event(&conn, &event_id)?;
        let vendor = ledger::remove_vendor(&conn, vendor_id)?;
        let new_spent = budget::apply_delta(&conn, &event_id, -vendor.price)?;
        Ok(VendorMutation {
            budget_delta: -vendor.price,
            new_spent,
            vendor,
        })
    }

    /// Drop every vendor row and subtract their summed price from spent.
    pub fn remove_all_vendors(&self, event_id: &str) -> Result<(usize, f64)> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        Self::resolve_event(&conn, event_id)?;
        let (count, total) = ledger::remove_all(&conn, event_id)?;
        budget::apply_delta(&conn, event_id, -total)?;
        Ok((count, total))
    }

    pub fn add_expense(&self, event_id: &str, title: &str, amount: f64) -> Result<VendorMutation> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        Self::resolve_event(&conn, event_id)?;
        let vendor = ledger::add_expense(&conn, event_id, title, amount)?;
        let new_spent = budget::apply_delta(&conn, event_id, vendor.price)?;
        Ok(VendorMutation {
            budget_delta: vendor.price,
            new_spent,
            vendor,
        })
    }

    // ------------------------------------------------------------------
    // Budget operations
    // ------------------------------------------------------------------

    pub fn adjust_allocated(&self, event_id: &str, amount: f64) -> Result<f64> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();
        budget::adjust_allocated(&conn, event_id, amount)
    }

    /// Explicit repair pass for stale derived state (after a reported
    /// PartialReconciliation, or to correct accumulated float drift):
    /// re-derive vendor bases from the live headcount, then rewrite spent
    /// from the vendor prices. Idempotent.
    pub fn repair(&self, event_id: &str) -> Result<RepairOutcome> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock().unwrap();
        let conn = self.db.lock().unwrap();

        Self::resolve_event(&conn, event_id)?;
        let headcount = db::count_guests(&conn, event_id)?;
        let vendor_adjustments = ledger::sync_to_headcount(&conn, event_id, headcount)?;
        let spent = budget::recompute_spent(&conn, event_id)?;
        db::update_headcount(&conn, event_id, headcount)?;

        Ok(RepairOutcome {
            vendor_adjustments,
            spent,
            headcount,
        })
    }

    // ------------------------------------------------------------------
    // Template steps 3-7, shared by every roster mutation
    // ------------------------------------------------------------------

    fn finish(
        &self,
        conn: &Connection,
        event_before: &Event,
        delta: i64,
    ) -> Result<(ReconcileOutcome, Option<NotificationRequest>)> {
        self.reconcile_after_roster_change(conn, event_before, delta)
            .map_err(|source| LedgerError::PartialReconciliation {
                event_id: event_before.id.clone(),
                roster_delta: delta,
                source: Box::new(source),
            })
    }

    fn reconcile_after_roster_change(
        &self,
        conn: &Connection,
        event_before: &Event,
        delta: i64,
    ) -> Result<(ReconcileOutcome, Option<NotificationRequest>)> {
        let prior_count = event_before.no_of_guest_added;

        // Step 3: rescale per-plate vendors; a pure status change (delta
        // 0) skips this entirely.
        let vendor_adjustments = if delta != 0 {
            ledger::rescale_for_guest_delta(conn, &event_before.id, delta, prior_count)?
        } else {
            Vec::new()
        };
        let budget_delta: f64 = vendor_adjustments.iter().map(|a| a.price_delta).sum();

        // Step 4
        if budget_delta != 0.0 {
            budget::apply_delta(conn, &event_before.id, budget_delta)?;
        }

        // Step 5: cached count tracks live cardinality
        let headcount = db::count_guests(conn, &event_before.id)?;
        db::update_headcount(conn, &event_before.id, headcount)?;

        // Step 6: warn only when the overage strictly increased. The
        // request is built here but delivered by the caller once the
        // connection guard is gone.
        let over_before = event_before.guests_over_limit(prior_count);
        let over_after = event_before.guests_over_limit(headcount);
        let warning = (over_after > over_before).then(|| NotificationRequest {
            recipient_id: event_before.creator_id.clone(),
            event_id: event_before.id.clone(),
            kind: NotificationKind::Warning,
            message: format!(
                "{} is over its guest limit: {} of {} ({} over)",
                event_before.title, headcount, event_before.guest_limit, over_after
            ),
            metadata: serde_json::json!({
                "headcount": headcount,
                "limit": event_before.guest_limit,
                "overage": over_after,
            }),
        });

        let floor_preserved = vendor_adjustments
            .iter()
            .filter(|a| a.floor_preserved)
            .map(|a| a.vendor_id.clone())
            .collect();

        let outcome = ReconcileOutcome {
            event_id: event_before.id.clone(),
            headcount,
            guest_delta: delta,
            budget_delta,
            vendor_adjustments,
            floor_preserved,
            guest_limit_exceeded: over_after > 0,
            warning_emitted: false,
        };
        Ok((outcome, warning))
    }

    fn deliver(
        &self,
        mut outcome: ReconcileOutcome,
        warning: Option<NotificationRequest>,
    ) -> ReconcileOutcome {
        if let Some(request) = warning {
            outcome.warning_emitted = self.emit(request);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn resolve_event(conn: &Connection, event_id: &str) -> Result<Event> {
        db::get_event(conn, event_id)?.ok_or_else(|| LedgerError::not_found("event", event_id))
    }

    fn event_of_guest(&self, guest_id: &str) -> Result<String> {
        let conn = self.db.lock().unwrap();
        let guest = db::get_guest(&conn, guest_id)?
            .ok_or_else(|| LedgerError::not_found("guest", guest_id))?;
        Ok(guest.event_id)
    }

    fn event_of_vendor(&self, vendor_id: &str) -> Result<String> {
        let conn = self.db.lock().unwrap();
        let vendor = db::get_vendor(&conn, vendor_id)?
            .ok_or_else(|| LedgerError::not_found("vendor", vendor_id))?;
        Ok(vendor.event_id)
    }

    /// Fire-and-forget: emission failures are reported on stderr and
    /// never propagate to the reconciliation caller.
    fn emit(&self, request: NotificationRequest) -> bool {
        match self.emitter.notify(request) {
            Ok(_) => true,
            Err(err) => {
                eprintln!("notification emission failed: {err}");
                false
            }
        }
    }

    /// How many candidate rows would actually land on the roster: valid
    /// email, not already present, not repeated earlier in the batch.
    fn prospective_new(conn: &Connection, event: &Event, rows: &[SheetRow]) -> Result<u32> {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        let mut net_new = 0;
        for row in rows {
            let email = crate::entities::guest::normalize_email(&row.email);
            if email.is_empty() || !email.contains('@') {
                continue;
            }
            if !seen.insert(email.clone()) {
                continue;
            }
            if !db::guest_email_exists(conn, &event.id, &email)? {
                net_new += 1;
            }
        }
        Ok(net_new)
    }
}

// ============================================================================
// TESTS
// ============================================================================
