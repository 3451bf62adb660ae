// 🎪 Event Entity - The aggregate root the engine reconciles against
//
// Carries the cached headcount (must track live roster cardinality after
// every completed mutation) and the embedded budget pair. Mutated only
// through the Reconciliation Engine or a direct allocation adjustment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// BUDGET
// ============================================================================

/// Per-event allocated/spent pair.
///
/// `spent` may exceed `allocated` (that is a warning condition, not a hard
/// stop) but is clamped at 0 after any reduction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub allocated: f64,
    pub spent: f64,
}

impl Budget {
    pub fn new(allocated: f64) -> Self {
        Budget {
            allocated,
            spent: 0.0,
        }
    }

    /// Apply a signed spend delta, clamped at zero.
    pub fn apply(&self, amount: f64) -> f64 {
        (self.spent + amount).max(0.0)
    }

    pub fn is_over_allocated(&self) -> bool {
        self.spent > self.allocated
    }
}

// ============================================================================
// EVENT ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Stable identity (UUID) - never changes
    pub id: String,

    pub title: String,

    /// Recipient of limit-breach and RSVP notifications
    pub creator_id: String,

    /// Guest cap; 0 means unlimited
    pub guest_limit: u32,

    /// Cached roster cardinality, kept in sync by the engine
    pub no_of_guest_added: u32,

    pub budget: Budget,

    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        title: impl Into<String>,
        creator_id: impl Into<String>,
        guest_limit: u32,
        allocated: f64,
    ) -> Self {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            creator_id: creator_id.into(),
            guest_limit,
            no_of_guest_added: 0,
            budget: Budget::new(allocated),
            created_at: Utc::now(),
        }
    }

    /// How many guests a given headcount would put over the limit.
    /// Always 0 for unlimited events.
    pub fn guests_over_limit(&self, headcount: u32) -> u32 {
        if self.guest_limit == 0 {
            0
        } else {
            headcount.saturating_sub(self.guest_limit)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
