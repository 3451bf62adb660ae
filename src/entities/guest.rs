// 👤 Guest Entity - Roster membership with RSVP state
//
// Emails are stored lower-cased; the (event_id, email) pair is the
// deduplication identity for both single adds and bulk imports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// GUEST STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestStatus {
    /// Invited, no response yet (default)
    Pending,

    /// Accepted the invite; sets joined_at on transition
    Confirmed,

    /// Turned the invite down
    Declined,
}

impl GuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuestStatus::Pending => "pending",
            GuestStatus::Confirmed => "confirmed",
            GuestStatus::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<GuestStatus> {
        match value {
            "pending" => Some(GuestStatus::Pending),
            "confirmed" => Some(GuestStatus::Confirmed),
            "declined" => Some(GuestStatus::Declined),
            _ => None,
        }
    }
}

// ============================================================================
// GUEST ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    /// Stable identity (UUID) - never changes
    pub id: String,

    /// Back-reference to the owning event (non-owning)
    pub event_id: String,

    /// Lower-cased, unique within the event
    pub email: String,

    pub name: String,

    pub status: GuestStatus,

    /// Set when the guest transitions into Confirmed
    pub joined_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Guest {
    pub fn new(event_id: impl Into<String>, name: impl Into<String>, email: &str) -> Self {
        Guest {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            email: normalize_email(email),
            name: name.into(),
            status: GuestStatus::Pending,
            joined_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Canonical form used for the uniqueness constraint.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================
