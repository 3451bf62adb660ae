// Error taxonomy for the reconciliation engine.
//
// Every operation fails fast with one of these before mutating state,
// except PartialReconciliation, which reports a roster write that
// committed before a later step failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Event, guest, or vendor id does not resolve. No retry.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Duplicate guest email within an event, or duplicate vendor place id.
    /// Callers may treat this as "already added".
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed id, missing required field, invalid value. Raised before
    /// any mutation occurs.
    #[error("validation: {0}")]
    Validation(String),

    /// Guest count would exceed the event cap. Hard failure only in strict
    /// bulk-import mode; the default paths surface the overage as a warning.
    #[error("guest limit exceeded: limit {limit}, attempted {attempted}")]
    LimitExceeded { limit: u32, attempted: u32 },

    /// The roster mutation committed but vendor/budget rescaling did not
    /// complete. The caller can retry the repair pass without re-applying
    /// the guest change; rescaling derives from stored state.
    #[error("partial reconciliation for event {event_id} (roster delta {roster_delta}): {source}")]
    PartialReconciliation {
        event_id: String,
        roster_delta: i64,
        #[source]
        source: Box<LedgerError>,
    },

    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Malformed guest sheet. Aborts a bulk import before any roster write.
    #[error("sheet parse error: {0}")]
    Sheet(#[from] csv::Error),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        LedgerError::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// True for errors the caller can safely retry via the repair pass.
    pub fn is_partial(&self) -> bool {
        matches!(self, LedgerError::PartialReconciliation { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
