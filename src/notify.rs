// 📣 Notification Emitter - side-effect boundary of the engine
//
// The engine is handed an emitter at construction instead of reaching for
// any shared transport state, so it stays testable with a fake. Delivery
// mechanics live behind the trait; emission failures are reported and
// swallowed, never propagated to the reconciliation caller.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::Result;

// ============================================================================
// NOTIFICATION KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Limit breach or budget overrun
    Warning,

    /// RSVP state change
    Response,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Warning => "warning",
            NotificationKind::Response => "response",
        }
    }

    pub fn parse(value: &str) -> Option<NotificationKind> {
        match value {
            "warning" => Some(NotificationKind::Warning),
            "response" => Some(NotificationKind::Response),
            _ => None,
        }
    }
}

// ============================================================================
// REQUEST / RECORD
// ============================================================================

/// Fully-formed notification handed to the emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient_id: String,
    pub event_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub recipient_id: String,
    pub event_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn from_request(request: NotificationRequest) -> Self {
        NotificationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: request.recipient_id,
            event_id: request.event_id,
            kind: request.kind,
            message: request.message,
            metadata: request.metadata,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// EMITTER TRAIT + IMPLEMENTATIONS
// ============================================================================

pub trait NotificationEmitter: Send + Sync {
    fn notify(&self, request: NotificationRequest) -> Result<NotificationRecord>;
}

/// Persists notifications to the `notifications` table. The surrounding
/// service is expected to drain that table into whatever real-time
/// transport it uses; transport is out of scope here.
pub struct SqliteEmitter {
    db: Arc<Mutex<Connection>>,
}

impl SqliteEmitter {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        SqliteEmitter { db }
    }
}

impl NotificationEmitter for SqliteEmitter {
    fn notify(&self, request: NotificationRequest) -> Result<NotificationRecord> {
        let record = NotificationRecord::from_request(request);
        let conn = self.db.lock().unwrap();
        db::insert_notification(&conn, &record)?;
        Ok(record)
    }
}

/// Test fake that captures every request it is handed.
#[derive(Default)]
pub struct RecordingEmitter {
    sent: Mutex<Vec<NotificationRequest>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        RecordingEmitter::default()
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.kind == kind)
            .count()
    }
}

impl NotificationEmitter for RecordingEmitter {
    fn notify(&self, request: NotificationRequest) -> Result<NotificationRecord> {
        let record = NotificationRecord::from_request(request.clone());
        self.sent.lock().unwrap().push(request);
        Ok(record)
    }
}

/// Test fake whose every emission fails. Used to prove that notification
/// failures never abort a committed reconciliation.
pub struct FailingEmitter;

impl NotificationEmitter for FailingEmitter {
    fn notify(&self, _request: NotificationRequest) -> Result<NotificationRecord> {
        Err(crate::error::LedgerError::validation(
            "emitter unavailable",
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn warning_request() -> NotificationRequest {
        NotificationRequest {
            recipient_id: "organizer-1".to_string(),
            event_id: "event-1".to_string(),
            kind: NotificationKind::Warning,
            message: "Guest limit exceeded".to_string(),
            metadata: serde_json::json!({ "overage": 2 }),
        }
    }

    #[test]
    fn test_sqlite_emitter_persists() {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));

        let emitter = SqliteEmitter::new(db.clone());
        let record = emitter.notify(warning_request()).unwrap();
        assert_eq!(record.kind, NotificationKind::Warning);

        let conn = db.lock().unwrap();
        let stored = db::notifications_for_event(&conn, "event-1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "Guest limit exceeded");
        assert_eq!(stored[0].metadata["overage"], 2);
    }

    #[test]
    fn test_recording_emitter_captures() {
        let emitter = RecordingEmitter::new();
        emitter.notify(warning_request()).unwrap();
        emitter.notify(warning_request()).unwrap();

        assert_eq!(emitter.sent().len(), 2);
        assert_eq!(emitter.count_of(NotificationKind::Warning), 2);
        assert_eq!(emitter.count_of(NotificationKind::Response), 0);
    }
}
