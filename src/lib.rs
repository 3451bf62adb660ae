// Guest Ledger - Guest / Vendor / Budget Reconciliation Engine
// Exposes all modules for use in the CLI, surrounding services, and tests

pub mod db;
pub mod entities;
pub mod error;
pub mod roster;        // Guest Roster - per-event guest collection
pub mod ledger;        // Vendor Ledger - vendor line items + rescale pass
pub mod budget;        // Budget Ledger - allocated/spent pair
pub mod notify;        // Notification Emitter boundary
pub mod reconciliation; // Reconciliation Engine - the orchestrator
pub mod import;        // Bulk Import Processor - guest sheets

// Re-export commonly used types
pub use db::setup_database;
pub use entities::{Budget, Event, Guest, GuestStatus, PlateScaling, PricingUnit, Vendor};
pub use error::{LedgerError, Result};
pub use import::{
    parse_guest_sheet, BulkImportOutcome, BulkImportProcessor, ImportPolicy, ParsedSheet,
};
pub use ledger::{NewVendor, VendorAdjustment};
pub use notify::{
    NotificationEmitter, NotificationKind, NotificationRecord, NotificationRequest,
    RecordingEmitter, SqliteEmitter,
};
pub use reconciliation::{
    BulkOutcome, GuestMutation, ReconcileOutcome, ReconciliationEngine, RepairOutcome,
    VendorMutation,
};
pub use roster::{BulkInsertReport, SheetRow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
