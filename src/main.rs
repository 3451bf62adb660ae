// Guest Ledger CLI - create events, import guest sheets, inspect state

use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

use guest_ledger::{
    db, BulkImportProcessor, Event, ImportPolicy, ReconciliationEngine, SqliteEmitter,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("create") if args.len() >= 5 => {
            let limit: u32 = args[4].parse().context("guest limit must be a number")?;
            let allocated: f64 = args
                .get(5)
                .map(|value| value.parse())
                .transpose()
                .context("budget must be a number")?
                .unwrap_or(0.0);
            run_create(&args[2], &args[3], limit, allocated)
        }
        Some("import") if args.len() >= 5 => {
            let strict = args.get(5).map(String::as_str) == Some("--strict");
            run_import(&args[2], &args[3], &args[4], strict)
        }
        Some("status") if args.len() >= 4 => run_status(&args[2], &args[3]),
        Some("repair") if args.len() >= 4 => run_repair(&args[2], &args[3]),
        _ => {
            eprintln!("Usage:");
            eprintln!("  guest-ledger create <db> <title> <guest-limit> [budget]");
            eprintln!("  guest-ledger import <db> <event-id> <sheet.csv> [--strict]");
            eprintln!("  guest-ledger status <db> <event-id>");
            eprintln!("  guest-ledger repair <db> <event-id>");
            std::process::exit(2);
        }
    }
}

fn open(db_path: &str) -> Result<Arc<Mutex<Connection>>> {
    let conn = Connection::open(Path::new(db_path))
        .with_context(|| format!("failed to open database at {db_path}"))?;
    db::setup_database(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn engine_for(db: Arc<Mutex<Connection>>) -> ReconciliationEngine {
    let emitter = Arc::new(SqliteEmitter::new(db.clone()));
    ReconciliationEngine::new(db, emitter)
}

fn run_create(db_path: &str, title: &str, guest_limit: u32, allocated: f64) -> Result<()> {
    let db = open(db_path)?;
    let event = Event::new(title, "cli", guest_limit, allocated);
    db::insert_event(&db.lock().unwrap(), &event)?;

    let limit_display = if guest_limit == 0 {
        "unlimited".to_string()
    } else {
        guest_limit.to_string()
    };
    println!("✓ Event created: {}", event.title);
    println!("  id:          {}", event.id);
    println!("  guest limit: {limit_display}");
    println!("  budget:      {allocated:.2}");
    Ok(())
}

fn run_import(db_path: &str, event_id: &str, sheet_path: &str, strict: bool) -> Result<()> {
    let sheet = std::fs::read(sheet_path)
        .with_context(|| format!("failed to read sheet {sheet_path}"))?;

    let db = open(db_path)?;
    let engine = engine_for(db);
    let processor = BulkImportProcessor::new(&engine);

    let policy = if strict {
        ImportPolicy::Strict
    } else {
        ImportPolicy::Advisory
    };

    println!("📂 Importing {sheet_path}...");
    let outcome = processor.import(event_id, &sheet, policy)?;
    println!("✓ {}", outcome.summary());

    if outcome.bulk.reconcile.guest_limit_exceeded {
        println!("⚠ Event is over its guest limit");
    }
    Ok(())
}

fn run_status(db_path: &str, event_id: &str) -> Result<()> {
    let db = open(db_path)?;
    let conn = db.lock().unwrap();

    let Some(event) = db::get_event(&conn, event_id)? else {
        bail!("event not found: {event_id}");
    };
    let guests = db::guests_for_event(&conn, event_id)?;
    let vendors = db::vendors_for_event(&conn, event_id)?;

    println!("🎪 {}", event.title);
    println!(
        "  guests:  {} (cached {})",
        guests.len(),
        event.no_of_guest_added
    );
    if event.guest_limit > 0 {
        println!(
            "  limit:   {} ({} over)",
            event.guest_limit,
            event.guests_over_limit(guests.len() as u32)
        );
    }
    println!(
        "  budget:  {:.2} spent of {:.2} allocated",
        event.budget.spent, event.budget.allocated
    );
    for vendor in &vendors {
        println!(
            "  vendor:  {} [{}] {:.2} ({} plates)",
            vendor.title,
            vendor.pricing_unit.as_str(),
            vendor.price,
            vendor.number_of_guests,
        );
    }
    Ok(())
}

fn run_repair(db_path: &str, event_id: &str) -> Result<()> {
    let db = open(db_path)?;
    let engine = engine_for(db);

    let outcome = engine.repair(event_id)?;
    println!("✓ Repair complete");
    println!("  headcount:        {}", outcome.headcount);
    println!("  vendors adjusted: {}", outcome.vendor_adjustments.len());
    println!(
        "  spent:            {:.2} (drift corrected: {:.2})",
        outcome.spent.recomputed, outcome.spent.drift
    );
    Ok(())
}
