// Vendor Ledger - durable per-event vendor line items
//
// Owns the rescale pass that applies one headcount delta to every
// per-plate vendor of an event. The scaling math itself lives on the
// Vendor entity; this module loads, applies, and persists.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::entities::{PricingUnit, Vendor};
use crate::error::{LedgerError, Result};

// ============================================================================
// VENDOR ADJUSTMENT
// ============================================================================

/// One vendor's price movement from a rescale pass, for caller display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorAdjustment {
    pub vendor_id: String,
    pub title: String,
    pub price_delta: f64,
    pub new_price: f64,
    pub floor_preserved: bool,
}

// ============================================================================
// VENDOR DATA (caller input)
// ============================================================================

/// Fields supplied when attaching a vendor to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVendor {
    pub title: String,
    pub category: String,
    pub price: f64,
    pub pricing_unit: PricingUnit,
    /// External-source identifier (search-based adds); unique per event
    pub place_id: Option<String>,
    /// Per-plate basis to start from, normally the current headcount
    pub number_of_guests: u32,
    pub min_guest_limit: Option<u32>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

pub fn add_vendor(conn: &Connection, event_id: &str, data: NewVendor) -> Result<Vendor> {
    if data.title.trim().is_empty() {
        return Err(LedgerError::validation("vendor title is required"));
    }
    if data.price < 0.0 {
        return Err(LedgerError::validation("vendor price must be non-negative"));
    }

    if let Some(place_id) = &data.place_id {
        if db::vendor_place_exists(conn, event_id, place_id)? {
            return Err(LedgerError::conflict(format!(
                "vendor {place_id} already attached to this event"
            )));
        }
    }

    let mut vendor = Vendor::new(
        event_id,
        data.title.trim(),
        data.category,
        data.price,
        data.pricing_unit,
    );
    vendor.place_id = data.place_id;
    vendor.number_of_guests = data.number_of_guests;
    vendor.min_guest_limit = data.min_guest_limit;

    db::insert_vendor(conn, &vendor)?;
    Ok(vendor)
}

/// Deletes and returns the prior record so the caller can subtract its
/// price from the budget.
pub fn remove_vendor(conn: &Connection, vendor_id: &str) -> Result<Vendor> {
    let vendor = db::get_vendor(conn, vendor_id)?
        .ok_or_else(|| LedgerError::not_found("vendor", vendor_id))?;
    db::delete_vendor(conn, vendor_id)?;
    Ok(vendor)
}

/// Deletes every vendor row for the event; returns how many went and the
/// total price removed.
pub fn remove_all(conn: &Connection, event_id: &str) -> Result<(usize, f64)> {
    let total = db::sum_vendor_prices(conn, event_id)?;
    let count = db::delete_vendors_for_event(conn, event_id)?;
    Ok((count, total))
}

/// Manual expense entries are flat-rate vendor rows without a place id.
pub fn add_expense(conn: &Connection, event_id: &str, title: &str, amount: f64) -> Result<Vendor> {
    if amount < 0.0 {
        return Err(LedgerError::validation("expense amount must be non-negative"));
    }
    let vendor = Vendor::expense(event_id, title, amount);
    db::insert_vendor(conn, &vendor)?;
    Ok(vendor)
}

/// Apply one signed headcount delta to every per-plate vendor of the
/// event. This is the single authoritative scaling path; both the
/// single-guest and bulk-import flows go through it.
pub fn rescale_for_guest_delta(
    conn: &Connection,
    event_id: &str,
    delta: i64,
    prior_count: u32,
) -> Result<Vec<VendorAdjustment>> {
    let mut adjustments = Vec::new();

    for vendor in db::per_plate_vendors_for_event(conn, event_id)? {
        let Some(scaling) = vendor.scale_for_guest_delta(delta, prior_count) else {
            continue;
        };
        db::update_vendor_scaling(conn, &vendor.id, scaling.new_basis, scaling.new_price)?;
        adjustments.push(VendorAdjustment {
            vendor_id: vendor.id,
            title: vendor.title,
            price_delta: scaling.price_delta,
            new_price: scaling.new_price,
            floor_preserved: scaling.floor_preserved,
        });
    }

    Ok(adjustments)
}

/// Repair pass: force every per-plate vendor's basis to agree with the live
/// headcount (respecting its floor) at its current per-head rate. Safe to
/// re-run; it is a function of stored state only.
pub fn sync_to_headcount(
    conn: &Connection,
    event_id: &str,
    headcount: u32,
) -> Result<Vec<VendorAdjustment>> {
    let mut adjustments = Vec::new();

    for vendor in db::per_plate_vendors_for_event(conn, event_id)? {
        let target = headcount.max(vendor.min_guest_limit.unwrap_or(0));
        if target == vendor.number_of_guests {
            continue;
        }
        // A zero basis means the vendor was never scaled and its quoted
        // price is not headcount-derived; adopt the basis, keep the price
        let new_price = if vendor.number_of_guests == 0 {
            vendor.price
        } else {
            (vendor.per_head_rate() * target as f64).max(0.0)
        };
        db::update_vendor_scaling(conn, &vendor.id, target, new_price)?;
        adjustments.push(VendorAdjustment {
            vendor_id: vendor.id,
            title: vendor.title,
            price_delta: new_price - vendor.price,
            new_price,
            floor_preserved: headcount < target,
        });
    }

    Ok(adjustments)
}

// ============================================================================
// TESTS
// ============================================================================
