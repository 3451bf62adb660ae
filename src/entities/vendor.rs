// 🧾 Vendor Entity - Contracted line items with per-head pricing
//
// Holds the single authoritative scaling rule for per-plate vendors.
// The implied per-head rate (price / number_of_guests) is preserved across
// headcount changes unless the new count would fall below the vendor's
// minimum guest floor, in which case the basis is pinned at the floor and
// the price is not reduced further.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PRICING UNIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingUnit {
    /// One fixed price regardless of headcount
    Flat,

    /// Scales with the guest count (the only unit the engine rescales)
    PerPlate,

    /// Priced by the hour (venue, staff)
    PerHour,

    /// Priced by the day (rentals)
    PerDay,
}

impl PricingUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingUnit::Flat => "flat",
            PricingUnit::PerPlate => "per_plate",
            PricingUnit::PerHour => "per_hour",
            PricingUnit::PerDay => "per_day",
        }
    }

    pub fn parse(value: &str) -> Option<PricingUnit> {
        match value {
            "flat" => Some(PricingUnit::Flat),
            "per_plate" => Some(PricingUnit::PerPlate),
            "per_hour" => Some(PricingUnit::PerHour),
            "per_day" => Some(PricingUnit::PerDay),
            _ => None,
        }
    }
}

// ============================================================================
// PLATE SCALING OUTCOME
// ============================================================================

/// Result of applying a headcount delta to one per-plate vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateScaling {
    /// Basis after the delta (clamped at 0, pinned at the floor)
    pub new_basis: u32,

    /// Price after the delta (clamped at 0)
    pub new_price: f64,

    /// Signed price change actually applied
    pub price_delta: f64,

    /// True when the min-guest floor cut the reduction short
    pub floor_preserved: bool,
}

// ============================================================================
// VENDOR ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    /// Stable identity (UUID) - never changes
    pub id: String,

    pub event_id: String,

    /// External-source identifier; unique per event when present.
    /// Manual vendors and expense rows carry None.
    pub place_id: Option<String>,

    pub title: String,

    pub category: String,

    /// Current total cost for this line item
    pub price: f64,

    pub pricing_unit: PricingUnit,

    /// Headcount basis used for per-plate scaling
    pub number_of_guests: u32,

    /// Floor below which per-plate scaling is suspended
    pub min_guest_limit: Option<u32>,

    pub created_at: DateTime<Utc>,
}

impl Vendor {
    pub fn new(
        event_id: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
        price: f64,
        pricing_unit: PricingUnit,
    ) -> Self {
        Vendor {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            place_id: None,
            title: title.into(),
            category: category.into(),
            price,
            pricing_unit,
            number_of_guests: 0,
            min_guest_limit: None,
            created_at: Utc::now(),
        }
    }

    /// Manual expense entries are flat-rate vendor rows without a place id.
    pub fn expense(event_id: impl Into<String>, title: impl Into<String>, amount: f64) -> Self {
        Vendor::new(event_id, title, "Expense", amount, PricingUnit::Flat)
    }

    /// Implied per-head rate. A zero basis means the vendor has never been
    /// scaled; treat the rate as 0 rather than dividing by zero.
    pub fn per_head_rate(&self) -> f64 {
        if self.number_of_guests > 0 {
            self.price / self.number_of_guests as f64
        } else {
            0.0
        }
    }

    /// Apply a signed headcount delta to this vendor.
    ///
    /// `prior_count` is the event headcount before the delta; the floor
    /// check compares against it, not against this vendor's basis, because
    /// the floor is a contract term about the event's headcount.
    ///
    /// Returns None for vendors that do not scale with headcount.
    pub fn scale_for_guest_delta(&self, delta: i64, prior_count: u32) -> Option<PlateScaling> {
        if self.pricing_unit != PricingUnit::PerPlate {
            return None;
        }

        let rate = self.per_head_rate();
        let basis = self.number_of_guests as i64;

        if delta < 0 {
            if let Some(floor) = self.min_guest_limit {
                if prior_count as i64 + delta < floor as i64 {
                    // Shrink only down to the floor, never past it. A basis
                    // already at or below the floor does not move at all.
                    let new_basis = (basis + delta).max(floor as i64).min(basis);
                    let new_price = (self.price + rate * (new_basis - basis) as f64).max(0.0);
                    return Some(PlateScaling {
                        new_basis: new_basis as u32,
                        new_price,
                        price_delta: new_price - self.price,
                        floor_preserved: true,
                    });
                }
            }
        }

        let new_basis = (basis + delta).max(0);
        let new_price = (self.price + rate * delta as f64).max(0.0);
        Some(PlateScaling {
            new_basis: new_basis as u32,
            new_price,
            price_delta: new_price - self.price,
            floor_preserved: false,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn caterer(price: f64, basis: u32, floor: Option<u32>) -> Vendor {
        let mut vendor =
            Vendor::new("event-1", "Caterer", "Catering", price, PricingUnit::PerPlate);
        vendor.number_of_guests = basis;
        vendor.min_guest_limit = floor;
        vendor
    }

    #[test]
    fn test_flat_vendor_never_scales() {
        let vendor = Vendor::new("event-1", "Venue", "Venue", 5000.0, PricingUnit::Flat);
        assert!(vendor.scale_for_guest_delta(3, 10).is_none());
        assert!(vendor.scale_for_guest_delta(-3, 10).is_none());
    }

    #[test]
    fn test_rate_preserved_on_add() {
        // 1000 across 10 plates = 100/head
        let vendor = caterer(1000.0, 10, None);

        let scaling = vendor.scale_for_guest_delta(1, 10).unwrap();
        assert_eq!(scaling.new_basis, 11);
        assert!((scaling.new_price - 1100.0).abs() < 1e-9);
        assert!((scaling.price_delta - 100.0).abs() < 1e-9);
        assert!(!scaling.floor_preserved);

        // Rate is invariant across the change
        let after = Vendor {
            number_of_guests: scaling.new_basis,
            price: scaling.new_price,
            ..vendor
        };
        assert!((after.per_head_rate() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_preserved_on_remove_above_floor() {
        let vendor = caterer(1000.0, 10, Some(8));

        // 10 -> 9 stays above the floor
        let scaling = vendor.scale_for_guest_delta(-1, 10).unwrap();
        assert_eq!(scaling.new_basis, 9);
        assert!((scaling.new_price - 900.0).abs() < 1e-9);
        assert!(!scaling.floor_preserved);
    }

    #[test]
    fn test_floor_pins_basis_and_price() {
        let vendor = caterer(1000.0, 10, Some(8));

        // 10 -> 5 crosses the floor of 8: only 2 plates come off
        let scaling = vendor.scale_for_guest_delta(-5, 10).unwrap();
        assert_eq!(scaling.new_basis, 8);
        assert!((scaling.new_price - 800.0).abs() < 1e-9);
        assert!((scaling.price_delta + 200.0).abs() < 1e-9);
        assert!(scaling.floor_preserved);
    }

    #[test]
    fn test_basis_already_at_floor_does_not_move() {
        let vendor = caterer(800.0, 8, Some(8));

        let scaling = vendor.scale_for_guest_delta(-3, 8).unwrap();
        assert_eq!(scaling.new_basis, 8);
        assert!((scaling.new_price - 800.0).abs() < 1e-9);
        assert_eq!(scaling.price_delta, 0.0);
        assert!(scaling.floor_preserved);
    }

    #[test]
    fn test_zero_basis_guard() {
        // Never scaled: rate is treated as 0, price untouched
        let vendor = caterer(1200.0, 0, None);

        let scaling = vendor.scale_for_guest_delta(5, 0).unwrap();
        assert_eq!(scaling.new_basis, 5);
        assert!((scaling.new_price - 1200.0).abs() < 1e-9);
        assert_eq!(scaling.price_delta, 0.0);
    }

    #[test]
    fn test_removal_clamps_at_zero() {
        let vendor = caterer(300.0, 3, None);

        let scaling = vendor.scale_for_guest_delta(-10, 3).unwrap();
        assert_eq!(scaling.new_basis, 0);
        assert_eq!(scaling.new_price, 0.0);
        assert!((scaling.price_delta + 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_expense_row_shape() {
        let expense = Vendor::expense("event-1", "Decoration cloth", 450.0);
        assert_eq!(expense.pricing_unit, PricingUnit::Flat);
        assert_eq!(expense.category, "Expense");
        assert!(expense.place_id.is_none());
    }
}
