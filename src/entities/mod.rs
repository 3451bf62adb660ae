// Domain records for the three aggregates the engine keeps consistent:
// the event (headcount cache + budget), its guests, and its vendors.

pub mod event;
pub mod guest;
pub mod vendor;

pub use event::{Budget, Event};
pub use guest::{Guest, GuestStatus};
pub use vendor::{PlateScaling, PricingUnit, Vendor};
