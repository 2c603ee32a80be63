pub mod pricing;
pub mod availability;
pub mod lifecycle;
pub mod store;
pub mod booking;
pub mod usage;

pub use pricing::{calculate_price, PriceQuote};
pub use availability::AvailabilityChecker;
pub use store::*;
pub use booking::BookingService;
pub use usage::AppointmentUsageLedger;
