//! External calendar integration.
//!
//! Listings can import blocked dates from other booking channels via iCal
//! feed URLs, and export their own confirmed bookings as an iCal document for
//! the reverse direction. Fetched feeds are cached per URL with a TTL and
//! explicit invalidation.

pub mod cache;
pub mod ical;

pub use cache::{CalendarFetcher, ExternalCalendarCache, HttpCalendarFetcher, MockCalendarFetcher};
pub use ical::{BlockedPeriod, export_ical, parse_ical};
