//! Repository traits over the authoritative store.
//!
//! The engine never touches a global database handle; every component takes
//! the repositories it needs as injected `Arc<dyn ...>` values. Two methods
//! carry the financial-correctness guarantees:
//!
//! - [`BookingRepo::insert_booking`] is an atomic check-then-insert. At most
//!   one non-cancelled booking may hold any `(listing, night)` pair, even
//!   under concurrent create requests.
//! - [`BookingRepo::commit_transition`] applies a state transition and
//!   appends the accompanying payment transaction in one atomic unit, guarded
//!   by a compare-and-swap on `(status, payment_status)`. No call site may
//!   update a booking row directly, so the denormalized payment status can
//!   never drift from the append-only ledger.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::types::{
    Booking, BookingId, BookingStatus, DateOverride, Listing, ListingId, PaymentStatus,
    PaymentTransaction,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Read access to listings and their per-date overrides.
#[async_trait]
pub trait ListingRepo: Send + Sync {
    /// Fetches a listing by id.
    async fn get(&self, id: ListingId) -> Result<Option<Listing>>;

    /// Fetches all overrides for `listing` with dates in `[from, to)`.
    async fn overrides_in_range(
        &self,
        listing: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateOverride>>;
}

/// Booking state plus its append-only payment-transaction ledger.
#[async_trait]
pub trait BookingRepo: Send + Sync {
    /// Fetches a booking by id.
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Non-cancelled bookings of `listing` overlapping `[from, to)`.
    async fn active_in_range(
        &self,
        listing: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>>;

    /// Confirmed, non-cancelled bookings of `listing`, for calendar export.
    async fn confirmed_for_listing(&self, listing: ListingId) -> Result<Vec<Booking>>;

    /// Deferred bookings whose charge is due: payment pending, not cancelled,
    /// billing key present, scheduled date at or before `now`.
    async fn due_deferred(&self, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    /// Inserts a new booking, failing with [`crate::Error::Unavailable`] if
    /// any non-cancelled booking of the same listing overlaps its nights.
    /// Check and insert are a single atomic unit.
    async fn insert_booking(&self, booking: &Booking) -> Result<()>;

    /// Writes `updated` and appends `transaction` (when present) atomically,
    /// provided the stored row still carries the `expected` status pair.
    /// Fails with [`crate::Error::Conflict`] when a concurrent transition won.
    async fn commit_transition(
        &self,
        updated: &Booking,
        expected: (BookingStatus, PaymentStatus),
        transaction: Option<&PaymentTransaction>,
    ) -> Result<()>;

    /// All ledger rows for a booking, oldest first.
    async fn transactions(&self, booking: BookingId) -> Result<Vec<PaymentTransaction>>;
}
