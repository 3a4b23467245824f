//! In-memory store backing the test suite.
//!
//! Implements every repository trait behind one mutex so the atomicity
//! contracts (`insert_booking`, `commit_transition`) hold exactly as they do
//! in Postgres. Never used in production.

use super::{BookingRepo, ListingRepo};
use crate::error::{Error, Result};
use crate::types::{
    Booking, BookingId, BookingStatus, DateOverride, Listing, ListingId, PaymentMethod,
    PaymentStatus, PaymentTransaction,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    listings: HashMap<ListingId, Listing>,
    overrides: HashMap<(ListingId, NaiveDate), DateOverride>,
    bookings: HashMap<BookingId, Booking>,
    transactions: Vec<PaymentTransaction>,
}

/// Mutex-guarded in-memory implementation of all repository traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal(anyhow::anyhow!("memory store poisoned")))
    }

    /// Seeds a listing.
    pub fn put_listing(&self, listing: Listing) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.listings.insert(listing.id, listing);
        }
    }

    /// Seeds a date override.
    pub fn put_override(&self, date_override: DateOverride) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .overrides
                .insert((date_override.listing_id, date_override.date), date_override);
        }
    }

    /// Seeds a booking without the vacancy check (test setup only).
    pub fn put_booking(&self, booking: Booking) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.bookings.insert(booking.id, booking);
        }
    }
}

#[async_trait]
impl ListingRepo for MemoryStore {
    async fn get(&self, id: ListingId) -> Result<Option<Listing>> {
        Ok(self.lock()?.listings.get(&id).cloned())
    }

    async fn overrides_in_range(
        &self,
        listing: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateOverride>> {
        Ok(self
            .lock()?
            .overrides
            .values()
            .filter(|o| o.listing_id == listing && o.date >= from && o.date < to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BookingRepo for MemoryStore {
    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    async fn active_in_range(
        &self,
        listing: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.listing_id == listing && !b.is_cancelled() && b.overlaps(from, to))
            .cloned()
            .collect())
    }

    async fn confirmed_for_listing(&self, listing: ListingId) -> Result<Vec<Booking>> {
        let mut bookings: Vec<_> = self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.listing_id == listing && b.status == BookingStatus::Confirmed)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.check_in);
        Ok(bookings)
    }

    async fn due_deferred(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .filter(|b| {
                b.payment_method == PaymentMethod::Deferred
                    && b.payment_status == PaymentStatus::Pending
                    && !b.is_cancelled()
                    && b.billing_key.is_some()
                    && b.scheduled_payment_date.is_some_and(|due| due <= now)
            })
            .cloned()
            .collect())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        let mut inner = self.lock()?;
        // Check and insert under one lock: the in-memory twin of the
        // database's overlap exclusion constraint.
        let taken = inner.bookings.values().any(|b| {
            b.listing_id == booking.listing_id
                && !b.is_cancelled()
                && b.overlaps(booking.check_in, booking.check_out)
        });
        if taken {
            return Err(Error::Unavailable);
        }
        inner.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn commit_transition(
        &self,
        updated: &Booking,
        expected: (BookingStatus, PaymentStatus),
        transaction: Option<&PaymentTransaction>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let current = inner.bookings.get(&updated.id).ok_or(Error::NotFound {
            resource: "booking",
            id: updated.id.to_string(),
        })?;
        if (current.status, current.payment_status) != expected {
            return Err(Error::Conflict);
        }
        inner.bookings.insert(updated.id, updated.clone());
        if let Some(txn) = transaction {
            inner.transactions.push(txn.clone());
        }
        Ok(())
    }

    async fn transactions(&self, booking: BookingId) -> Result<Vec<PaymentTransaction>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .filter(|t| t.booking_id == booking)
            .cloned()
            .collect())
    }
}
