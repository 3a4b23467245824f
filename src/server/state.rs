//! Shared state for the reservation HTTP server.

use crate::availability::AvailabilityResolver;
use crate::booking::BookingLedger;
use crate::calendar::ExternalCalendarCache;
use crate::payments::DeferredChargeScheduler;
use crate::repo::{BookingRepo, ListingRepo};
use std::sync::Arc;

/// Application state shared across all HTTP handlers. Cloned (cheaply via
/// `Arc`) per request.
#[derive(Clone)]
pub struct AppState {
    /// Listing reads for availability and calendar export.
    pub listings: Arc<dyn ListingRepo>,

    /// Booking reads; all writes go through the ledger.
    pub bookings: Arc<dyn BookingRepo>,

    /// The single owner of booking state transitions.
    pub ledger: Arc<BookingLedger>,

    /// Availability and price resolution.
    pub resolver: Arc<AvailabilityResolver>,

    /// External calendar feed cache, exposed for explicit invalidation.
    pub calendar_cache: Arc<ExternalCalendarCache>,

    /// Deferred-charge scheduler, exposed for the HTTP trigger.
    pub scheduler: Arc<DeferredChargeScheduler>,

    /// Shared secret required by the scheduler trigger endpoint.
    pub trigger_secret: String,
}
