//! Shared test fixture: an in-memory engine with programmable gateway,
//! calendar, notifier, and clock.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use stayhub::availability::{AvailabilityResolver, BlockedDateAggregator};
use stayhub::booking::{BookingLedger, CreateBooking};
use stayhub::calendar::{ExternalCalendarCache, MockCalendarFetcher};
use stayhub::clock::FixedClock;
use stayhub::notify::{Notifier, RecordingNotifier};
use stayhub::payments::{MockPaymentGateway, PaymentGateway, PaymentOrchestrator};
use stayhub::repo::{BookingRepo, ListingRepo, MemoryStore};
use stayhub::types::{
    Booking, BookingId, CancellationPolicy, Listing, ListingId, Money, PaymentMethod,
    PaymentTransaction, UserId,
};

/// Fully wired engine over in-memory fakes.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<MockCalendarFetcher>,
    pub calendar_cache: Arc<ExternalCalendarCache>,
    pub gateway: Arc<MockPaymentGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub resolver: Arc<AvailabilityResolver>,
    pub ledger: Arc<BookingLedger>,
    pub host_id: UserId,
    pub guest_id: UserId,
    pub listing: Listing,
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn instant(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    date(y, m, d).and_hms_opt(h, 0, 0).unwrap().and_utc()
}

/// A listing at 50 000/night, 20 000 cleaning fee, two guests included,
/// 10 000/night per extra guest, flat seasonality.
pub fn listing(host_id: UserId, policy: CancellationPolicy) -> Listing {
    Listing {
        id: ListingId::new(),
        host_id,
        name: "Harbor cottage".to_string(),
        price_per_night: Money::from_minor(50_000),
        seasonal_percents: [100; 12],
        cleaning_fee: Money::from_minor(20_000),
        base_guests: 2,
        extra_guest_fee: Money::from_minor(10_000),
        cancellation_policy: policy,
        calendar_sources: Vec::new(),
    }
}

/// Builds the engine with one seeded listing and the clock frozen at
/// 2026-03-01 12:00 UTC.
pub fn test_app(policy: CancellationPolicy) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let listings: Arc<dyn ListingRepo> = store.clone();
    let bookings: Arc<dyn BookingRepo> = store.clone();

    let fetcher = Arc::new(MockCalendarFetcher::new());
    let calendar_cache = Arc::new(ExternalCalendarCache::new(
        fetcher.clone(),
        Duration::from_secs(600),
    ));
    let aggregator =
        BlockedDateAggregator::new(bookings.clone(), listings.clone(), calendar_cache.clone());
    let resolver = Arc::new(AvailabilityResolver::new(listings.clone(), aggregator));

    let gateway = Arc::new(MockPaymentGateway::new());
    let gateway_dyn: Arc<dyn PaymentGateway> = gateway.clone();
    let payments = Arc::new(PaymentOrchestrator::new(gateway_dyn));

    let notifier = Arc::new(RecordingNotifier::new());
    let notifier_dyn: Arc<dyn Notifier> = notifier.clone();

    let clock = Arc::new(FixedClock::new(instant(2026, 3, 1, 12)));

    let ledger = Arc::new(BookingLedger::new(
        listings,
        bookings,
        resolver.clone(),
        payments,
        notifier_dyn,
        clock.clone(),
    ));

    let host_id = UserId::new();
    let listing = listing(host_id, policy);
    store.put_listing(listing.clone());

    TestApp {
        store,
        fetcher,
        calendar_cache,
        gateway,
        notifier,
        clock,
        resolver,
        ledger,
        host_id,
        guest_id: UserId::new(),
        listing,
    }
}

impl TestApp {
    /// Creates a pending booking for 2026-06-10..13, two guests, immediate
    /// payment. Total: 3 x 50 000 + 20 000 cleaning = 170 000.
    pub async fn book_default(&self) -> Booking {
        self.ledger
            .create(CreateBooking {
                listing_id: self.listing.id,
                guest_id: self.guest_id,
                check_in: date(2026, 6, 10),
                check_out: date(2026, 6, 13),
                guests: 2,
                payment_method: PaymentMethod::Immediate,
            })
            .await
            .unwrap()
    }

    /// Ledger rows for a booking, oldest first.
    pub async fn transactions_of(&self, id: BookingId) -> Vec<PaymentTransaction> {
        let bookings: &dyn BookingRepo = self.store.as_ref();
        bookings.transactions(id).await.unwrap()
    }

    /// Marks the default booking paid through the verification path.
    pub async fn pay(&self, booking: &Booking, payment_id: &str) -> Booking {
        self.gateway.set_payment(
            payment_id,
            booking.total_price,
            stayhub::payments::GatewayStatus::Paid,
        );
        self.ledger
            .verify_payment(booking.id, payment_id)
            .await
            .unwrap()
            .booking
    }
}
