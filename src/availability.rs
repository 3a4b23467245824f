//! Nightly availability and price resolution.
//!
//! Reconciles three sources of truth for a listing's calendar: non-cancelled
//! internal bookings, host-entered per-date overrides, and externally
//! imported feeds. The blocked set carries every occupied night plus every
//! checkout boundary; checkout boundaries that are not themselves occupied
//! nights are additionally reported as checkout-only, because a departure day
//! is still a valid arrival day for the next stay (same-day turnover).

use crate::calendar::ExternalCalendarCache;
use crate::error::{Error, Result};
use crate::repo::{BookingRepo, ListingRepo};
use crate::types::{DateOverride, Listing, ListingId, Money, date_range};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Blocked-date view of a listing over a date range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockedDates {
    /// Every night that cannot be booked, plus checkout boundaries.
    pub blocked: BTreeSet<NaiveDate>,
    /// Subset of `blocked` that is only a checkout boundary: still valid as a
    /// new stay's check-in date.
    pub checkout_only: BTreeSet<NaiveDate>,
}

impl BlockedDates {
    /// Whether `night` may be occupied by a stay whose check-in is
    /// `check_in`. Checkout-only dates are exempt for the check-in role only.
    #[must_use]
    pub fn night_is_free(&self, night: NaiveDate, check_in: NaiveDate) -> bool {
        if !self.blocked.contains(&night) {
            return true;
        }
        night == check_in && self.checkout_only.contains(&night)
    }
}

/// Merges internal bookings, host overrides, and external feeds into a
/// [`BlockedDates`] set.
pub struct BlockedDateAggregator {
    bookings: Arc<dyn BookingRepo>,
    listings: Arc<dyn ListingRepo>,
    cache: Arc<ExternalCalendarCache>,
}

impl BlockedDateAggregator {
    /// Creates an aggregator over the given repositories and feed cache.
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingRepo>,
        listings: Arc<dyn ListingRepo>,
        cache: Arc<ExternalCalendarCache>,
    ) -> Self {
        Self {
            bookings,
            listings,
            cache,
        }
    }

    /// Blocked dates for `listing` over `[from, to)`.
    pub async fn blocked_dates(
        &self,
        listing: &Listing,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BlockedDates> {
        let mut nights = BTreeSet::new();
        let mut checkouts = BTreeSet::new();

        for booking in self.bookings.active_in_range(listing.id, from, to).await? {
            nights.extend(booking.nights());
            checkouts.insert(booking.check_out);
        }

        for date_override in self
            .listings
            .overrides_in_range(listing.id, from, to)
            .await?
        {
            if !date_override.available {
                nights.insert(date_override.date);
            }
        }

        // External feeds degrade gracefully inside the cache; a dead source
        // simply contributes nothing.
        for period in self.cache.blocked_periods(&listing.calendar_sources).await {
            nights.extend(period.nights());
            checkouts.insert(period.end);
        }

        nights.retain(|d| *d >= from && *d < to);
        checkouts.retain(|d| *d >= from && *d < to);

        let checkout_only: BTreeSet<_> = checkouts.difference(&nights).copied().collect();
        let blocked: BTreeSet<_> = nights.union(&checkouts).copied().collect();
        Ok(BlockedDates {
            blocked,
            checkout_only,
        })
    }
}

/// One night of a requested stay, priced and checked.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct NightQuote {
    /// The night's calendar date.
    pub date: NaiveDate,
    /// Nightly price: override if present, else base × seasonal factor.
    pub price: Money,
    /// Whether this night may be booked.
    pub available: bool,
}

/// Full resolution of a requested stay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Per-night prices and availability.
    pub nights: Vec<NightQuote>,
    /// AND of all nights.
    pub all_available: bool,
    /// Flat cleaning fee included in `total`.
    pub cleaning_fee: Money,
    /// Nightly sum + cleaning fee + extra-guest fees. Advisory until the
    /// ledger re-resolves at creation time.
    pub total: Money,
}

/// Resolves availability and price for a requested date range.
pub struct AvailabilityResolver {
    listings: Arc<dyn ListingRepo>,
    aggregator: BlockedDateAggregator,
}

impl AvailabilityResolver {
    /// Creates a resolver over the given listing repository and aggregator.
    #[must_use]
    pub fn new(listings: Arc<dyn ListingRepo>, aggregator: BlockedDateAggregator) -> Self {
        Self {
            listings,
            aggregator,
        }
    }

    /// Blocked dates for a listing id over `[from, to)`.
    pub async fn blocked_dates(
        &self,
        listing_id: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BlockedDates> {
        if from >= to {
            return Err(Error::InvalidRange);
        }
        let listing = self.get_listing(listing_id).await?;
        self.aggregator.blocked_dates(&listing, from, to).await
    }

    /// Resolves every night of `[check_in, check_out)` for `listing_id`.
    pub async fn resolve(
        &self,
        listing_id: ListingId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
    ) -> Result<Resolution> {
        if check_in >= check_out {
            return Err(Error::InvalidRange);
        }
        let listing = self.get_listing(listing_id).await?;
        let blocked = self
            .aggregator
            .blocked_dates(&listing, check_in, check_out)
            .await?;
        let overrides: HashMap<NaiveDate, DateOverride> = self
            .listings
            .overrides_in_range(listing_id, check_in, check_out)
            .await?
            .into_iter()
            .map(|o| (o.date, o))
            .collect();

        let mut nights = Vec::new();
        let mut nightly_total = Money::ZERO;
        let mut all_available = true;
        for date in date_range(check_in, check_out) {
            let price = overrides
                .get(&date)
                .and_then(|o| o.price_per_night)
                .unwrap_or_else(|| {
                    listing
                        .price_per_night
                        .apply_percent(listing.seasonal_percent_for(date))
                });
            let available = blocked.night_is_free(date, check_in);
            all_available &= available;
            nightly_total = nightly_total.saturating_add(price);
            nights.push(NightQuote {
                date,
                price,
                available,
            });
        }

        let night_count = nights.len() as u64;
        let extra_guests = u64::from(guests.saturating_sub(listing.base_guests));
        let extra_fee = listing
            .extra_guest_fee
            .saturating_mul(extra_guests)
            .saturating_mul(night_count);
        let total = nightly_total
            .saturating_add(listing.cleaning_fee)
            .saturating_add(extra_fee);

        Ok(Resolution {
            nights,
            all_available,
            cleaning_fee: listing.cleaning_fee,
            total,
        })
    }

    async fn get_listing(&self, listing_id: ListingId) -> Result<Listing> {
        self.listings
            .get(listing_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "listing",
                id: listing_id.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::calendar::{BlockedPeriod, MockCalendarFetcher};
    use crate::repo::MemoryStore;
    use crate::types::{
        Booking, CancellationPolicy, ListingId, PaymentMethod, UserId,
    };
    use chrono::Utc;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        fetcher: Arc<MockCalendarFetcher>,
        resolver: AvailabilityResolver,
        listing: Listing,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(MockCalendarFetcher::new());
        let cache = Arc::new(ExternalCalendarCache::new(
            fetcher.clone(),
            Duration::from_secs(600),
        ));
        let listing = Listing {
            id: ListingId::new(),
            host_id: UserId::new(),
            name: "Test cabin".to_string(),
            price_per_night: Money::from_minor(100_000),
            seasonal_percents: [100; 12],
            cleaning_fee: Money::from_minor(30_000),
            base_guests: 2,
            extra_guest_fee: Money::from_minor(10_000),
            cancellation_policy: CancellationPolicy::Flexible,
            calendar_sources: vec!["https://feed.example/cal.ics".to_string()],
        };
        store.put_listing(listing.clone());
        let aggregator = BlockedDateAggregator::new(store.clone(), store.clone(), cache);
        let resolver = AvailabilityResolver::new(store.clone(), aggregator);
        Fixture {
            store,
            fetcher,
            resolver,
            listing,
        }
    }

    fn seed_booking(fx: &Fixture, check_in: NaiveDate, check_out: NaiveDate) -> Booking {
        let booking = Booking::new(
            fx.listing.id,
            UserId::new(),
            check_in,
            check_out,
            2,
            Money::from_minor(100_000),
            PaymentMethod::Immediate,
            Utc::now(),
        );
        fx.store.put_booking(booking.clone());
        booking
    }

    #[tokio::test]
    async fn rejects_inverted_and_empty_ranges() {
        let fx = fixture();
        for (ci, co) in [
            (date(2026, 3, 12), date(2026, 3, 10)),
            (date(2026, 3, 10), date(2026, 3, 10)),
        ] {
            let err = fx.resolver.resolve(fx.listing.id, ci, co, 2).await.unwrap_err();
            assert!(matches!(err, Error::InvalidRange));
        }
    }

    #[tokio::test]
    async fn unknown_listing_is_not_found() {
        let fx = fixture();
        let err = fx
            .resolver
            .resolve(ListingId::new(), date(2026, 3, 10), date(2026, 3, 12), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn internal_booking_blocks_its_nights_but_not_its_checkout() {
        let fx = fixture();
        seed_booking(&fx, date(2026, 3, 10), date(2026, 3, 13));

        // Overlapping request: blocked.
        let overlapping = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 3, 12), date(2026, 3, 14), 2)
            .await
            .unwrap();
        assert!(!overlapping.all_available);

        // Same-day turnover: check-in on the prior stay's checkout date.
        let turnover = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 3, 13), date(2026, 3, 15), 2)
            .await
            .unwrap();
        assert!(turnover.all_available);
    }

    #[tokio::test]
    async fn checkout_only_does_not_exempt_mid_stay_nights() {
        let fx = fixture();
        seed_booking(&fx, date(2026, 3, 10), date(2026, 3, 13));

        // The 13th is checkout-only; as a mid-stay night it stays blocked.
        let resolution = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 3, 12), date(2026, 3, 15), 2)
            .await
            .unwrap();
        let thirteenth = resolution
            .nights
            .iter()
            .find(|n| n.date == date(2026, 3, 13))
            .unwrap();
        assert!(!thirteenth.available);
    }

    #[tokio::test]
    async fn external_feed_blocks_regardless_of_internal_state() {
        let fx = fixture();
        fx.fetcher.succeed_with(
            "https://feed.example/cal.ics",
            vec![BlockedPeriod {
                start: date(2026, 5, 1),
                end: date(2026, 5, 3),
            }],
        );
        let resolution = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 5, 1), date(2026, 5, 2), 2)
            .await
            .unwrap();
        assert!(!resolution.all_available);
    }

    #[tokio::test]
    async fn dead_feed_degrades_to_available() {
        let fx = fixture();
        fx.fetcher.fail_with("https://feed.example/cal.ics", "timeout");
        let resolution = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 5, 1), date(2026, 5, 2), 2)
            .await
            .unwrap();
        assert!(resolution.all_available);
    }

    #[tokio::test]
    async fn override_blocks_and_reprices_dates() {
        let fx = fixture();
        fx.store.put_override(DateOverride {
            listing_id: fx.listing.id,
            date: date(2026, 3, 11),
            price_per_night: Some(Money::from_minor(150_000)),
            available: true,
        });
        fx.store.put_override(DateOverride {
            listing_id: fx.listing.id,
            date: date(2026, 3, 12),
            price_per_night: None,
            available: false,
        });

        let resolution = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 3, 10), date(2026, 3, 13), 2)
            .await
            .unwrap();
        assert!(!resolution.all_available);
        assert_eq!(resolution.nights[1].price, Money::from_minor(150_000));
        assert!(!resolution.nights[2].available);
    }

    #[tokio::test]
    async fn seasonal_factor_applies_per_month() {
        let fx = fixture();
        let mut listing = fx.listing.clone();
        listing.seasonal_percents[6] = 150; // July
        fx.store.put_listing(listing);

        let resolution = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 6, 30), date(2026, 7, 2), 2)
            .await
            .unwrap();
        assert_eq!(resolution.nights[0].price, Money::from_minor(100_000));
        assert_eq!(resolution.nights[1].price, Money::from_minor(150_000));
    }

    #[tokio::test]
    async fn total_adds_cleaning_and_extra_guest_fees() {
        let fx = fixture();
        // 2 nights × 100 000, cleaning 30 000, 2 extra guests × 10 000 × 2 nights.
        let resolution = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 3, 10), date(2026, 3, 12), 4)
            .await
            .unwrap();
        assert_eq!(resolution.total, Money::from_minor(270_000));

        // At or below base guests, no extra fee.
        let base = fx
            .resolver
            .resolve(fx.listing.id, date(2026, 3, 10), date(2026, 3, 12), 2)
            .await
            .unwrap();
        assert_eq!(base.total, Money::from_minor(230_000));
    }

    #[tokio::test]
    async fn blocked_dates_reports_checkout_only_separately() {
        let fx = fixture();
        seed_booking(&fx, date(2026, 3, 10), date(2026, 3, 13));
        let blocked = fx
            .resolver
            .blocked_dates(fx.listing.id, date(2026, 3, 1), date(2026, 4, 1))
            .await
            .unwrap();
        assert!(blocked.blocked.contains(&date(2026, 3, 10)));
        assert!(blocked.blocked.contains(&date(2026, 3, 13)));
        assert!(blocked.checkout_only.contains(&date(2026, 3, 13)));
        assert!(!blocked.checkout_only.contains(&date(2026, 3, 12)));
    }

    #[tokio::test]
    async fn back_to_back_bookings_leave_no_checkout_only_gap() {
        let fx = fixture();
        seed_booking(&fx, date(2026, 3, 10), date(2026, 3, 13));
        seed_booking(&fx, date(2026, 3, 13), date(2026, 3, 15));
        let blocked = fx
            .resolver
            .blocked_dates(fx.listing.id, date(2026, 3, 1), date(2026, 4, 1))
            .await
            .unwrap();
        // The 13th is a checkout and an occupied night: blocked outright.
        assert!(blocked.blocked.contains(&date(2026, 3, 13)));
        assert!(!blocked.checkout_only.contains(&date(2026, 3, 13)));
        assert!(blocked.checkout_only.contains(&date(2026, 3, 15)));
    }
}
