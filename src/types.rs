//! Domain types for the lodging reservation engine.
//!
//! Value objects (identifiers, `Money`), the listing/booking entities, and the
//! status enums that make up the booking lifecycle. A booking spans the
//! half-open night range `[check_in, check_out)`; the check-out date is a
//! boundary, not a night.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner `Uuid`.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a listing.
    ListingId
);
uuid_id!(
    /// Unique identifier for a booking.
    BookingId
);
uuid_id!(
    /// Unique identifier for a user (host or guest).
    UserId
);

// ============================================================================
// Money (minor currency units, integer arithmetic only)
// ============================================================================

/// Monetary amount in minor currency units to avoid floating-point errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units.
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checks whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, saturating at `u64::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Multiplies by a count, saturating at `u64::MAX`.
    #[must_use]
    pub const fn saturating_mul(self, count: u64) -> Self {
        Self(self.0.saturating_mul(count))
    }

    /// Applies a percentage (e.g. seasonal factor of `120` = 1.2x), rounding down.
    #[must_use]
    pub const fn apply_percent(self, percent: u16) -> Self {
        Self(self.0.saturating_mul(percent as u64) / 100)
    }

    /// Applies a basis-point rate (10 000 = 100%), rounding down.
    #[must_use]
    pub const fn apply_basis_points(self, bp: u32) -> Self {
        Self(self.0.saturating_mul(bp as u64) / 10_000)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Listing
// ============================================================================

/// Cancellation policy attached to a listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Full refund until one day before check-in.
    Flexible,
    /// Full refund until five days before, half until one day before.
    Moderate,
    /// Full refund only within 48h of booking (and 14+ days out), half until
    /// seven days before.
    Strict,
}

impl CancellationPolicy {
    /// Stable string form used in storage and APIs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flexible => "flexible",
            Self::Moderate => "moderate",
            Self::Strict => "strict",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flexible" => Some(Self::Flexible),
            "moderate" => Some(Self::Moderate),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

/// A bookable listing with its pricing configuration.
///
/// `seasonal_percents` holds one percentage per calendar month (index 0 =
/// January, `100` = no adjustment). External calendar feeds are a typed list
/// of URLs, validated at write time, rather than an ad-hoc serialized string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Unique listing identifier.
    pub id: ListingId,
    /// Owning host.
    pub host_id: UserId,
    /// Display name.
    pub name: String,
    /// Base nightly price before seasonal adjustment.
    pub price_per_night: Money,
    /// Monthly seasonal multipliers in percent, January first.
    pub seasonal_percents: [u16; 12],
    /// Flat cleaning fee added to every stay.
    pub cleaning_fee: Money,
    /// Guest count included in the base price.
    pub base_guests: u32,
    /// Per-night fee for each guest above `base_guests`.
    pub extra_guest_fee: Money,
    /// Refund policy for guest cancellations.
    pub cancellation_policy: CancellationPolicy,
    /// External calendar feed URLs imported from other booking channels.
    pub calendar_sources: Vec<String>,
}

impl Listing {
    /// Seasonal percentage for a given night.
    #[must_use]
    pub fn seasonal_percent_for(&self, date: NaiveDate) -> u16 {
        use chrono::Datelike;
        self.seasonal_percents[date.month0() as usize]
    }
}

/// Host-entered per-date override for a listing.
///
/// Absence of an override for a date means "use listing defaults".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    /// Listing this override belongs to.
    pub listing_id: ListingId,
    /// Calendar date the override applies to.
    pub date: NaiveDate,
    /// Nightly price override; `None` means use the computed base price.
    pub price_per_night: Option<Money>,
    /// Whether the date may be booked.
    pub available: bool,
}

// ============================================================================
// Booking
// ============================================================================

/// Reservation lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Awaiting host approval.
    Pending,
    /// Approved by the host.
    Confirmed,
    /// Terminal; never leaves this state.
    Cancelled,
}

impl BookingStatus {
    /// Stable string form used in storage and APIs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Payment axis of the booking lifecycle, denormalized from the transaction
/// ledger for fast reads. Only [`crate::repo::BookingRepo::commit_transition`]
/// may write it, so it cannot drift from the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No successful charge yet.
    Pending,
    /// Charge captured for the full frozen total.
    Paid,
    /// A charge attempt was declined; manual follow-up required.
    Failed,
    /// Charge returned to the guest.
    Refunded,
}

impl PaymentStatus {
    /// Stable string form used in storage and APIs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// How the guest pays for the stay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card charge captured at booking time.
    Immediate,
    /// Bank-transfer-style voucher; confirmed via gateway notification.
    VirtualAccount,
    /// Stored billing key charged seven days before check-in.
    Deferred,
}

impl PaymentMethod {
    /// Stable string form used in storage and APIs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::VirtualAccount => "virtual_account",
            Self::Deferred => "deferred",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "immediate" => Some(Self::Immediate),
            "virtual_account" => Some(Self::VirtualAccount),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }
}

/// Days before check-in at which a deferred booking is charged.
pub const DEFERRED_CHARGE_LEAD_DAYS: u64 = 7;

/// A guest's reservation of a listing for `[check_in, check_out)`.
///
/// `total_price` is frozen at creation from a server-side availability
/// resolution and never recomputed. All mutation goes through the booking
/// ledger's transitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier.
    pub id: BookingId,
    /// Listing being reserved.
    pub listing_id: ListingId,
    /// Guest who created the booking.
    pub guest_id: UserId,
    /// First night of the stay.
    pub check_in: NaiveDate,
    /// Departure date (exclusive; not a night of the stay).
    pub check_out: NaiveDate,
    /// Party size.
    pub guests: u32,
    /// Total frozen at creation time.
    pub total_price: Money,
    /// Reservation lifecycle status.
    pub status: BookingStatus,
    /// Payment lifecycle status.
    pub payment_status: PaymentStatus,
    /// How the guest pays.
    pub payment_method: PaymentMethod,
    /// Opaque charge token for deferred payment; erased once used or cancelled.
    pub billing_key: Option<String>,
    /// When the deferred charge becomes due (midnight, UTC).
    pub scheduled_payment_date: Option<DateTime<Utc>>,
    /// Creation instant; anchors the strict policy's 48-hour grace window.
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a pending, unpaid booking with the given frozen total.
    #[must_use]
    pub fn new(
        listing_id: ListingId,
        guest_id: UserId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
        total_price: Money,
        payment_method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            listing_id,
            guest_id,
            check_in,
            check_out,
            guests,
            total_price,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method,
            billing_key: None,
            scheduled_payment_date: None,
            created_at,
        }
    }

    /// Number of nights in the stay.
    #[must_use]
    pub fn night_count(&self) -> u64 {
        u64::try_from((self.check_out - self.check_in).num_days()).unwrap_or(0)
    }

    /// Iterates the nights `[check_in, check_out)`.
    pub fn nights(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        date_range(self.check_in, self.check_out)
    }

    /// Whether the booking holds any night in `[from, to)`.
    #[must_use]
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.check_in < to && from < self.check_out
    }

    /// Whether the booking is in the terminal cancelled state.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, BookingStatus::Cancelled)
    }
}

/// Iterates every date in the half-open range `[from, to)`.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(from), |d| d.checked_add_days(Days::new(1)))
        .take_while(move |d| *d < to)
}

// ============================================================================
// Payment transactions
// ============================================================================

/// Outcome recorded in the append-only payment ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Charge captured.
    Paid,
    /// Charge attempted and declined, or amount mismatch detected.
    Failed,
    /// Funds returned to the guest.
    Refunded,
    /// Gateway-side cancellation of an uncaptured payment.
    Cancelled,
}

impl TransactionStatus {
    /// Stable string form used in storage and APIs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Append-only record of one gateway answer. Rows are never updated or
/// deleted; the booking's `payment_status` is always derivable from the most
/// recent row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Row identifier.
    pub id: Uuid,
    /// Booking this transaction belongs to.
    pub booking_id: BookingId,
    /// Gateway-side payment identifier.
    pub payment_id: String,
    /// Amount the gateway reported.
    pub amount: Money,
    /// Gateway outcome.
    pub status: TransactionStatus,
    /// Raw gateway payload, kept verbatim for audits.
    pub payload: serde_json::Value,
    /// When the gateway answer was recorded.
    pub verified_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Builds a new ledger row for a booking.
    #[must_use]
    pub fn record(
        booking_id: BookingId,
        payment_id: impl Into<String>,
        amount: Money,
        status: TransactionStatus,
        payload: serde_json::Value,
        verified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            payment_id: payment_id.into(),
            amount,
            status,
            payload,
            verified_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_range_is_half_open() {
        let nights: Vec<_> = date_range(date(2026, 3, 10), date(2026, 3, 13)).collect();
        assert_eq!(
            nights,
            vec![date(2026, 3, 10), date(2026, 3, 11), date(2026, 3, 12)]
        );
    }

    #[test]
    fn date_range_empty_when_inverted() {
        assert_eq!(date_range(date(2026, 3, 13), date(2026, 3, 10)).count(), 0);
    }

    #[test]
    fn booking_overlap_excludes_checkout_boundary() {
        let booking = Booking::new(
            ListingId::new(),
            UserId::new(),
            date(2026, 3, 10),
            date(2026, 3, 13),
            2,
            Money::from_minor(100_000),
            PaymentMethod::Immediate,
            Utc::now(),
        );
        // Back-to-back stay starting on the checkout date does not overlap.
        assert!(!booking.overlaps(date(2026, 3, 13), date(2026, 3, 15)));
        assert!(booking.overlaps(date(2026, 3, 12), date(2026, 3, 14)));
        assert_eq!(booking.night_count(), 3);
    }

    #[test]
    fn money_percent_and_basis_points_round_down() {
        assert_eq!(Money::from_minor(85_000).apply_percent(120).minor(), 102_000);
        assert_eq!(Money::from_minor(85_001).apply_basis_points(5_000).minor(), 42_500);
        assert_eq!(Money::from_minor(85_000).apply_basis_points(0).minor(), 0);
    }
}
