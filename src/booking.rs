//! The booking ledger: every lifecycle transition in one place.
//!
//! All booking mutation funnels through [`BookingLedger`]. Each transition
//! re-reads the booking, decides the new `(status, payment_status)` pair plus
//! any payment-transaction row, and hands both to
//! [`BookingRepo::commit_transition`], which applies them atomically guarded
//! by a compare-and-swap on the pair it read. A lost race surfaces as
//! [`Error::Conflict`]; callers retry or re-read, they never write around the
//! ledger.
//!
//! Money rules enforced here:
//! - totals are frozen at creation from a server-side resolution; client
//!   prices are never trusted
//! - a guest cancellation refunds by policy tier; a host cancellation always
//!   refunds 100%, and the cancellation aborts if the refund cannot be issued
//! - billing keys are erased as soon as they are used or the booking is
//!   cancelled

use crate::availability::AvailabilityResolver;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::metrics;
use crate::notify::{self, Notification, Notifier};
use crate::payments::{GatewayStatus, PaymentOrchestrator};
use crate::refund;
use crate::repo::{BookingRepo, ListingRepo};
use crate::types::{
    Booking, BookingId, BookingStatus, DEFERRED_CHARGE_LEAD_DAYS, Listing, ListingId, Money,
    PaymentMethod, PaymentStatus, TransactionStatus, UserId,
};
use chrono::{Days, NaiveTime};
use std::sync::Arc;

/// Parameters for creating a booking. The request carries no price: the
/// total is resolved server-side.
#[derive(Clone, Debug)]
pub struct CreateBooking {
    /// Listing to reserve.
    pub listing_id: ListingId,
    /// Requesting guest.
    pub guest_id: UserId,
    /// First night.
    pub check_in: chrono::NaiveDate,
    /// Departure date (exclusive).
    pub check_out: chrono::NaiveDate,
    /// Party size.
    pub guests: u32,
    /// How the guest intends to pay.
    pub payment_method: PaymentMethod,
}

/// Result of a payment verification.
#[derive(Clone, Debug)]
pub struct VerifyOutcome {
    /// The booking after verification.
    pub booking: Booking,
    /// True when the booking was already paid and this call changed nothing.
    pub already_paid: bool,
}

/// Owns every booking state transition.
pub struct BookingLedger {
    listings: Arc<dyn ListingRepo>,
    bookings: Arc<dyn BookingRepo>,
    resolver: Arc<AvailabilityResolver>,
    payments: Arc<PaymentOrchestrator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl BookingLedger {
    /// Wires the ledger to its repositories and collaborators.
    #[must_use]
    pub fn new(
        listings: Arc<dyn ListingRepo>,
        bookings: Arc<dyn BookingRepo>,
        resolver: Arc<AvailabilityResolver>,
        payments: Arc<PaymentOrchestrator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            listings,
            bookings,
            resolver,
            payments,
            notifier,
            clock,
        }
    }

    /// Creates a pending booking with a server-resolved total.
    ///
    /// Availability is re-resolved here and the final word belongs to the
    /// store's atomic insert: two concurrent requests for overlapping nights
    /// both pass resolution at most rarely, but only one insert succeeds.
    pub async fn create(&self, request: CreateBooking) -> Result<Booking> {
        if request.check_in >= request.check_out {
            return Err(Error::InvalidRange);
        }
        if request.guests == 0 {
            return Err(Error::Validation("at least one guest is required".into()));
        }

        let resolution = self
            .resolver
            .resolve(
                request.listing_id,
                request.check_in,
                request.check_out,
                request.guests,
            )
            .await?;
        if !resolution.all_available {
            return Err(Error::Unavailable);
        }

        let booking = Booking::new(
            request.listing_id,
            request.guest_id,
            request.check_in,
            request.check_out,
            request.guests,
            resolution.total,
            request.payment_method,
            self.clock.now(),
        );
        self.bookings.insert_booking(&booking).await?;

        metrics::booking("created");
        tracing::info!(
            booking_id = %booking.id,
            listing_id = %booking.listing_id,
            total_minor = booking.total_price.minor(),
            "booking created"
        );
        notify::dispatch(
            &self.notifier,
            Notification::BookingRequested {
                booking: booking.clone(),
            },
        );
        Ok(booking)
    }

    /// Fetches a booking, visible only to its guest or the listing's host.
    pub async fn get(&self, actor: UserId, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        if booking.guest_id != actor {
            let listing = self.listing_of(&booking).await?;
            if listing.host_id != actor {
                return Err(Error::Forbidden("not a party to this booking"));
            }
        }
        Ok(booking)
    }

    /// Host accepts a pending booking request.
    pub async fn host_accept(&self, host_id: UserId, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        let listing = self.listing_of(&booking).await?;
        if listing.host_id != host_id {
            return Err(Error::Forbidden("only the host may accept"));
        }
        if booking.is_cancelled() {
            return Err(Error::AlreadyCancelled);
        }
        if booking.status != BookingStatus::Pending {
            return Err(Error::Validation("booking is not awaiting approval".into()));
        }

        let expected = (booking.status, booking.payment_status);
        let mut updated = booking;
        updated.status = BookingStatus::Confirmed;
        self.bookings
            .commit_transition(&updated, expected, None)
            .await?;

        metrics::booking("confirmed");
        notify::dispatch(
            &self.notifier,
            Notification::BookingConfirmed {
                booking: updated.clone(),
            },
        );
        Ok(updated)
    }

    /// Host rejects or cancels a booking.
    ///
    /// The guest is made whole unconditionally: if any money was captured it
    /// is refunded in full before the state flips, and a refund failure
    /// aborts the whole cancellation.
    pub async fn host_cancel(&self, host_id: UserId, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        let listing = self.listing_of(&booking).await?;
        if listing.host_id != host_id {
            return Err(Error::Forbidden("only the host may cancel"));
        }
        if booking.is_cancelled() {
            return Err(Error::AlreadyCancelled);
        }

        let now = self.clock.now();
        let expected = (booking.status, booking.payment_status);
        let mut updated = booking.clone();
        updated.status = BookingStatus::Cancelled;

        let mut transaction = None;
        let mut refunded = Money::ZERO;
        if booking.payment_status == PaymentStatus::Paid {
            let payment_id = self.paid_payment_id(&booking).await?;
            let record = self
                .payments
                .refund(&payment_id, "host cancellation", None)
                .await?;
            transaction = Some(PaymentOrchestrator::transaction(
                booking.id,
                &record,
                TransactionStatus::Refunded,
                now,
            ));
            updated.payment_status = PaymentStatus::Refunded;
            refunded = booking.total_price;
        } else if let Some(key) = &booking.billing_key {
            // No money captured yet: revoke the stored key best-effort and
            // always erase it locally.
            if let Err(err) = self.payments.revoke_token(key).await {
                tracing::warn!(booking_id = %booking.id, error = %err, "billing key revocation failed");
            }
        }
        updated.billing_key = None;
        updated.scheduled_payment_date = None;

        self.bookings
            .commit_transition(&updated, expected, transaction.as_ref())
            .await?;

        metrics::booking("cancelled");
        if !refunded.is_zero() {
            metrics::payment("refunded");
            metrics::refund_issued(refunded.minor());
        }
        tracing::info!(
            booking_id = %updated.id,
            refund_minor = refunded.minor(),
            "booking cancelled by host"
        );
        notify::dispatch(
            &self.notifier,
            Notification::BookingCancelled {
                booking: updated.clone(),
                refund: refunded,
            },
        );
        Ok(updated)
    }

    /// Guest cancels their own booking; the refund follows the listing's
    /// policy tiers.
    pub async fn guest_cancel(&self, guest_id: UserId, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        if booking.guest_id != guest_id {
            return Err(Error::Forbidden("only the guest may cancel"));
        }
        if booking.is_cancelled() {
            return Err(Error::AlreadyCancelled);
        }
        let now = self.clock.now();
        if now.date_naive() > booking.check_in {
            return Err(Error::TooLateToCancel);
        }
        let listing = self.listing_of(&booking).await?;

        let expected = (booking.status, booking.payment_status);
        let mut updated = booking.clone();
        updated.status = BookingStatus::Cancelled;

        let mut transaction = None;
        let mut refunded = Money::ZERO;
        if booking.payment_status == PaymentStatus::Paid {
            let refund = refund::calculate(
                listing.cancellation_policy,
                booking.total_price,
                booking.check_in,
                now,
                booking.created_at,
            );
            if !refund.amount.is_zero() {
                let payment_id = self.paid_payment_id(&booking).await?;
                let record = self
                    .payments
                    .refund(&payment_id, refund.description, Some(refund.amount))
                    .await?;
                transaction = Some(PaymentOrchestrator::transaction(
                    booking.id,
                    &record,
                    TransactionStatus::Refunded,
                    now,
                ));
                updated.payment_status = PaymentStatus::Refunded;
                refunded = refund.amount;
            }
            // A zero-refund cancellation keeps the captured payment as is.
        } else if let Some(key) = &booking.billing_key {
            if let Err(err) = self.payments.revoke_token(key).await {
                tracing::warn!(booking_id = %booking.id, error = %err, "billing key revocation failed");
            }
        }
        updated.billing_key = None;
        updated.scheduled_payment_date = None;

        self.bookings
            .commit_transition(&updated, expected, transaction.as_ref())
            .await?;

        metrics::booking("cancelled");
        if !refunded.is_zero() {
            metrics::payment("refunded");
            metrics::refund_issued(refunded.minor());
        }
        tracing::info!(
            booking_id = %updated.id,
            refund_minor = refunded.minor(),
            "booking cancelled by guest"
        );
        notify::dispatch(
            &self.notifier,
            Notification::BookingCancelled {
                booking: updated.clone(),
                refund: refunded,
            },
        );
        Ok(updated)
    }

    /// Verifies a payment against the gateway and settles the booking.
    ///
    /// Idempotent: an already-paid booking is a successful no-op, so client
    /// retries and gateway webhooks may both call this for the same payment.
    /// The gateway's reported amount must equal the frozen total; a mismatch
    /// is recorded as a failed transaction and rejected. Settling a booking
    /// that still holds a billing key erases the key, since the scheduled
    /// charge no longer has anything to collect.
    pub async fn verify_payment(&self, id: BookingId, payment_id: &str) -> Result<VerifyOutcome> {
        let booking = self.load(id).await?;
        if booking.is_cancelled() {
            return Err(Error::AlreadyCancelled);
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Ok(VerifyOutcome {
                booking,
                already_paid: true,
            });
        }

        let record = self.payments.verify(payment_id).await?;
        let now = self.clock.now();
        let expected = (booking.status, booking.payment_status);

        if record.status != GatewayStatus::Paid {
            return Err(Error::Validation(format!(
                "payment {payment_id} is not completed"
            )));
        }
        if record.amount != booking.total_price {
            // Record what the gateway said without settling anything.
            let failed = PaymentOrchestrator::transaction(
                booking.id,
                &record,
                TransactionStatus::Failed,
                now,
            );
            self.bookings
                .commit_transition(&booking, expected, Some(&failed))
                .await?;
            metrics::payment("failed");
            return Err(Error::AmountMismatch {
                expected: booking.total_price,
                reported: record.amount,
            });
        }

        let mut updated = booking.clone();
        updated.payment_status = PaymentStatus::Paid;
        if updated.status == BookingStatus::Pending {
            updated.status = BookingStatus::Confirmed;
        }
        updated.billing_key = None;
        updated.scheduled_payment_date = None;
        let paid =
            PaymentOrchestrator::transaction(booking.id, &record, TransactionStatus::Paid, now);

        match self
            .bookings
            .commit_transition(&updated, expected, Some(&paid))
            .await
        {
            Ok(()) => {}
            Err(Error::Conflict) => {
                // Lost a race; if the winner settled the payment this call
                // is a duplicate and succeeds as a no-op.
                let current = self.load(id).await?;
                if current.payment_status == PaymentStatus::Paid {
                    return Ok(VerifyOutcome {
                        booking: current,
                        already_paid: true,
                    });
                }
                return Err(Error::Conflict);
            }
            Err(err) => return Err(err),
        }

        if let Some(key) = &booking.billing_key {
            // The key is already gone locally; gateway-side revocation is
            // best-effort.
            if let Err(err) = self.payments.revoke_token(key).await {
                tracing::warn!(booking_id = %booking.id, error = %err, "billing key revocation failed");
            }
        }

        metrics::payment("paid");
        tracing::info!(booking_id = %updated.id, payment_id, "payment verified");
        notify::dispatch(
            &self.notifier,
            Notification::PaymentCompleted {
                booking: updated.clone(),
            },
        );
        Ok(VerifyOutcome {
            booking: updated,
            already_paid: false,
        })
    }

    /// Stores a billing key for a later automatic charge and confirms the
    /// booking.
    ///
    /// The charge is scheduled for midnight UTC of the day
    /// [`DEFERRED_CHARGE_LEAD_DAYS`] before check-in; a past-due schedule is
    /// simply picked up by the next scheduler pass.
    pub async fn register_billing_key(
        &self,
        guest_id: UserId,
        id: BookingId,
        billing_key: String,
    ) -> Result<Booking> {
        if billing_key.trim().is_empty() {
            return Err(Error::Validation("billing key must not be empty".into()));
        }
        let booking = self.load(id).await?;
        if booking.guest_id != guest_id {
            return Err(Error::Forbidden("only the guest may register a billing key"));
        }
        if booking.is_cancelled() {
            return Err(Error::AlreadyCancelled);
        }
        match booking.payment_status {
            PaymentStatus::Pending => {}
            PaymentStatus::Paid => return Err(Error::AlreadyPaid),
            _ => {
                return Err(Error::Validation(
                    "billing key can only be registered while payment is pending".into(),
                ));
            }
        }

        let due_date = booking
            .check_in
            .checked_sub_days(Days::new(DEFERRED_CHARGE_LEAD_DAYS))
            .unwrap_or(booking.check_in);
        let scheduled = due_date.and_time(NaiveTime::MIN).and_utc();

        let expected = (booking.status, booking.payment_status);
        let mut updated = booking;
        updated.payment_method = PaymentMethod::Deferred;
        updated.billing_key = Some(billing_key);
        updated.scheduled_payment_date = Some(scheduled);
        updated.status = BookingStatus::Confirmed;
        self.bookings
            .commit_transition(&updated, expected, None)
            .await?;

        metrics::booking("confirmed");
        tracing::info!(
            booking_id = %updated.id,
            scheduled = %scheduled,
            "billing key registered"
        );
        notify::dispatch(
            &self.notifier,
            Notification::BookingConfirmed {
                booking: updated.clone(),
            },
        );
        Ok(updated)
    }

    /// Charges one due deferred booking. Called by the scheduler.
    ///
    /// A decline is a committed outcome: a failed transaction is appended and
    /// the payment flips to `Failed` for manual follow-up. A gateway that
    /// does not answer commits nothing, so the booking stays due and the next
    /// pass retries.
    pub async fn charge_deferred(&self, id: BookingId) -> Result<()> {
        let booking = self.load(id).await?;
        let Some(key) = booking.billing_key.clone() else {
            return Ok(());
        };
        if booking.is_cancelled() || booking.payment_status != PaymentStatus::Pending {
            // Already handled by a concurrent transition.
            return Ok(());
        }

        let record = self
            .payments
            .charge_by_token(&key, booking.total_price, &booking.id.to_string())
            .await?;
        let now = self.clock.now();
        let expected = (booking.status, booking.payment_status);
        let mut updated = booking.clone();

        if record.status == GatewayStatus::Paid {
            let paid =
                PaymentOrchestrator::transaction(booking.id, &record, TransactionStatus::Paid, now);
            updated.payment_status = PaymentStatus::Paid;
            updated.billing_key = None;
            updated.scheduled_payment_date = None;
            self.bookings
                .commit_transition(&updated, expected, Some(&paid))
                .await?;
            metrics::payment("paid");
            metrics::deferred_charge("success");
            tracing::info!(booking_id = %updated.id, "deferred charge captured");
            notify::dispatch(
                &self.notifier,
                Notification::PaymentCompleted { booking: updated },
            );
        } else {
            // Declined. The key is kept so a retry after manual follow-up is
            // possible.
            let failed = PaymentOrchestrator::transaction(
                booking.id,
                &record,
                TransactionStatus::Failed,
                now,
            );
            updated.payment_status = PaymentStatus::Failed;
            self.bookings
                .commit_transition(&updated, expected, Some(&failed))
                .await?;
            metrics::payment("failed");
            metrics::deferred_charge("declined");
            tracing::warn!(booking_id = %updated.id, "deferred charge declined");
            notify::dispatch(
                &self.notifier,
                Notification::PaymentFailed { booking: updated },
            );
        }
        Ok(())
    }

    /// Deferred bookings due at `now`, for the scheduler.
    pub async fn due_deferred(&self) -> Result<Vec<Booking>> {
        self.bookings.due_deferred(self.clock.now()).await
    }

    async fn load(&self, id: BookingId) -> Result<Booking> {
        self.bookings.get(id).await?.ok_or_else(|| Error::NotFound {
            resource: "booking",
            id: id.to_string(),
        })
    }

    async fn listing_of(&self, booking: &Booking) -> Result<Listing> {
        self.listings
            .get(booking.listing_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "listing",
                id: booking.listing_id.to_string(),
            })
    }

    /// Gateway payment id of the captured charge, from the most recent paid
    /// ledger row.
    async fn paid_payment_id(&self, booking: &Booking) -> Result<String> {
        self.bookings
            .transactions(booking.id)
            .await?
            .into_iter()
            .rev()
            .find(|t| t.status == TransactionStatus::Paid)
            .map(|t| t.payment_id)
            .ok_or_else(|| {
                Error::Internal(anyhow::anyhow!(
                    "booking {} is marked paid but has no paid transaction",
                    booking.id
                ))
            })
    }
}
