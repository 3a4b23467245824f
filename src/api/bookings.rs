//! Booking lifecycle endpoints.
//!
//! Every handler delegates to the booking ledger; no handler touches booking
//! state directly. Create requests carry no price, only dates and party
//! size.

use super::Actor;
use crate::booking::CreateBooking;
use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{Booking, BookingId, ListingId, PaymentMethod};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Booking representation returned by the API. Billing keys never leave the
/// service.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    /// Booking identifier.
    pub id: Uuid,
    /// Listing being reserved.
    pub listing_id: Uuid,
    /// Guest who created the booking.
    pub guest_id: Uuid,
    /// First night.
    pub check_in: NaiveDate,
    /// Departure date (exclusive).
    pub check_out: NaiveDate,
    /// Party size.
    pub guests: u32,
    /// Total frozen at creation, in minor units.
    pub total_price: u64,
    /// Reservation status.
    pub status: &'static str,
    /// Payment status.
    pub payment_status: &'static str,
    /// Payment method.
    pub payment_method: &'static str,
    /// When the deferred charge is due, if scheduled.
    pub scheduled_payment_date: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: *booking.id.as_uuid(),
            listing_id: *booking.listing_id.as_uuid(),
            guest_id: *booking.guest_id.as_uuid(),
            check_in: booking.check_in,
            check_out: booking.check_out,
            guests: booking.guests,
            total_price: booking.total_price.minor(),
            status: booking.status.as_str(),
            payment_status: booking.payment_status.as_str(),
            payment_method: booking.payment_method.as_str(),
            scheduled_payment_date: booking.scheduled_payment_date,
            created_at: booking.created_at,
        }
    }
}

/// Request body for creating a booking.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Listing to reserve.
    pub listing_id: Uuid,
    /// First night.
    pub check_in: NaiveDate,
    /// Departure date (exclusive).
    pub check_out: NaiveDate,
    /// Party size.
    pub guests: u32,
    /// How the guest intends to pay; defaults to an immediate charge.
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Immediate
}

/// POST /api/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Actor(guest_id): Actor,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>)> {
    let booking = state
        .ledger
        .create(CreateBooking {
            listing_id: ListingId::from_uuid(request.listing_id),
            guest_id,
            check_in: request.check_in,
            check_out: request.check_out,
            guests: request.guests,
            payment_method: request.payment_method,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>> {
    let booking = state.ledger.get(actor, BookingId::from_uuid(id)).await?;
    Ok(Json(booking.into()))
}

/// POST /api/bookings/:id/accept
pub async fn accept_booking(
    State(state): State<AppState>,
    Actor(host_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .ledger
        .host_accept(host_id, BookingId::from_uuid(id))
        .await?;
    Ok(Json(booking.into()))
}

/// POST /api/bookings/:id/reject
///
/// A rejection is a host cancellation: any captured payment is refunded in
/// full before the booking flips.
pub async fn reject_booking(
    State(state): State<AppState>,
    Actor(host_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .ledger
        .host_cancel(host_id, BookingId::from_uuid(id))
        .await?;
    Ok(Json(booking.into()))
}

/// POST /api/bookings/:id/cancel
///
/// Dispatches on who is calling: the guest gets the policy-tiered refund,
/// the host triggers the unconditional full refund.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>> {
    let booking_id = BookingId::from_uuid(id);
    let booking = state.ledger.get(actor, booking_id).await?;
    let updated = if booking.guest_id == actor {
        state.ledger.guest_cancel(actor, booking_id).await?
    } else {
        state.ledger.host_cancel(actor, booking_id).await?
    };
    Ok(Json(updated.into()))
}

/// Request body for a payment verification.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    /// Gateway-side payment identifier to verify.
    pub payment_id: String,
}

/// Response for a payment verification.
#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    /// The booking after verification.
    pub booking: BookingResponse,
    /// True when the booking was already paid and this call was a no-op.
    pub already_paid: bool,
}

/// POST /api/bookings/:id/payments/verify
///
/// Idempotent; safe to retry and safe to race with the gateway webhook.
pub async fn verify_payment(
    State(state): State<AppState>,
    Actor(_actor): Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>> {
    let outcome = state
        .ledger
        .verify_payment(BookingId::from_uuid(id), &request.payment_id)
        .await?;
    Ok(Json(VerifyPaymentResponse {
        booking: outcome.booking.into(),
        already_paid: outcome.already_paid,
    }))
}

/// Request body for registering a billing key.
#[derive(Debug, Deserialize)]
pub struct RegisterBillingKeyRequest {
    /// Opaque charge token issued by the gateway.
    pub billing_key: String,
}

/// POST /api/bookings/:id/billing-key
pub async fn register_billing_key(
    State(state): State<AppState>,
    Actor(guest_id): Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<RegisterBillingKeyRequest>,
) -> Result<Json<BookingResponse>> {
    let booking = state
        .ledger
        .register_billing_key(guest_id, BookingId::from_uuid(id), request.billing_key)
        .await?;
    Ok(Json(booking.into()))
}
