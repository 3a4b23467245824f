//! Listing read endpoints: availability, blocked dates, calendar export.

use crate::calendar::export_ical;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{ListingId, Money};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters for an availability resolution.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// First night of the requested stay.
    pub check_in: NaiveDate,
    /// Departure date (exclusive).
    pub check_out: NaiveDate,
    /// Party size; defaults to one.
    #[serde(default = "default_guests")]
    pub guests: u32,
}

fn default_guests() -> u32 {
    1
}

/// Response for an availability resolution.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Listing identifier.
    pub listing_id: Uuid,
    /// Per-night price and availability.
    pub nights: Vec<crate::availability::NightQuote>,
    /// Whether every requested night is free.
    pub all_available: bool,
    /// Flat cleaning fee included in the total.
    pub cleaning_fee: Money,
    /// Server-resolved total for the stay.
    pub total: Money,
}

/// GET /api/listings/:id/availability
///
/// Resolves price and availability for every night of `[check_in,
/// check_out)`. Public; the returned total is advisory and re-resolved at
/// booking time.
pub async fn get_availability(
    Path(listing_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
    State(state): State<AppState>,
) -> Result<Json<AvailabilityResponse>> {
    let resolution = state
        .resolver
        .resolve(
            ListingId::from_uuid(listing_id),
            query.check_in,
            query.check_out,
            query.guests,
        )
        .await?;
    Ok(Json(AvailabilityResponse {
        listing_id,
        nights: resolution.nights,
        all_available: resolution.all_available,
        cleaning_fee: resolution.cleaning_fee,
        total: resolution.total,
    }))
}

/// Query parameters for a blocked-date listing.
#[derive(Debug, Deserialize)]
pub struct BlockedDatesQuery {
    /// Start of the range (inclusive).
    pub from: NaiveDate,
    /// End of the range (exclusive).
    pub to: NaiveDate,
}

/// Response for a blocked-date query.
#[derive(Debug, Serialize)]
pub struct BlockedDatesResponse {
    /// Listing identifier.
    pub listing_id: Uuid,
    /// Every date that cannot start a night, in ascending order.
    pub blocked: Vec<NaiveDate>,
    /// Subset of `blocked` that is only a checkout boundary and still valid
    /// as a new stay's check-in date.
    pub checkout_only: Vec<NaiveDate>,
}

/// GET /api/listings/:id/blocked-dates
///
/// Merged view of internal bookings, host overrides, and external feeds over
/// `[from, to)`.
pub async fn get_blocked_dates(
    Path(listing_id): Path<Uuid>,
    Query(query): Query<BlockedDatesQuery>,
    State(state): State<AppState>,
) -> Result<Json<BlockedDatesResponse>> {
    let blocked = state
        .resolver
        .blocked_dates(ListingId::from_uuid(listing_id), query.from, query.to)
        .await?;
    Ok(Json(BlockedDatesResponse {
        listing_id,
        blocked: blocked.blocked.into_iter().collect(),
        checkout_only: blocked.checkout_only.into_iter().collect(),
    }))
}

/// GET /api/listings/:id/calendar.ics
///
/// Exports the listing's confirmed bookings as an iCal feed for other
/// booking channels to import.
pub async fn export_calendar(
    Path(listing_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response> {
    let id = ListingId::from_uuid(listing_id);
    let listing = state.listings.get(id).await?.ok_or(Error::NotFound {
        resource: "listing",
        id: listing_id.to_string(),
    })?;
    let bookings = state.bookings.confirmed_for_listing(id).await?;
    let document = export_ical(&listing, &bookings);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/calendar; charset=utf-8")],
        document,
    )
        .into_response())
}

/// POST /api/listings/:id/calendar/refresh
///
/// Drops cached external feeds for the listing so the next availability read
/// refetches them.
pub async fn refresh_calendar(
    Path(listing_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode> {
    let id = ListingId::from_uuid(listing_id);
    let listing = state.listings.get(id).await?.ok_or(Error::NotFound {
        resource: "listing",
        id: listing_id.to_string(),
    })?;
    state.calendar_cache.invalidate(&listing.calendar_sources).await;
    Ok(StatusCode::NO_CONTENT)
}
