//! Router configuration for the reservation server.

use super::health::health_check;
use super::state::AppState;
use crate::api::{bookings, jobs, listings, payments};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Builds the complete Axum router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Listing reads
        .route(
            "/listings/:id/availability",
            get(listings::get_availability),
        )
        .route(
            "/listings/:id/blocked-dates",
            get(listings::get_blocked_dates),
        )
        .route("/listings/:id/calendar.ics", get(listings::export_calendar))
        .route(
            "/listings/:id/calendar/refresh",
            post(listings::refresh_calendar),
        )
        // Booking lifecycle
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/accept", post(bookings::accept_booking))
        .route("/bookings/:id/reject", post(bookings::reject_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        // Payments
        .route(
            "/bookings/:id/payments/verify",
            post(bookings::verify_payment),
        )
        .route(
            "/bookings/:id/billing-key",
            post(bookings::register_billing_key),
        )
        .route("/payments/webhook", post(payments::gateway_webhook))
        // Operational triggers
        .route("/jobs/deferred-charges", post(jobs::run_deferred_charges));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
