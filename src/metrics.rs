//! Business metrics for the reservation engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `stayhub_bookings_total{status}` - Bookings by lifecycle outcome
//! - `stayhub_payments_total{status}` - Payment verifications/charges by outcome
//! - `stayhub_refunds_minor_total` - Total refunds issued, in minor units
//! - `stayhub_deferred_charges_total{outcome}` - Scheduler charge attempts
//! - `stayhub_gateway_failures_total` - Gateway timeouts and 5xx answers
//! - `stayhub_notification_failures_total` - Fire-and-forget deliveries that failed
//! - `calendar_fetch_failures` - External calendar feeds that failed to load

use metrics::{counter, describe_counter};

/// Initialize and register all business metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "stayhub_bookings_total",
        "Total bookings by lifecycle outcome (created, confirmed, cancelled)"
    );
    describe_counter!(
        "stayhub_payments_total",
        "Total payment verifications and charges by outcome (paid, failed, refunded)"
    );
    describe_counter!(
        "stayhub_refunds_minor_total",
        "Total refunds issued to guests, in minor currency units"
    );
    describe_counter!(
        "stayhub_deferred_charges_total",
        "Deferred charge attempts by outcome (success, declined, unavailable)"
    );
    describe_counter!(
        "stayhub_gateway_failures_total",
        "Payment gateway calls that timed out or returned a server error"
    );
    describe_counter!(
        "stayhub_notification_failures_total",
        "Notification deliveries that failed (observable, never blocking)"
    );
    describe_counter!(
        "calendar_fetch_failures",
        "External calendar feeds that failed to load"
    );

    tracing::info!("Business metrics registered");
}

/// Records a booking lifecycle outcome.
pub fn booking(status: &'static str) {
    counter!("stayhub_bookings_total", "status" => status).increment(1);
}

/// Records a payment outcome.
pub fn payment(status: &'static str) {
    counter!("stayhub_payments_total", "status" => status).increment(1);
}

/// Records an issued refund amount.
pub fn refund_issued(minor: u64) {
    counter!("stayhub_refunds_minor_total").increment(minor);
}

/// Records one deferred charge attempt.
pub fn deferred_charge(outcome: &'static str) {
    counter!("stayhub_deferred_charges_total", "outcome" => outcome).increment(1);
}

/// Records a gateway failure (timeout or 5xx).
pub fn gateway_failure() {
    counter!("stayhub_gateway_failures_total").increment(1);
}

/// Records a failed notification delivery.
pub fn notification_failure() {
    counter!("stayhub_notification_failures_total").increment(1);
}

/// Records an external calendar feed that failed to load.
pub fn calendar_fetch_failure() {
    counter!("calendar_fetch_failures").increment(1);
}
