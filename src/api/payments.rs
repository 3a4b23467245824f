//! Gateway webhook endpoint.

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::BookingId;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Webhook payload sent by the payment gateway.
///
/// Only the identifiers are used; the payment state is re-verified against
/// the gateway, never taken from the payload.
#[derive(Debug, Deserialize)]
pub struct GatewayWebhook {
    /// Booking the notification is about.
    pub booking_id: Uuid,
    /// Gateway-side payment identifier.
    pub payment_id: String,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Booking status after re-verification.
    pub status: &'static str,
    /// True when the notification was a duplicate.
    pub already_paid: bool,
}

/// POST /api/payments/webhook
///
/// Asynchronous settlement notifications (virtual-account deposits, retried
/// confirmations). Re-runs the same verification as the client-initiated
/// path, so duplicates are no-ops.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    Json(webhook): Json<GatewayWebhook>,
) -> Result<Json<WebhookResponse>> {
    let outcome = state
        .ledger
        .verify_payment(
            BookingId::from_uuid(webhook.booking_id),
            &webhook.payment_id,
        )
        .await?;
    Ok(Json(WebhookResponse {
        status: outcome.booking.payment_status.as_str(),
        already_paid: outcome.already_paid,
    }))
}
