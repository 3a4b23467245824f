//! Operational trigger endpoints.

use crate::error::{Error, Result};
use crate::server::state::AppState;
use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;
use uuid::Uuid;

/// Header carrying the scheduler trigger secret.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// One charge attempt from a triggered sweep.
#[derive(Debug, Serialize)]
pub struct ChargeOutcome {
    /// Booking that was due.
    pub booking_id: Uuid,
    /// Whether the attempt completed (a committed decline counts).
    pub success: bool,
    /// Error description when it did not.
    pub error: Option<String>,
}

/// Response for a triggered sweep.
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    /// Per-booking outcomes, empty when nothing was due.
    pub outcomes: Vec<ChargeOutcome>,
}

/// POST /api/jobs/deferred-charges
///
/// Manually triggers one deferred-charge sweep. Guarded by a shared secret
/// so external cron systems can drive it; concurrent triggers queue behind
/// the running sweep.
pub async fn run_deferred_charges(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>> {
    let presented = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if state.trigger_secret.is_empty() || presented != state.trigger_secret {
        return Err(Error::Unauthorized);
    }

    let outcomes = state
        .scheduler
        .run_once()
        .await
        .into_iter()
        .map(|outcome| ChargeOutcome {
            booking_id: *outcome.booking_id.as_uuid(),
            success: outcome.success,
            error: outcome.error,
        })
        .collect();
    Ok(Json(SweepResponse { outcomes }))
}
