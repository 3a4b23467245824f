//! Error taxonomy for the reservation engine.
//!
//! Domain errors carry enough structure for the HTTP layer to map them to a
//! status code and a machine-readable code without inspecting messages.
//! Financial-integrity failures (`AmountMismatch`, `Unavailable`, refund
//! failures surfaced as `GatewayUnavailable`) abort the whole operation and
//! leave prior state intact; they are never soft-failed.

use crate::types::Money;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Domain error for the reservation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing input, surfaced verbatim to the caller.
    #[error("{0}")]
    Validation(String),

    /// `check_in` must be strictly before `check_out`.
    #[error("check-in date must be before check-out date")]
    InvalidRange,

    /// No actor was supplied with the request.
    #[error("authentication required")]
    Unauthorized,

    /// The actor is not allowed to perform this action.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Unknown listing or booking.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource kind, e.g. "listing".
        resource: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },

    /// One or more requested nights are blocked.
    #[error("requested dates are no longer available")]
    Unavailable,

    /// The booking is already paid; the operation is a no-op.
    #[error("booking is already paid")]
    AlreadyPaid,

    /// The booking is cancelled; cancelled is terminal.
    #[error("booking is already cancelled")]
    AlreadyCancelled,

    /// Guests may not cancel once the check-in date has passed.
    #[error("booking can no longer be cancelled after check-in")]
    TooLateToCancel,

    /// Gateway-reported amount differs from the frozen total. Always recorded
    /// as a failed transaction, never silently corrected.
    #[error("gateway reported {reported} but booking total is {expected}")]
    AmountMismatch {
        /// The booking's frozen total.
        expected: Money,
        /// What the gateway reported.
        reported: Money,
    },

    /// The booking was modified concurrently; the caller should re-read and
    /// retry.
    #[error("booking was modified concurrently")]
    Conflict,

    /// Timeout or 5xx from the external payment provider. Retried by the
    /// caller (or the scheduler's next pass), never auto-retried inline.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Unexpected failure; logged in full, generic message to the caller.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Machine-readable code included in HTTP error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidRange => "INVALID_RANGE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unavailable => "UNAVAILABLE",
            Self::AlreadyPaid => "ALREADY_PAID",
            Self::AlreadyCancelled => "ALREADY_CANCELLED",
            Self::TooLateToCancel => "TOO_LATE_TO_CANCEL",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::Conflict => "CONFLICT",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidRange => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unavailable
            | Self::AlreadyPaid
            | Self::AlreadyCancelled
            | Self::TooLateToCancel
            | Self::AmountMismatch { .. }
            | Self::Conflict => StatusCode::CONFLICT,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Machine-readable error code.
    code: &'static str,
    /// Human-readable message.
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // Log internals in full, keep the wire message generic.
            tracing::error!(error = %self, code = self.code(), "internal error");
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(err).context("database error"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn conflict_family_maps_to_409() {
        for err in [
            Error::Unavailable,
            Error::AlreadyPaid,
            Error::AlreadyCancelled,
            Error::TooLateToCancel,
            Error::Conflict,
        ] {
            assert_eq!(err.status(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn amount_mismatch_reports_both_figures() {
        let err = Error::AmountMismatch {
            expected: Money::from_minor(85_000),
            reported: Money::from_minor(80_000),
        };
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("85000"));
        assert!(err.to_string().contains("80000"));
    }

    #[test]
    fn gateway_unavailable_is_502() {
        let err = Error::GatewayUnavailable("timeout".into());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "GATEWAY_UNAVAILABLE");
    }
}
