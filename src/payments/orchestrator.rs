//! Thin orchestration layer over the payment gateway.
//!
//! Centralizes the two rules every gateway interaction follows: failures of
//! the gateway itself (timeouts, 5xx) are counted before they propagate, and
//! every answer that reaches the ledger is recorded as an append-only
//! transaction row built from the gateway's own payload.

use super::gateway::{GatewayRecord, PaymentGateway};
use crate::error::{Error, Result};
use crate::metrics;
use crate::types::{BookingId, Money, PaymentTransaction, TransactionStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Mediates all gateway calls made by the booking ledger and scheduler.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentOrchestrator {
    /// Creates an orchestrator over the given gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Looks up a payment at the gateway.
    pub async fn verify(&self, payment_id: &str) -> Result<GatewayRecord> {
        self.count_gateway_failure(self.gateway.verify(payment_id).await)
    }

    /// Charges a stored billing token. A decline comes back as an `Ok`
    /// record, never an error.
    pub async fn charge_by_token(
        &self,
        token: &str,
        amount: Money,
        reference: &str,
    ) -> Result<GatewayRecord> {
        self.count_gateway_failure(self.gateway.charge_by_token(token, amount, reference).await)
    }

    /// Refunds `amount` of a captured payment (everything when `None`).
    pub async fn refund(
        &self,
        payment_id: &str,
        reason: &str,
        amount: Option<Money>,
    ) -> Result<GatewayRecord> {
        self.count_gateway_failure(self.gateway.cancel(payment_id, reason, amount).await)
    }

    /// Deletes a stored billing token at the gateway.
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        self.count_gateway_failure(self.gateway.delete_token(token).await)
    }

    /// Builds the ledger row for a gateway answer.
    #[must_use]
    pub fn transaction(
        booking_id: BookingId,
        record: &GatewayRecord,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> PaymentTransaction {
        PaymentTransaction::record(
            booking_id,
            record.payment_id.clone(),
            record.amount,
            status,
            record.raw.clone(),
            at,
        )
    }

    fn count_gateway_failure<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(Error::GatewayUnavailable(_)) = &result {
            metrics::gateway_failure();
        }
        result
    }
}
