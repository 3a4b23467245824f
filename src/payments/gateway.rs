//! Payment gateway abstraction.
//!
//! The gateway is treated as a capability with four operations: verify a
//! payment by id, charge a stored billing token, cancel (refund) a payment,
//! and delete a billing token. Every operation returns the gateway's answer
//! verbatim alongside the parsed fields; the engine records what the gateway
//! said, never what it hoped for.

use crate::error::{Error, Result};
use crate::types::Money;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Payment state as reported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayStatus {
    /// Charge captured.
    Paid,
    /// Awaiting settlement (e.g. a virtual-account voucher not yet paid).
    Pending,
    /// Charge attempted and declined.
    Failed,
    /// Payment cancelled / refunded at the gateway.
    Cancelled,
}

impl GatewayStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(Self::Paid),
            "ready" | "pending" => Some(Self::Pending),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One gateway answer: parsed fields plus the raw payload for the ledger.
#[derive(Clone, Debug)]
pub struct GatewayRecord {
    /// Gateway-side payment identifier.
    pub payment_id: String,
    /// Amount the gateway reports for this payment.
    pub amount: Money,
    /// Gateway-side payment state.
    pub status: GatewayStatus,
    /// Raw response body, stored verbatim in the transaction ledger.
    pub raw: serde_json::Value,
}

/// External payment provider capability.
///
/// A timeout or 5xx from the provider surfaces as
/// [`Error::GatewayUnavailable`] and is never treated as success.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Looks up a payment by gateway id.
    async fn verify(&self, payment_id: &str) -> Result<GatewayRecord>;

    /// Charges a stored billing token for `amount`, tagged with `reference`.
    /// A decline is an `Ok` record with [`GatewayStatus::Failed`]; `Err` is
    /// reserved for not getting an answer at all.
    async fn charge_by_token(
        &self,
        token: &str,
        amount: Money,
        reference: &str,
    ) -> Result<GatewayRecord>;

    /// Cancels a payment, refunding `amount` (or the full charge when
    /// `None`).
    async fn cancel(
        &self,
        payment_id: &str,
        reason: &str,
        amount: Option<Money>,
    ) -> Result<GatewayRecord>;

    /// Deletes a stored billing token so it can never be charged again.
    async fn delete_token(&self, token: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    payment_id: String,
    amount: u64,
    status: String,
}

/// REST gateway client authenticated with a bearer secret.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
}

impl HttpPaymentGateway {
    /// Builds a client for the gateway at `base_url` with a per-request
    /// timeout.
    pub fn new(base_url: impl Into<String>, api_secret: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(anyhow::Error::new(e).context("gateway client")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_secret: api_secret.into(),
        })
    }

    async fn decode(response: reqwest::Response) -> Result<GatewayRecord> {
        let status = response.status();
        if status.is_server_error() {
            return Err(Error::GatewayUnavailable(format!("gateway returned {status}")));
        }
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::GatewayUnavailable(format!("unreadable gateway response: {e}")))?;
        if !status.is_success() {
            return Err(Error::Validation(format!("gateway rejected request: {raw}")));
        }
        let wire: WireRecord = serde_json::from_value(raw.clone())
            .map_err(|e| Error::Internal(anyhow::Error::new(e).context("gateway payload shape")))?;
        let parsed_status = GatewayStatus::parse(&wire.status).ok_or_else(|| {
            Error::Internal(anyhow::anyhow!("unknown gateway status {:?}", wire.status))
        })?;
        Ok(GatewayRecord {
            payment_id: wire.payment_id,
            amount: Money::from_minor(wire.amount),
            status: parsed_status,
            raw,
        })
    }

    fn transport_error(err: reqwest::Error) -> Error {
        Error::GatewayUnavailable(if err.is_timeout() {
            "gateway request timed out".to_string()
        } else {
            format!("gateway request failed: {err}")
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn verify(&self, payment_id: &str) -> Result<GatewayRecord> {
        let response = self
            .client
            .get(format!("{}/payments/{payment_id}", self.base_url))
            .bearer_auth(&self.api_secret)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::decode(response).await
    }

    async fn charge_by_token(
        &self,
        token: &str,
        amount: Money,
        reference: &str,
    ) -> Result<GatewayRecord> {
        let response = self
            .client
            .post(format!("{}/payments/charge", self.base_url))
            .bearer_auth(&self.api_secret)
            .json(&json!({
                "billing_key": token,
                "amount": amount.minor(),
                "reference": reference,
            }))
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::decode(response).await
    }

    async fn cancel(
        &self,
        payment_id: &str,
        reason: &str,
        amount: Option<Money>,
    ) -> Result<GatewayRecord> {
        let response = self
            .client
            .post(format!("{}/payments/{payment_id}/cancel", self.base_url))
            .bearer_auth(&self.api_secret)
            .json(&json!({
                "reason": reason,
                "amount": amount.map(|a| a.minor()),
            }))
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::decode(response).await
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/billing-keys/{token}", self.base_url))
            .bearer_auth(&self.api_secret)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if response.status().is_server_error() {
            return Err(Error::GatewayUnavailable(format!(
                "gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Programmable mock (tests and local development)
// ============================================================================

/// Canned behavior for the mock's charge operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChargeBehavior {
    /// Charge succeeds for the requested amount.
    Succeed,
    /// Gateway answers with a decline.
    Decline,
    /// Gateway is unreachable (timeout).
    Unavailable,
}

#[derive(Default)]
struct MockState {
    verifications: HashMap<String, GatewayRecord>,
    charge_behavior: Option<ChargeBehavior>,
    cancel_fails: bool,
    charges: Vec<(String, Money, String)>,
    cancels: Vec<(String, Option<Money>)>,
    deleted_tokens: Vec<String>,
    next_payment_seq: u64,
}

/// Programmable in-process gateway for tests.
#[derive(Default)]
pub struct MockPaymentGateway {
    state: Mutex<MockState>,
}

impl MockPaymentGateway {
    /// Creates a mock that charges successfully and knows no payments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal(anyhow::anyhow!("mock gateway poisoned")))
    }

    /// Cans a verification answer for `payment_id`.
    pub fn set_payment(&self, payment_id: &str, amount: Money, status: GatewayStatus) {
        if let Ok(mut state) = self.state.lock() {
            state.verifications.insert(
                payment_id.to_string(),
                GatewayRecord {
                    payment_id: payment_id.to_string(),
                    amount,
                    status,
                    raw: json!({ "payment_id": payment_id, "amount": amount.minor(), "mock": true }),
                },
            );
        }
    }

    /// Sets the behavior of subsequent charge calls.
    pub fn set_charge_behavior(&self, behavior: ChargeBehavior) {
        if let Ok(mut state) = self.state.lock() {
            state.charge_behavior = Some(behavior);
        }
    }

    /// Makes subsequent cancel calls fail as unavailable.
    pub fn fail_cancels(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.cancel_fails = true;
        }
    }

    /// Charges issued so far, as `(token, amount, reference)`.
    #[must_use]
    pub fn charges(&self) -> Vec<(String, Money, String)> {
        self.state.lock().map(|s| s.charges.clone()).unwrap_or_default()
    }

    /// Cancellations issued so far, as `(payment_id, amount)`.
    #[must_use]
    pub fn cancels(&self) -> Vec<(String, Option<Money>)> {
        self.state.lock().map(|s| s.cancels.clone()).unwrap_or_default()
    }

    /// Billing tokens deleted so far.
    #[must_use]
    pub fn deleted_tokens(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.deleted_tokens.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn verify(&self, payment_id: &str) -> Result<GatewayRecord> {
        let state = self.lock()?;
        state
            .verifications
            .get(payment_id)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("unknown payment {payment_id}")))
    }

    async fn charge_by_token(
        &self,
        token: &str,
        amount: Money,
        reference: &str,
    ) -> Result<GatewayRecord> {
        let mut state = self.lock()?;
        let behavior = state.charge_behavior.unwrap_or(ChargeBehavior::Succeed);
        if behavior == ChargeBehavior::Unavailable {
            return Err(Error::GatewayUnavailable("mock gateway offline".to_string()));
        }
        state
            .charges
            .push((token.to_string(), amount, reference.to_string()));
        state.next_payment_seq += 1;
        let payment_id = format!("mock_pay_{}", state.next_payment_seq);
        let status = if behavior == ChargeBehavior::Succeed {
            GatewayStatus::Paid
        } else {
            GatewayStatus::Failed
        };
        Ok(GatewayRecord {
            payment_id: payment_id.clone(),
            amount,
            status,
            raw: json!({
                "payment_id": payment_id,
                "amount": amount.minor(),
                "reference": reference,
                "mock": true,
            }),
        })
    }

    async fn cancel(
        &self,
        payment_id: &str,
        reason: &str,
        amount: Option<Money>,
    ) -> Result<GatewayRecord> {
        let mut state = self.lock()?;
        if state.cancel_fails {
            return Err(Error::GatewayUnavailable("mock gateway offline".to_string()));
        }
        state.cancels.push((payment_id.to_string(), amount));
        let refunded = amount
            .or_else(|| state.verifications.get(payment_id).map(|r| r.amount))
            .unwrap_or(Money::ZERO);
        Ok(GatewayRecord {
            payment_id: payment_id.to_string(),
            amount: refunded,
            status: GatewayStatus::Cancelled,
            raw: json!({
                "payment_id": payment_id,
                "amount": refunded.minor(),
                "reason": reason,
                "mock": true,
            }),
        })
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.deleted_tokens.push(token.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_charge_succeeds_by_default() {
        let gateway = MockPaymentGateway::new();
        let record = gateway
            .charge_by_token("key-1", Money::from_minor(85_000), "booking-1")
            .await
            .unwrap();
        assert_eq!(record.status, GatewayStatus::Paid);
        assert_eq!(record.amount, Money::from_minor(85_000));
        assert_eq!(gateway.charges().len(), 1);
    }

    #[tokio::test]
    async fn mock_decline_is_an_answer_not_an_error() {
        let gateway = MockPaymentGateway::new();
        gateway.set_charge_behavior(ChargeBehavior::Decline);
        let record = gateway
            .charge_by_token("key-1", Money::from_minor(85_000), "booking-1")
            .await
            .unwrap();
        assert_eq!(record.status, GatewayStatus::Failed);
    }

    #[tokio::test]
    async fn mock_unavailable_is_an_error() {
        let gateway = MockPaymentGateway::new();
        gateway.set_charge_behavior(ChargeBehavior::Unavailable);
        let err = gateway
            .charge_by_token("key-1", Money::from_minor(85_000), "booking-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GatewayUnavailable(_)));
    }
}
