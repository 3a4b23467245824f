//! Deferred-charge scheduler.
//!
//! Periodically sweeps bookings whose scheduled charge date has arrived and
//! charges each through the booking ledger. One failing booking never stops
//! the rest of the batch, and overlapping sweeps (timer tick plus a manual
//! trigger) are serialized so no booking is charged by two passes at once.

use crate::booking::BookingLedger;
use std::sync::Arc;
use std::time::Duration;

/// Result of one charge attempt within a sweep.
#[derive(Clone, Debug)]
pub struct DeferredChargeOutcome {
    /// Booking that was due.
    pub booking_id: crate::types::BookingId,
    /// Whether the attempt completed without a ledger or gateway error. A
    /// committed decline counts as completed.
    pub success: bool,
    /// Error description when the attempt did not complete.
    pub error: Option<String>,
}

/// Sweeps due deferred bookings on an interval.
pub struct DeferredChargeScheduler {
    ledger: Arc<BookingLedger>,
    interval: Duration,
    running: tokio::sync::Mutex<()>,
}

impl DeferredChargeScheduler {
    /// Creates a scheduler over `ledger` sweeping every `interval`.
    #[must_use]
    pub fn new(ledger: Arc<BookingLedger>, interval: Duration) -> Self {
        Self {
            ledger,
            interval,
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// Runs one sweep: loads all due bookings and attempts each charge,
    /// isolating failures per booking. Concurrent sweeps queue behind the
    /// running one.
    pub async fn run_once(&self) -> Vec<DeferredChargeOutcome> {
        let _guard = self.running.lock().await;

        let due = match self.ledger.due_deferred().await {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(error = %err, "deferred charge sweep could not load due bookings");
                return Vec::new();
            }
        };
        if due.is_empty() {
            return Vec::new();
        }
        tracing::info!(count = due.len(), "deferred charge sweep started");

        let mut outcomes = Vec::with_capacity(due.len());
        for booking in due {
            let outcome = match self.ledger.charge_deferred(booking.id).await {
                Ok(()) => DeferredChargeOutcome {
                    booking_id: booking.id,
                    success: true,
                    error: None,
                },
                Err(err) => {
                    crate::metrics::deferred_charge("unavailable");
                    tracing::warn!(
                        booking_id = %booking.id,
                        error = %err,
                        "deferred charge attempt did not complete"
                    );
                    DeferredChargeOutcome {
                        booking_id: booking.id,
                        success: false,
                        error: Some(err.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Spawns the interval loop. Runs until the process exits.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
