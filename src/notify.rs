//! Fire-and-forget notifications for booking lifecycle events.
//!
//! Delivery never blocks or fails a transition: each notification is handed
//! to a spawned task, and a failed delivery is logged and counted rather than
//! surfaced to the caller.

use crate::error::Result;
use crate::metrics;
use crate::types::{Booking, Money};
use async_trait::async_trait;
use std::sync::Arc;

/// A lifecycle event worth telling someone about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A guest requested a stay; the host should accept or reject.
    BookingRequested { booking: Booking },
    /// The host accepted the request.
    BookingConfirmed { booking: Booking },
    /// The booking was cancelled, by either party.
    BookingCancelled { booking: Booking, refund: Money },
    /// A payment settled (immediate verification or deferred charge).
    PaymentCompleted { booking: Booking },
    /// A deferred charge was declined; manual follow-up needed.
    PaymentFailed { booking: Booking },
}

/// Delivers one notification to its recipients.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `notification`. Errors are observed by the dispatcher, never
    /// by the transition that produced the event.
    async fn deliver(&self, notification: Notification) -> Result<()>;
}

/// Spawns delivery so the calling transition returns immediately. Failures
/// are logged and counted.
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(err) = notifier.deliver(notification).await {
            metrics::notification_failure();
            tracing::warn!(error = %err, "notification delivery failed");
        }
    });
}

/// Default notifier: writes the event to the log. Stands in for mail/push
/// channels in environments that have none configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: Notification) -> Result<()> {
        match &notification {
            Notification::BookingRequested { booking } => {
                tracing::info!(booking_id = %booking.id, "notify: booking requested");
            }
            Notification::BookingConfirmed { booking } => {
                tracing::info!(booking_id = %booking.id, "notify: booking confirmed");
            }
            Notification::BookingCancelled { booking, refund } => {
                tracing::info!(
                    booking_id = %booking.id,
                    refund_minor = refund.minor(),
                    "notify: booking cancelled"
                );
            }
            Notification::PaymentCompleted { booking } => {
                tracing::info!(booking_id = %booking.id, "notify: payment completed");
            }
            Notification::PaymentFailed { booking } => {
                tracing::warn!(booking_id = %booking.id, "notify: payment failed");
            }
        }
        Ok(())
    }
}

/// Test notifier that records every delivered notification.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: std::sync::Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: Notification) -> Result<()> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification);
        }
        Ok(())
    }
}
