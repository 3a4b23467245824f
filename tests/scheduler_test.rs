//! Deferred-charge scheduler: due selection, charge outcomes, key erasure,
//! and per-booking failure isolation.

#![allow(clippy::unwrap_used)]

mod common;

use common::{date, instant, test_app};
use std::sync::Arc;
use std::time::Duration;
use stayhub::booking::CreateBooking;
use stayhub::payments::{ChargeBehavior, DeferredChargeScheduler};
use stayhub::types::{
    BookingStatus, CancellationPolicy, PaymentMethod, PaymentStatus, TransactionStatus, UserId,
};

fn scheduler(app: &common::TestApp) -> DeferredChargeScheduler {
    DeferredChargeScheduler::new(app.ledger.clone(), Duration::from_secs(3600))
}

#[tokio::test]
async fn registering_a_key_schedules_the_charge_and_confirms() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;

    let updated = app
        .ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    assert_eq!(updated.status, BookingStatus::Confirmed);
    assert_eq!(updated.payment_method, PaymentMethod::Deferred);
    // Check-in 2026-06-10, lead 7 days: due at midnight UTC on 2026-06-03.
    assert_eq!(updated.scheduled_payment_date, Some(instant(2026, 6, 3, 0)));
}

#[tokio::test]
async fn settling_upfront_erases_the_key_and_drops_the_scheduled_charge() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    // The guest pays directly before the scheduled charge comes due.
    let paid = app.pay(&booking, "pay_1").await;
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert!(paid.billing_key.is_none());
    assert!(paid.scheduled_payment_date.is_none());
    assert_eq!(app.gateway.deleted_tokens(), vec!["bk_live_1".to_string()]);

    // Nothing left for the sweep to collect.
    app.clock.set(instant(2026, 6, 3, 2));
    let outcomes = scheduler(&app).run_once().await;
    assert!(outcomes.is_empty());
    assert!(app.gateway.charges().is_empty());
}

#[tokio::test]
async fn sweep_ignores_bookings_not_yet_due() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    // Clock is 2026-03-01; the charge is due 2026-06-03.
    let outcomes = scheduler(&app).run_once().await;
    assert!(outcomes.is_empty());
    assert!(app.gateway.charges().is_empty());
}

#[tokio::test]
async fn due_charge_settles_and_erases_the_key() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    app.clock.set(instant(2026, 6, 3, 2));
    let outcomes = scheduler(&app).run_once().await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success);

    let current = app.ledger.get(app.guest_id, booking.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::Paid);
    assert!(current.billing_key.is_none());

    let charges = app.gateway.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].0, "bk_live_1");
    assert_eq!(charges[0].1, booking.total_price);

    let transactions = app.transactions_of(booking.id).await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, TransactionStatus::Paid);
}

#[tokio::test]
async fn charged_bookings_drop_out_of_the_next_sweep() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    app.clock.set(instant(2026, 6, 3, 2));
    let sweeper = scheduler(&app);
    sweeper.run_once().await;
    let second = sweeper.run_once().await;

    assert!(second.is_empty());
    assert_eq!(app.gateway.charges().len(), 1);
}

#[tokio::test]
async fn declined_charge_is_committed_and_keeps_the_key() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    app.gateway.set_charge_behavior(ChargeBehavior::Decline);
    app.clock.set(instant(2026, 6, 3, 2));
    let outcomes = scheduler(&app).run_once().await;

    // A decline is an answer; the attempt completed.
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success);

    let current = app.ledger.get(app.guest_id, booking.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::Failed);
    assert_eq!(current.billing_key, Some("bk_live_1".to_string()));

    let transactions = app.transactions_of(booking.id).await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn unreachable_gateway_commits_nothing_and_retries_later() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    app.gateway.set_charge_behavior(ChargeBehavior::Unavailable);
    app.clock.set(instant(2026, 6, 3, 2));
    let sweeper = scheduler(&app);
    let outcomes = sweeper.run_once().await;

    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].success);

    // Still pending and still due: the next pass retries and succeeds.
    let current = app.ledger.get(app.guest_id, booking.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::Pending);
    assert!(app.transactions_of(booking.id).await.is_empty());

    app.gateway.set_charge_behavior(ChargeBehavior::Succeed);
    let retry = sweeper.run_once().await;
    assert_eq!(retry.len(), 1);
    assert!(retry[0].success);
    let current = app.ledger.get(app.guest_id, booking.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn one_failing_booking_does_not_stop_the_batch() {
    let app = test_app(CancellationPolicy::Flexible);
    let first = app.book_default().await;
    let second = app
        .ledger
        .create(CreateBooking {
            listing_id: app.listing.id,
            guest_id: UserId::new(),
            check_in: date(2026, 7, 1),
            check_out: date(2026, 7, 4),
            guests: 2,
            payment_method: PaymentMethod::Deferred,
        })
        .await
        .unwrap();
    app.ledger
        .register_billing_key(app.guest_id, first.id, "bk_first".to_string())
        .await
        .unwrap();
    app.ledger
        .register_billing_key(second.guest_id, second.id, "bk_second".to_string())
        .await
        .unwrap();

    app.gateway.set_charge_behavior(ChargeBehavior::Decline);
    app.clock.set(instant(2026, 6, 25, 2));
    let outcomes = scheduler(&app).run_once().await;

    // Both due bookings were attempted despite every charge declining.
    assert_eq!(outcomes.len(), 2);
    assert_eq!(app.gateway.charges().len(), 2);
}

#[tokio::test]
async fn cancelled_bookings_are_never_charged() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();
    app.ledger.guest_cancel(app.guest_id, booking.id).await.unwrap();

    app.clock.set(instant(2026, 6, 3, 2));
    let outcomes = scheduler(&app).run_once().await;
    assert!(outcomes.is_empty());
    assert!(app.gateway.charges().is_empty());
}

#[tokio::test]
async fn concurrent_sweeps_serialize() {
    let app = test_app(CancellationPolicy::Flexible);
    let booking = app.book_default().await;
    app.ledger
        .register_billing_key(app.guest_id, booking.id, "bk_live_1".to_string())
        .await
        .unwrap();

    app.clock.set(instant(2026, 6, 3, 2));
    let sweeper = Arc::new(scheduler(&app));
    let (a, b) = tokio::join!(sweeper.run_once(), sweeper.run_once());

    // One sweep charged, the other found nothing left due.
    assert_eq!(a.len() + b.len(), 1);
    assert_eq!(app.gateway.charges().len(), 1);
}
