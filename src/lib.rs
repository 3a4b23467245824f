//! Lodging reservation and availability engine.
//!
//! Resolves nightly price and availability for listings, merges blocked
//! dates from internal bookings, host overrides, and external iCal feeds,
//! and owns the booking lifecycle: request, host approval, payment
//! verification, tiered cancellation refunds, and deferred billing-key
//! charges.
//!
//! # Architecture
//!
//! - [`types`]: identifiers, `Money`, listings, bookings, the transaction
//!   ledger row
//! - [`repo`]: repository traits plus Postgres and in-memory stores; the
//!   two atomic primitives (`insert_booking`, `commit_transition`) live here
//! - [`availability`]: blocked-date aggregation and stay resolution
//! - [`calendar`]: iCal import/export and the external feed cache
//! - [`booking`]: the ledger owning every state transition
//! - [`refund`]: pure policy-tier refund calculation
//! - [`payments`]: gateway client, orchestrator, deferred-charge scheduler
//! - [`api`] / [`server`]: Axum HTTP surface

pub mod api;
pub mod availability;
pub mod booking;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod payments;
pub mod refund;
pub mod repo;
pub mod server;
pub mod types;

pub use error::{Error, Result};
