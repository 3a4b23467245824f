//! `PostgreSQL` repository implementation.
//!
//! One pooled connection resource scoped to the process lifetime. The
//! double-booking guard is the database's overlap exclusion constraint on
//! non-cancelled bookings (see `migrations/`): the insert either succeeds or
//! raises, with no window for a concurrent create to slip through. State
//! transitions run inside a transaction with a compare-and-swap `UPDATE` so
//! the booking row and the ledger append commit together or not at all.

use super::{BookingRepo, ListingRepo};
use crate::config::PostgresConfig;
use crate::error::{Error, Result};
use crate::types::{
    Booking, BookingId, BookingStatus, CancellationPolicy, DateOverride, Listing, ListingId,
    Money, PaymentMethod, PaymentStatus, PaymentTransaction, TransactionStatus, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

/// `Postgres` error codes that signal the booking-overlap guard fired.
const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Repository backed by a pooled `Postgres` connection.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects a pool sized from configuration and runs pending migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Internal(anyhow::Error::new(e).context("migration failed")))?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool (tests, tooling).
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Releases the pool; call once at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn money_to_db(money: Money) -> Result<i64> {
    i64::try_from(money.minor())
        .map_err(|_| Error::Internal(anyhow::anyhow!("amount out of range")))
}

fn money_from_db(minor: i64) -> Result<Money> {
    u64::try_from(minor)
        .map(Money::from_minor)
        .map_err(|_| Error::Internal(anyhow::anyhow!("negative amount in store")))
}

fn bad_row(what: &str, value: &str) -> Error {
    Error::Internal(anyhow::anyhow!("unrecognized {what} in store: {value}"))
}

fn listing_from_row(row: &sqlx::postgres::PgRow, sources: Vec<String>) -> Result<Listing> {
    let percents: Vec<i16> = row.try_get("seasonal_percents")?;
    let mut seasonal_percents = [100u16; 12];
    for (slot, value) in seasonal_percents.iter_mut().zip(percents) {
        *slot = u16::try_from(value)
            .map_err(|_| Error::Internal(anyhow::anyhow!("negative seasonal percent in store")))?;
    }
    let policy: String = row.try_get("cancellation_policy")?;
    Ok(Listing {
        id: ListingId::from_uuid(row.try_get("id")?),
        host_id: UserId::from_uuid(row.try_get("host_id")?),
        name: row.try_get("name")?,
        price_per_night: money_from_db(row.try_get("price_per_night")?)?,
        seasonal_percents,
        cleaning_fee: money_from_db(row.try_get("cleaning_fee")?)?,
        base_guests: u32::try_from(row.try_get::<i32, _>("base_guests")?).unwrap_or(0),
        extra_guest_fee: money_from_db(row.try_get("extra_guest_fee")?)?,
        cancellation_policy: CancellationPolicy::parse(&policy)
            .ok_or_else(|| bad_row("cancellation policy", &policy))?,
        calendar_sources: sources,
    })
}

fn booking_from_row(row: &sqlx::postgres::PgRow) -> Result<Booking> {
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    let payment_method: String = row.try_get("payment_method")?;
    Ok(Booking {
        id: BookingId::from_uuid(row.try_get("id")?),
        listing_id: ListingId::from_uuid(row.try_get("listing_id")?),
        guest_id: UserId::from_uuid(row.try_get("guest_id")?),
        check_in: row.try_get("check_in")?,
        check_out: row.try_get("check_out")?,
        guests: u32::try_from(row.try_get::<i32, _>("guests")?).unwrap_or(0),
        total_price: money_from_db(row.try_get("total_price")?)?,
        status: BookingStatus::parse(&status).ok_or_else(|| bad_row("booking status", &status))?,
        payment_status: PaymentStatus::parse(&payment_status)
            .ok_or_else(|| bad_row("payment status", &payment_status))?,
        payment_method: PaymentMethod::parse(&payment_method)
            .ok_or_else(|| bad_row("payment method", &payment_method))?,
        billing_key: row.try_get("billing_key")?,
        scheduled_payment_date: row.try_get("scheduled_payment_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &sqlx::postgres::PgRow) -> Result<PaymentTransaction> {
    let status: String = row.try_get("status")?;
    Ok(PaymentTransaction {
        id: row.try_get("id")?,
        booking_id: BookingId::from_uuid(row.try_get("booking_id")?),
        payment_id: row.try_get("payment_id")?,
        amount: money_from_db(row.try_get("amount")?)?,
        status: TransactionStatus::parse(&status)
            .ok_or_else(|| bad_row("transaction status", &status))?,
        payload: row.try_get("payload")?,
        verified_at: row.try_get("verified_at")?,
    })
}

const BOOKING_COLUMNS: &str = "id, listing_id, guest_id, check_in, check_out, guests, \
     total_price, status, payment_status, payment_method, billing_key, \
     scheduled_payment_date, created_at";

#[async_trait]
impl ListingRepo for PostgresStore {
    async fn get(&self, id: ListingId) -> Result<Option<Listing>> {
        let row = sqlx::query(
            "SELECT id, host_id, name, price_per_night, seasonal_percents, cleaning_fee, \
             base_guests, extra_guest_fee, cancellation_policy \
             FROM listings WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let sources: Vec<String> = sqlx::query_scalar(
            "SELECT url FROM listing_calendar_sources WHERE listing_id = $1 ORDER BY url",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        listing_from_row(&row, sources).map(Some)
    }

    async fn overrides_in_range(
        &self,
        listing: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateOverride>> {
        let rows = sqlx::query(
            "SELECT listing_id, date, price_per_night, available \
             FROM date_overrides WHERE listing_id = $1 AND date >= $2 AND date < $3",
        )
        .bind(listing.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let price: Option<i64> = row.try_get("price_per_night")?;
                Ok(DateOverride {
                    listing_id: ListingId::from_uuid(row.try_get("listing_id")?),
                    date: row.try_get("date")?,
                    price_per_night: price.map(money_from_db).transpose()?,
                    available: row.try_get("available")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BookingRepo for PostgresStore {
    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn active_in_range(
        &self,
        listing: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE listing_id = $1 AND status <> 'cancelled' \
             AND check_in < $3 AND check_out > $2"
        ))
        .bind(listing.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn confirmed_for_listing(&self, listing: ListingId) -> Result<Vec<Booking>> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE listing_id = $1 AND status = 'confirmed' ORDER BY check_in"
        ))
        .bind(listing.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn due_deferred(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE payment_method = 'deferred' AND payment_status = 'pending' \
             AND status <> 'cancelled' AND billing_key IS NOT NULL \
             AND scheduled_payment_date <= $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO bookings (id, listing_id, guest_id, check_in, check_out, guests, \
             total_price, status, payment_status, payment_method, billing_key, \
             scheduled_payment_date, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.listing_id.as_uuid())
        .bind(booking.guest_id.as_uuid())
        .bind(booking.check_in)
        .bind(booking.check_out)
        .bind(i32::try_from(booking.guests).unwrap_or(i32::MAX))
        .bind(money_to_db(booking.total_price)?)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.payment_method.as_str())
        .bind(booking.billing_key.as_deref())
        .bind(booking.scheduled_payment_date)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if db
                    .code()
                    .is_some_and(|c| c == EXCLUSION_VIOLATION || c == UNIQUE_VIOLATION) =>
            {
                // The overlap guard fired: another booking holds these nights.
                Err(Error::Unavailable)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn commit_transition(
        &self,
        updated: &Booking,
        expected: (BookingStatus, PaymentStatus),
        transaction: Option<&PaymentTransaction>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE bookings SET status = $1, payment_status = $2, payment_method = $3, \
             billing_key = $4, scheduled_payment_date = $5 \
             WHERE id = $6 AND status = $7 AND payment_status = $8",
        )
        .bind(updated.status.as_str())
        .bind(updated.payment_status.as_str())
        .bind(updated.payment_method.as_str())
        .bind(updated.billing_key.as_deref())
        .bind(updated.scheduled_payment_date)
        .bind(updated.id.as_uuid())
        .bind(expected.0.as_str())
        .bind(expected.1.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            // Either the booking vanished or a concurrent transition won.
            tx.rollback().await?;
            return Err(Error::Conflict);
        }
        if let Some(txn) = transaction {
            sqlx::query(
                "INSERT INTO payment_transactions \
                 (id, booking_id, payment_id, amount, status, payload, verified_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(txn.id)
            .bind(txn.booking_id.as_uuid())
            .bind(&txn.payment_id)
            .bind(money_to_db(txn.amount)?)
            .bind(txn.status.as_str())
            .bind(&txn.payload)
            .bind(txn.verified_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn transactions(&self, booking: BookingId) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query(
            "SELECT id, booking_id, payment_id, amount, status, payload, verified_at \
             FROM payment_transactions WHERE booking_id = $1 ORDER BY verified_at, id",
        )
        .bind(booking.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}
