/// SQLite-backed booking and logbook store
/// Runtime queries, no compile-time macros, so no DATABASE_URL is needed at build time
use crate::logbook::{
    Booking, BookingStatus, LogbookEntry, LogbookEntryType, LogbookFilter, LogbookStore, TripLookup,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

const BOOKING_COLUMNS: &str =
    "id, yacht_id, user_id, start_date, end_date, status, booking_type, notes, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, yacht_id, booking_id, user_id, entry_type, port_engine_hours, \
     starboard_engine_hours, fuel_liters, notes, created_at";

/// Logbook store over a SQLite pool
#[derive(Clone)]
pub struct SqliteLogbookStore {
    db: SqlitePool,
}

impl SqliteLogbookStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a booking. Bookings are managed elsewhere; this is for seeding.
    pub async fn insert_booking(&self, booking: &Booking) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO bookings (id, yacht_id, user_id, start_date, end_date, status, booking_type, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(booking.id)
        .bind(booking.yacht_id)
        .bind(booking.user_id)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.status)
        .bind(booking.booking_type)
        .bind(&booking.notes)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TripLookup for SqliteLogbookStore {
    async fn find_active_booking(
        &self,
        yacht_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let [first, second] = BookingStatus::ACTIVE;

        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings
             WHERE yacht_id = ? AND user_id = ?
               AND start_date <= ? AND end_date >= ?
               AND status IN (?, ?)
             ORDER BY start_date ASC
             LIMIT 1",
            BOOKING_COLUMNS
        ))
        .bind(yacht_id)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .bind(first)
        .bind(second)
        .fetch_optional(&self.db)
        .await
    }

    async fn find_entry_by_booking_and_type(
        &self,
        booking_id: Uuid,
        entry_type: LogbookEntryType,
    ) -> Result<Option<LogbookEntry>, sqlx::Error> {
        sqlx::query_as::<_, LogbookEntry>(&format!(
            "SELECT {} FROM logbook_entries
             WHERE booking_id = ? AND entry_type = ?
             ORDER BY created_at ASC
             LIMIT 1",
            ENTRY_COLUMNS
        ))
        .bind(booking_id)
        .bind(entry_type)
        .fetch_optional(&self.db)
        .await
    }
}

#[async_trait]
impl LogbookStore for SqliteLogbookStore {
    async fn insert_entry(&self, entry: &LogbookEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO logbook_entries (id, yacht_id, booking_id, user_id, entry_type, port_engine_hours, starboard_engine_hours, fuel_liters, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(entry.yacht_id)
        .bind(entry.booking_id)
        .bind(entry.user_id)
        .bind(entry.entry_type)
        .bind(entry.port_engine_hours)
        .bind(entry.starboard_engine_hours)
        .bind(entry.fuel_liters)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn list_entries(&self, filter: &LogbookFilter) -> Result<Vec<LogbookEntry>, sqlx::Error> {
        sqlx::query_as::<_, LogbookEntry>(&format!(
            "SELECT {} FROM logbook_entries
             WHERE (? IS NULL OR yacht_id = ?)
               AND (? IS NULL OR user_id = ?)
               AND (? IS NULL OR entry_type = ?)
             ORDER BY created_at DESC",
            ENTRY_COLUMNS
        ))
        .bind(filter.yacht_id)
        .bind(filter.yacht_id)
        .bind(filter.user_id)
        .bind(filter.user_id)
        .bind(filter.entry_type)
        .bind(filter.entry_type)
        .fetch_all(&self.db)
        .await
    }
}
