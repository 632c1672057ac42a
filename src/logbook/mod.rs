/// Engine-room logbook
///
/// Bookings bracket trips; the first logbook entry of an active booking
/// is its departure, the second its return, anything after is general.

pub mod resolver;
pub mod service;
pub mod store;

pub use resolver::{classify, EntryClassification, EntryTypeResolver, TripState};
pub use service::LogbookService;
pub use store::SqliteLogbookStore;

use crate::error::LogbookError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Logbook entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LogbookEntryType {
    Departure,
    Return,
    Fuel,
    Maintenance,
    General,
    Incident,
}

impl LogbookEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogbookEntryType::Departure => "departure",
            LogbookEntryType::Return => "return",
            LogbookEntryType::Fuel => "fuel",
            LogbookEntryType::Maintenance => "maintenance",
            LogbookEntryType::General => "general",
            LogbookEntryType::Incident => "incident",
        }
    }
}

impl fmt::Display for LogbookEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogbookEntryType {
    type Err = LogbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "departure" => Ok(LogbookEntryType::Departure),
            "return" => Ok(LogbookEntryType::Return),
            "fuel" => Ok(LogbookEntryType::Fuel),
            "maintenance" => Ok(LogbookEntryType::Maintenance),
            "general" => Ok(LogbookEntryType::General),
            "incident" => Ok(LogbookEntryType::Incident),
            other => Err(LogbookError::InvalidEntryType(other.to_string())),
        }
    }
}

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Statuses that make a booking eligible for trip logging
    pub const ACTIVE: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::Pending];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

/// Booking type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingType {
    #[default]
    Regular,
    Standby,
}

/// Booking record
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub yacht_id: Uuid,
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: BookingStatus,
    pub booking_type: BookingType,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Logbook entry record
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LogbookEntry {
    pub id: Uuid,
    pub yacht_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub user_id: Uuid,
    pub entry_type: LogbookEntryType,
    pub port_engine_hours: Option<f64>,
    pub starboard_engine_hours: Option<f64>,
    pub fuel_liters: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create logbook entry request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLogbookEntry {
    pub yacht_id: Uuid,
    /// Detected from bookings when absent or empty
    pub entry_type: Option<String>,
    pub port_engine_hours: Option<f64>,
    pub starboard_engine_hours: Option<f64>,
    pub fuel_liters: Option<f64>,
    pub notes: Option<String>,
}

/// Logbook listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogbookFilter {
    pub yacht_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub entry_type: Option<LogbookEntryType>,
}

/// Reads the entry type resolver depends on
#[async_trait]
pub trait TripLookup: Send + Sync {
    /// Earliest-starting active booking covering `now`
    async fn find_active_booking(
        &self,
        yacht_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, sqlx::Error>;

    async fn find_entry_by_booking_and_type(
        &self,
        booking_id: Uuid,
        entry_type: LogbookEntryType,
    ) -> Result<Option<LogbookEntry>, sqlx::Error>;
}

/// Full logbook persistence
#[async_trait]
pub trait LogbookStore: TripLookup {
    async fn insert_entry(&self, entry: &LogbookEntry) -> Result<(), sqlx::Error>;

    /// Entries matching `filter`, newest first
    async fn list_entries(&self, filter: &LogbookFilter) -> Result<Vec<LogbookEntry>, sqlx::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_parsing() {
        assert_eq!("return".parse::<LogbookEntryType>().unwrap(), LogbookEntryType::Return);
        assert_eq!(LogbookEntryType::Incident.to_string(), "incident");
        assert!(matches!(
            "Departure".parse::<LogbookEntryType>(),
            Err(LogbookError::InvalidEntryType(_))
        ));
    }
}
