/// Logbook entry type inference from booking state
use crate::{
    error::LogbookError,
    logbook::{LogbookEntryType, TripLookup},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Per-booking trip logging progress. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    NoDeparture,
    HasDeparture,
    HasDepartureAndReturn,
}

impl TripState {
    /// A return without a departure still counts as no departure
    pub fn from_flags(has_departure: bool, has_return: bool) -> Self {
        match (has_departure, has_return) {
            (false, _) => TripState::NoDeparture,
            (true, false) => TripState::HasDeparture,
            (true, true) => TripState::HasDepartureAndReturn,
        }
    }

    /// Type of the next entry logged in this state
    pub fn next_entry_type(self) -> LogbookEntryType {
        match self {
            TripState::NoDeparture => LogbookEntryType::Departure,
            TripState::HasDeparture => LogbookEntryType::Return,
            TripState::HasDepartureAndReturn => LogbookEntryType::General,
        }
    }
}

/// Classify the next entry of a booking from what it already has
pub fn classify(has_departure: bool, has_return: bool) -> LogbookEntryType {
    TripState::from_flags(has_departure, has_return).next_entry_type()
}

/// Inferred entry type, tagged with the booking it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryClassification {
    pub entry_type: LogbookEntryType,
    pub booking_id: Option<Uuid>,
}

/// Infers whether a new entry is a departure, return or general note.
///
/// This is a snapshot read: two concurrent first entries for one booking
/// can both be classified as departures. The store rejects the second
/// insert through its (booking_id, entry_type) uniqueness index.
#[derive(Clone)]
pub struct EntryTypeResolver {
    store: Arc<dyn TripLookup>,
}

impl EntryTypeResolver {
    pub fn new(store: Arc<dyn TripLookup>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        yacht_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EntryClassification, LogbookError> {
        let booking = self
            .store
            .find_active_booking(yacht_id, user_id, now)
            .await
            .map_err(LogbookError::LookupFailed)?;

        let Some(booking) = booking else {
            debug!("No active booking for user {} on yacht {}, general entry", user_id, yacht_id);
            return Ok(EntryClassification {
                entry_type: LogbookEntryType::General,
                booking_id: None,
            });
        };

        let has_departure = self.has_entry(booking.id, LogbookEntryType::Departure).await?;
        // The return lookup only matters once the trip has departed
        let has_return = has_departure && self.has_entry(booking.id, LogbookEntryType::Return).await?;

        let entry_type = classify(has_departure, has_return);
        debug!("Booking {} classified next entry as {}", booking.id, entry_type);

        Ok(EntryClassification {
            entry_type,
            booking_id: Some(booking.id),
        })
    }

    async fn has_entry(&self, booking_id: Uuid, entry_type: LogbookEntryType) -> Result<bool, LogbookError> {
        self.store
            .find_entry_by_booking_and_type(booking_id, entry_type)
            .await
            .map(|entry| entry.is_some())
            .map_err(LogbookError::LookupFailed)
    }
}
