/// Logbook entry creation and listing
use crate::{
    error::{AppResult, LogbookError},
    logbook::{
        EntryClassification, EntryTypeResolver, LogbookEntry, LogbookEntryType, LogbookFilter,
        LogbookStore, NewLogbookEntry, TripLookup,
    },
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Logbook service
pub struct LogbookService<S: LogbookStore + 'static> {
    store: Arc<S>,
    resolver: EntryTypeResolver,
}

impl<S: LogbookStore + 'static> LogbookService<S> {
    pub fn new(store: Arc<S>) -> Self {
        let lookup: Arc<dyn TripLookup> = store.clone();
        Self {
            store,
            resolver: EntryTypeResolver::new(lookup),
        }
    }

    /// Create an entry, inferring its type from the user's active booking
    /// unless the request names one
    pub async fn create_entry(
        &self,
        user_id: Uuid,
        request: NewLogbookEntry,
        now: DateTime<Utc>,
    ) -> AppResult<LogbookEntry> {
        let explicit = request
            .entry_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<LogbookEntryType>)
            .transpose()?;

        let classification = match explicit {
            Some(entry_type) => EntryClassification {
                entry_type,
                booking_id: None,
            },
            None => self.resolver.resolve(request.yacht_id, user_id, now).await?,
        };

        let entry = LogbookEntry {
            id: Uuid::new_v4(),
            yacht_id: request.yacht_id,
            booking_id: classification.booking_id,
            user_id,
            entry_type: classification.entry_type,
            port_engine_hours: request.port_engine_hours,
            starboard_engine_hours: request.starboard_engine_hours,
            fuel_liters: request.fuel_liters,
            notes: request.notes,
            created_at: now,
        };

        if let Err(e) = self.store.insert_entry(&entry).await {
            return Err(match (classification.booking_id, is_unique_violation(&e)) {
                (Some(booking_id), true) => {
                    warn!(
                        "Rejected duplicate {} entry for booking {}",
                        entry.entry_type, booking_id
                    );
                    LogbookError::Conflict {
                        booking_id,
                        entry_type: entry.entry_type,
                    }
                    .into()
                }
                _ => e.into(),
            });
        }

        info!(
            "Created {} logbook entry {} on yacht {}",
            entry.entry_type, entry.id, entry.yacht_id
        );

        Ok(entry)
    }

    pub async fn list_entries(&self, filter: &LogbookFilter) -> AppResult<Vec<LogbookEntry>> {
        Ok(self.store.list_entries(filter).await?)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
