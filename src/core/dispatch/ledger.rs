use super::deduplicator::{DedupReason, PassDeduplicator};
use super::event::{Event, NewEvent, Observation};
use super::store::EventStore;
use crate::core::error::StoreResult;
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerStats {
    pub events_accepted: u64,
    pub duplicates_suppressed: u64,
    pub unknown_dropped: u64,
}

/// Deduplicator + store, driven as one unit.
///
/// Callers hold it behind a single lock: one evaluate-append-record sequence
/// at a time, in acceptance order. The in-memory map is only updated after
/// the durable append succeeded.
pub struct PassLedger {
    dedup: PassDeduplicator,
    store: EventStore,
    append_retries: u32,
    stats: LedgerStats,
}

impl PassLedger {
    pub fn new(dedup: PassDeduplicator, store: EventStore, append_retries: u32) -> Self {
        Self {
            dedup,
            store,
            append_retries,
            stats: LedgerStats::default(),
        }
    }

    /// Reloads the last-seen map from events still inside the window at `now`,
    /// so suppression holds across restarts. Returns the number of identifiers.
    pub fn restore(&mut self, now: NaiveDateTime) -> StoreResult<usize> {
        let since = now
            .checked_sub_signed(self.dedup.window())
            .unwrap_or(NaiveDateTime::MIN);
        let entries = self.store.last_seen_since(since)?;
        let restored = entries.len();
        self.dedup.seed(entries);
        if restored > 0 {
            info!("🔁 Restored {} recent truck(s) into the suppression window", restored);
        }
        Ok(restored)
    }

    /// Runs one observation through dedup and, if accepted, the durable append.
    ///
    /// Accepting also trims identifiers whose window has run out, so the map
    /// only holds trucks that can still be suppressed.
    pub fn ingest(
        &mut self,
        observation: &Observation,
        now: NaiveDateTime,
    ) -> StoreResult<Option<Event>> {
        match self.dedup.evaluate(observation, now) {
            DedupReason::UnknownId => {
                self.stats.unknown_dropped += 1;
                debug!("Unidentified {} truck dropped", observation.label);
                return Ok(None);
            }
            DedupReason::WithinWindow => {
                self.stats.duplicates_suppressed += 1;
                debug!("Truck {} suppressed (inside window)", observation.identifier);
                return Ok(None);
            }
            DedupReason::FirstSighting | DedupReason::WindowElapsed => {}
        }

        let new_event = self.dedup.synthesize(observation, now);
        let id = self.append_with_retry(&new_event)?;
        self.dedup.prune(now);
        self.dedup.record(&new_event.identifier, now);
        self.stats.events_accepted += 1;

        info!(
            "🚛 Pass #{}: truck {} {} at {} / {} ({})",
            id,
            new_event.identifier,
            new_event.label,
            new_event.site,
            new_event.shift,
            new_event.source
        );
        Ok(Some(new_event.into_stored(id)))
    }

    fn append_with_retry(&self, event: &NewEvent) -> StoreResult<i64> {
        let mut attempt = 0;
        loop {
            match self.store.append(event) {
                Ok(id) => return Ok(id),
                Err(e) if attempt < self.append_retries => {
                    attempt += 1;
                    warn!(
                        "⚠️ Append for truck {} failed ({}), retry {}/{}",
                        event.identifier, e, attempt, self.append_retries
                    );
                }
                Err(e) => {
                    error!("❌ Event for truck {} not stored: {}", event.identifier, e);
                    return Err(e);
                }
            }
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn deduplicator(&self) -> &PassDeduplicator {
        &self.dedup
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
    }
}
