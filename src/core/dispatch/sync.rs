//! Upstream sync outbox
//!
//! Transport is the host's business: it gets a JSON batch of pending events
//! and acknowledges the batch once delivered.

use super::event::Event;
use super::store::EventStore;
use crate::core::error::StoreResult;
use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    pub prepared_at: NaiveDateTime,
    pub events: Vec<Event>,
}

impl SyncBatch {
    /// Oldest `limit` pending events.
    pub fn collect(
        store: &EventStore,
        limit: usize,
        prepared_at: NaiveDateTime,
    ) -> StoreResult<Self> {
        let mut events = store.list_pending()?;
        events.truncate(limit);
        Ok(Self { prepared_at, events })
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.events.iter().map(|e| e.id).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Marks every event of the batch synced. Safe to call twice.
    pub fn acknowledge(&self, store: &EventStore) -> StoreResult<usize> {
        for id in self.ids() {
            store.mark_synced(id)?;
        }
        if !self.is_empty() {
            info!("📤 {} event(s) acknowledged upstream", self.events.len());
        }
        Ok(self.events.len())
    }
}
