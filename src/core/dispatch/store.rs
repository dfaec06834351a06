//! Event Store Module
//!
//! Append-only SQLite log of accepted passes. Local file, no network.

use super::event::{CargoLabel, Event, NewEvent, SyncState};
use crate::core::error::{StoreError, StoreResult};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = "SELECT id, identifier, label, source, site, shift, captured_at, \
                              tonnage, sync, created_at FROM detections";

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(text: &str) -> StoreResult<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)?)
}

/// Optional constraints for [`EventStore::query`]; dates are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub site: Option<String>,
    pub shift: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        let date = event.date();
        self.site.as_ref().map_or(true, |s| *s == event.site)
            && self.shift.as_ref().map_or(true, |s| *s == event.shift)
            && self.from.map_or(true, |from| date >= from)
            && self.to.map_or(true, |to| date <= to)
    }
}

/// Row as stored, before timestamp and label parsing.
struct StoredRow {
    id: i64,
    identifier: String,
    label: String,
    source: String,
    site: String,
    shift: String,
    captured_at: String,
    tonnage: u32,
    sync: i64,
    created_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            identifier: row.get(1)?,
            label: row.get(2)?,
            source: row.get(3)?,
            site: row.get(4)?,
            shift: row.get(5)?,
            captured_at: row.get(6)?,
            tonnage: row.get(7)?,
            sync: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_event(self) -> StoreResult<Event> {
        let label = CargoLabel::parse(&self.label).ok_or(StoreError::UnknownLabel(self.label))?;
        Ok(Event {
            id: self.id,
            identifier: self.identifier,
            label,
            source: self.source,
            site: self.site,
            shift: self.shift,
            timestamp: parse_ts(&self.captured_at)?,
            tonnage: self.tonnage,
            sync_state: SyncState::from_flag(self.sync),
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Opens (creating if needed) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        // 锁竞争时等待而不是立即失败
        conn.busy_timeout(Duration::from_secs(2))?;

        let store = Self { conn };
        store.init_schema()?;
        info!("💾 EventStore opened at {:?} ({} events)", path, store.count()?);
        Ok(store)
    }

    /// In-memory store (tests, dry runs).
    pub fn in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS detections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                identifier TEXT NOT NULL,
                label TEXT NOT NULL,
                source TEXT NOT NULL,
                site TEXT NOT NULL,
                shift TEXT NOT NULL,
                tonnage INTEGER NOT NULL,
                sync INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_identifier
                ON detections(identifier, created_at);
            CREATE INDEX IF NOT EXISTS idx_detections_sync ON detections(sync);
            CREATE INDEX IF NOT EXISTS idx_detections_date ON detections(date);
            "#,
        )?;
        Ok(())
    }

    /// Persists the event as pending and returns its id.
    ///
    /// A single INSERT: SQLite makes the whole row visible or none of it.
    pub fn append(&self, event: &NewEvent) -> StoreResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO detections
                (date, captured_at, identifier, label, source, site, shift,
                 tonnage, sync, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)
            "#,
            params![
                event.timestamp.format(DATE_FORMAT).to_string(),
                format_ts(&event.timestamp),
                event.identifier,
                event.label.as_str(),
                event.source,
                event.site,
                event.shift,
                event.tonnage,
                format_ts(&event.created_at),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Stored event {} for truck {}", id, event.identifier);
        Ok(id)
    }

    /// All events, in insertion order.
    pub fn list_all(&self) -> StoreResult<Vec<Event>> {
        self.select(&format!("{} ORDER BY id ASC", SELECT_COLUMNS), [])
    }

    pub fn list_pending(&self) -> StoreResult<Vec<Event>> {
        self.select(
            &format!("{} WHERE sync = 0 ORDER BY id ASC", SELECT_COLUMNS),
            [],
        )
    }

    pub fn query(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let sql = format!(
            "{} WHERE (?1 IS NULL OR site = ?1) AND (?2 IS NULL OR shift = ?2) \
             AND (?3 IS NULL OR date >= ?3) AND (?4 IS NULL OR date <= ?4) ORDER BY id ASC",
            SELECT_COLUMNS
        );
        let from = filter.from.map(|d| d.format(DATE_FORMAT).to_string());
        let to = filter.to.map(|d| d.format(DATE_FORMAT).to_string());
        self.select(&sql, params![filter.site, filter.shift, from, to])
    }

    /// Latest `created_at` per identifier among events created at or after `since`.
    pub fn last_seen_since(
        &self,
        since: NaiveDateTime,
    ) -> StoreResult<Vec<(String, NaiveDateTime)>> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, MAX(created_at) FROM detections \
             WHERE created_at >= ?1 GROUP BY identifier",
        )?;
        let rows = stmt
            .query_map([format_ts(&since)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(identifier, created_at)| Ok((identifier, parse_ts(&created_at)?)))
            .collect()
    }

    /// pending -> synced. Already synced is a no-op; an unknown id is an error.
    pub fn mark_synced(&self, id: i64) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("UPDATE detections SET sync = 1 WHERE id = ?1 AND sync = 0", [id])?;
        if changed == 0 {
            let exists: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM detections WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(StoreError::EventNotFound(id));
            }
        }
        Ok(())
    }

    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn select<P: rusqlite::Params>(&self, sql: &str, params: P) -> StoreResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, StoredRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StoredRow::into_event).collect()
    }

    /// Gets the underlying connection (for module-level access)
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(8, 0, 0, 250)
            .unwrap()
    }

    fn new_event(identifier: &str, site: &str, shift: &str, at: NaiveDateTime) -> NewEvent {
        NewEvent {
            identifier: identifier.to_string(),
            label: CargoLabel::Rich,
            source: "Gate-1".to_string(),
            site: site.to_string(),
            shift: shift.to_string(),
            timestamp: at,
            tonnage: 200,
            created_at: at + TimeDelta::milliseconds(5),
        }
    }

    #[test]
    fn test_create_in_memory_store() {
        let store = EventStore::in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let store = EventStore::in_memory().unwrap();
        let a = store.append(&new_event("123", "Site-A", "Morning", t0())).unwrap();
        let b = store.append(&new_event("456", "Site-A", "Morning", t0())).unwrap();
        assert!(b > a);

        let events = store.list_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, a);
        assert_eq!(events[0].identifier, "123");
        assert_eq!(events[0].sync_state, SyncState::Pending);
        assert_eq!(events[0].timestamp, t0());
        assert_eq!(events[0].created_at, t0() + TimeDelta::milliseconds(5));
        assert_eq!(events[1].id, b);
    }

    #[test]
    fn test_date_column_derived_from_capture_time() {
        let store = EventStore::in_memory().unwrap();
        store.append(&new_event("123", "Site-A", "Morning", t0())).unwrap();
        let date: String = store
            .connection()
            .query_row("SELECT date FROM detections", [], |row| row.get(0))
            .unwrap();
        assert_eq!(date, "2024-03-01");
    }

    #[test]
    fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.db");

        let id = {
            let store = EventStore::open(&path).unwrap();
            store.append(&new_event("123", "Site-A", "Morning", t0())).unwrap()
        };

        let store = EventStore::open(&path).unwrap();
        let events = store.list_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].identifier, "123");
    }

    #[test]
    fn test_mark_synced_idempotent() {
        let store = EventStore::in_memory().unwrap();
        let id = store.append(&new_event("123", "Site-A", "Morning", t0())).unwrap();

        store.mark_synced(id).unwrap();
        store.mark_synced(id).unwrap();

        let events = store.list_all().unwrap();
        assert_eq!(events[0].sync_state, SyncState::Synced);
        assert!(store.list_pending().unwrap().is_empty());
    }

    #[test]
    fn test_mark_synced_unknown_id() {
        let store = EventStore::in_memory().unwrap();
        let result = store.mark_synced(42);
        assert!(matches!(result, Err(StoreError::EventNotFound(42))));
    }

    #[test]
    fn test_query_filters() {
        let store = EventStore::in_memory().unwrap();
        let next_day = t0() + TimeDelta::days(1);
        store.append(&new_event("101", "Site-A", "Morning", t0())).unwrap();
        store.append(&new_event("102", "Site-B", "Morning", t0())).unwrap();
        store.append(&new_event("103", "Site-A", "Night", next_day)).unwrap();

        let all = store.query(&EventFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let site_a = store
            .query(&EventFilter {
                site: Some("Site-A".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(site_a.len(), 2);

        let second_day = store
            .query(&EventFilter {
                from: Some(next_day.date()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(second_day.len(), 1);
        assert_eq!(second_day[0].identifier, "103");

        let filter = EventFilter {
            site: Some("Site-A".to_string()),
            shift: Some("Morning".to_string()),
            to: Some(t0().date()),
            ..Default::default()
        };
        let narrowed = store.query(&filter).unwrap();
        assert_eq!(narrowed.len(), 1);
        assert!(narrowed.iter().all(|e| filter.matches(e)));
    }

    #[test]
    fn test_last_seen_since() {
        let store = EventStore::in_memory().unwrap();
        store.append(&new_event("123", "Site-A", "Morning", t0())).unwrap();
        store
            .append(&new_event("123", "Site-A", "Morning", t0() + TimeDelta::minutes(6)))
            .unwrap();
        store.append(&new_event("456", "Site-A", "Morning", t0())).unwrap();

        let recent = store.last_seen_since(t0() + TimeDelta::minutes(1)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].0, "123");
        assert_eq!(
            recent[0].1,
            t0() + TimeDelta::minutes(6) + TimeDelta::milliseconds(5)
        );
    }

    #[test]
    fn test_corrupted_label_reported() {
        let store = EventStore::in_memory().unwrap();
        store.append(&new_event("123", "Site-A", "Morning", t0())).unwrap();
        store
            .connection()
            .execute("UPDATE detections SET label = 'GOLD'", [])
            .unwrap();
        assert!(matches!(store.list_all(), Err(StoreError::UnknownLabel(_))));
    }
}
