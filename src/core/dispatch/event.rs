//! Observation / event data model

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier recorded when no fixed-length number could be read.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Load state of a haul truck, as classified by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CargoLabel {
    Empty,
    Rich,
    Waste,
    Mixed,
}

impl CargoLabel {
    pub const ALL: [CargoLabel; 4] = [
        CargoLabel::Empty,
        CargoLabel::Rich,
        CargoLabel::Waste,
        CargoLabel::Mixed,
    ];

    /// Maps a detector class name onto the closed label set.
    /// Accepts the English names and the French names used on site.
    pub fn from_class_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "empty" | "vide" => Some(CargoLabel::Empty),
            "rich" | "riche" => Some(CargoLabel::Rich),
            "waste" | "sterile" | "stérile" => Some(CargoLabel::Waste),
            "mixed" | "mixte" => Some(CargoLabel::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CargoLabel::Empty => "EMPTY",
            CargoLabel::Rich => "RICH",
            CargoLabel::Waste => "WASTE",
            CargoLabel::Mixed => "MIXED",
        }
    }

    pub fn parse(stored: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.as_str() == stored)
    }
}

impl fmt::Display for CargoLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational context chosen by the operator, attached to every observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalContext {
    pub site: String,
    pub shift: String,
    /// Logical camera / checkpoint name
    pub source: String,
}

impl OperationalContext {
    pub fn new(
        site: impl Into<String>,
        shift: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            shift: shift.into(),
            source: source.into(),
        }
    }
}

/// One candidate sighting from a sampled frame. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub label: CargoLabel,
    pub identifier: String,
    pub confidence: f32,
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub site: String,
    pub shift: String,
}

impl Observation {
    pub fn is_identified(&self) -> bool {
        self.identifier != UNKNOWN_IDENTIFIER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced,
}

impl SyncState {
    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 {
            SyncState::Pending
        } else {
            SyncState::Synced
        }
    }

    pub fn as_flag(&self) -> i64 {
        match self {
            SyncState::Pending => 0,
            SyncState::Synced => 1,
        }
    }
}

/// Accepted pass, not yet persisted (no id, implicitly pending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub identifier: String,
    pub label: CargoLabel,
    pub source: String,
    pub site: String,
    pub shift: String,
    pub timestamp: NaiveDateTime,
    pub tonnage: u32,
    pub created_at: NaiveDateTime,
}

impl NewEvent {
    pub fn from_observation(
        observation: &Observation,
        tonnage: u32,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            identifier: observation.identifier.clone(),
            label: observation.label,
            source: observation.source.clone(),
            site: observation.site.clone(),
            shift: observation.shift.clone(),
            timestamp: observation.timestamp,
            tonnage,
            created_at,
        }
    }

    pub fn into_stored(self, id: i64) -> Event {
        Event {
            id,
            identifier: self.identifier,
            label: self.label,
            source: self.source,
            site: self.site,
            shift: self.shift,
            timestamp: self.timestamp,
            tonnage: self.tonnage,
            sync_state: SyncState::Pending,
            created_at: self.created_at,
        }
    }
}

/// A persisted truck pass, the unit of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub identifier: String,
    pub label: CargoLabel,
    pub source: String,
    pub site: String,
    pub shift: String,
    /// Capture time
    pub timestamp: NaiveDateTime,
    pub tonnage: u32,
    pub sync_state: SyncState,
    /// Acceptance / persistence time, the clock the suppression window runs on
    pub created_at: NaiveDateTime,
}

impl Event {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}
