//! Dashboard figures, pure reductions over stored events.

use crate::core::dispatch::{CargoLabel, Event};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub total_tonnage: u64,
    /// Number of passes
    pub cycles: usize,
    pub active_sites: usize,
    pub distinct_trucks: usize,
    pub tonnage_by_site: BTreeMap<String, u64>,
    pub tonnage_by_shift: BTreeMap<String, u64>,
    pub tonnage_by_day: BTreeMap<NaiveDate, u64>,
    pub passes_by_label: BTreeMap<CargoLabel, usize>,
}

impl DispatchSummary {
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = DispatchSummary {
            cycles: events.len(),
            ..Default::default()
        };
        let mut trucks = BTreeSet::new();

        for event in events {
            let tonnage = event.tonnage as u64;
            summary.total_tonnage += tonnage;
            *summary.tonnage_by_site.entry(event.site.clone()).or_default() += tonnage;
            *summary.tonnage_by_shift.entry(event.shift.clone()).or_default() += tonnage;
            *summary.tonnage_by_day.entry(event.date()).or_default() += tonnage;
            *summary.passes_by_label.entry(event.label).or_default() += 1;
            trucks.insert(event.identifier.as_str());
        }

        summary.active_sites = summary.tonnage_by_site.len();
        summary.distinct_trucks = trucks.len();
        summary
    }
}
