use super::event::{NewEvent, Observation};
use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashMap;

/// 去重决策结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DedupReason {
    FirstSighting,  // 首次出现，保留
    WindowElapsed,  // 超过抑制窗口，保留
    UnknownId,      // 编号未识别，丢弃
    WithinWindow,   // 窗口内重复，丢弃
}

impl DedupReason {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DedupReason::FirstSighting | DedupReason::WindowElapsed)
    }
}

/// Per-truck suppression: one event per identifier per window.
pub struct PassDeduplicator {
    /// identifier -> created_at of its last accepted event
    last_seen: HashMap<String, NaiveDateTime>,
    window: TimeDelta,
    tonnage: u32,
}

impl PassDeduplicator {
    pub fn new(window: TimeDelta, tonnage: u32) -> Self {
        Self {
            last_seen: HashMap::new(),
            window,
            tonnage,
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Decides without recording. The window is closed-open: a gap of exactly
    /// `window` is eligible again.
    pub fn evaluate(&self, observation: &Observation, now: NaiveDateTime) -> DedupReason {
        if !observation.is_identified() {
            return DedupReason::UnknownId;
        }
        match self.last_seen.get(&observation.identifier) {
            None => DedupReason::FirstSighting,
            Some(&last) if now - last < self.window => DedupReason::WithinWindow,
            Some(_) => DedupReason::WindowElapsed,
        }
    }

    /// Builds the event an accepted observation turns into.
    pub fn synthesize(&self, observation: &Observation, now: NaiveDateTime) -> NewEvent {
        NewEvent::from_observation(observation, self.tonnage, now)
    }

    pub fn record(&mut self, identifier: &str, at: NaiveDateTime) {
        self.last_seen.insert(identifier.to_string(), at);
    }

    /// Evaluate and, if accepted, record in one step.
    pub fn accept(&mut self, observation: &Observation, now: NaiveDateTime) -> Option<NewEvent> {
        if !self.evaluate(observation, now).is_accepted() {
            return None;
        }
        self.record(&observation.identifier, now);
        Some(self.synthesize(observation, now))
    }

    /// Restores the map from stored `(identifier, created_at)` pairs, keeping
    /// the latest time per identifier.
    pub fn seed<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, NaiveDateTime)>,
    {
        for (identifier, at) in entries {
            let slot = self.last_seen.entry(identifier).or_insert(at);
            if at > *slot {
                *slot = at;
            }
        }
    }

    pub fn last_seen(&self, identifier: &str) -> Option<NaiveDateTime> {
        self.last_seen.get(identifier).copied()
    }

    /// Drops entries that can no longer suppress anything at `now`.
    pub fn prune(&mut self, now: NaiveDateTime) {
        let window = self.window;
        self.last_seen.retain(|_, last| now - *last < window);
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::event::{CargoLabel, UNKNOWN_IDENTIFIER};
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn observation(identifier: &str, at: NaiveDateTime) -> Observation {
        Observation {
            label: CargoLabel::Rich,
            identifier: identifier.to_string(),
            confidence: 0.9,
            timestamp: at,
            source: "Gate-1".to_string(),
            site: "Site-A".to_string(),
            shift: "Morning".to_string(),
        }
    }

    fn dedup() -> PassDeduplicator {
        PassDeduplicator::new(TimeDelta::minutes(5), 200)
    }

    #[test]
    fn test_first_sighting_accepted() {
        let mut dedup = dedup();
        let event = dedup.accept(&observation("123", t0()), t0()).unwrap();

        assert_eq!(event.identifier, "123");
        assert_eq!(event.label, CargoLabel::Rich);
        assert_eq!(event.tonnage, 200);
        assert_eq!(event.created_at, t0());
        assert_eq!(dedup.last_seen("123"), Some(t0()));
    }

    #[test]
    fn test_unknown_never_accepted() {
        let mut dedup = dedup();
        for minutes in [0, 10, 60] {
            let at = t0() + TimeDelta::minutes(minutes);
            assert!(dedup.accept(&observation(UNKNOWN_IDENTIFIER, at), at).is_none());
        }
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_window_boundary_closed_open() {
        let mut dedup = dedup();
        assert!(dedup.accept(&observation("123", t0()), t0()).is_some());

        let almost = t0() + TimeDelta::seconds(299);
        assert_eq!(
            dedup.evaluate(&observation("123", almost), almost),
            DedupReason::WithinWindow
        );
        assert!(dedup.accept(&observation("123", almost), almost).is_none());

        // 被抑制的观测不刷新时间
        assert_eq!(dedup.last_seen("123"), Some(t0()));

        let exactly = t0() + TimeDelta::minutes(5);
        assert_eq!(
            dedup.evaluate(&observation("123", exactly), exactly),
            DedupReason::WindowElapsed
        );
        assert!(dedup.accept(&observation("123", exactly), exactly).is_some());
    }

    #[test]
    fn test_same_frame_twin_boxes() {
        let mut dedup = dedup();
        let first = dedup.accept(&observation("123", t0()), t0());
        let second = dedup.accept(&observation("123", t0()), t0());
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn test_identifiers_independent() {
        let mut dedup = dedup();
        assert!(dedup.accept(&observation("123", t0()), t0()).is_some());
        assert!(dedup.accept(&observation("456", t0()), t0()).is_some());
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_evaluate_does_not_record() {
        let dedup = dedup();
        assert_eq!(
            dedup.evaluate(&observation("123", t0()), t0()),
            DedupReason::FirstSighting
        );
        assert!(dedup.last_seen("123").is_none());
    }

    #[test]
    fn test_seed_keeps_latest() {
        let mut dedup = dedup();
        dedup.seed(vec![
            ("123".to_string(), t0() + TimeDelta::minutes(2)),
            ("123".to_string(), t0()),
        ]);
        assert_eq!(dedup.last_seen("123"), Some(t0() + TimeDelta::minutes(2)));

        let at = t0() + TimeDelta::minutes(6);
        assert!(dedup.accept(&observation("123", at), at).is_none());
    }

    #[test]
    fn test_prune_expired() {
        let mut dedup = dedup();
        dedup.record("123", t0());
        dedup.record("456", t0() + TimeDelta::minutes(4));
        dedup.prune(t0() + TimeDelta::minutes(5));
        assert!(dedup.last_seen("123").is_none());
        assert!(dedup.last_seen("456").is_some());
    }
}
