use super::event::{Event, Observation, OperationalContext};
use super::ledger::{LedgerStats, PassLedger};
use super::store::EventStore;
use crate::core::clock::Clock;
use crate::core::detection::DetectionExtractor;
use crate::core::error::{DispatchError, DispatchResult};
use crate::core::video::{Frame, FrameCounter, FrameSampler};
use log::debug;
use rayon::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard};

/// 管线统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub events_accepted: u64,
    pub duplicates_suppressed: u64,
    pub unknown_dropped: u64,
}

/// Frame -> observations -> events, shared by every front-end.
///
/// Extraction may run on any thread; everything touching the ledger goes
/// through one mutex.
pub struct DispatchPipeline {
    sampler: FrameSampler,
    counter: FrameCounter,
    extractor: DetectionExtractor,
    confidence_threshold: f32,
    ledger: Mutex<PassLedger>,
    clock: Arc<dyn Clock>,
    processed_count: Mutex<u64>,
    /// Accepted events of this session, appended only after a durable write
    log: Mutex<Vec<Event>>,
}

impl DispatchPipeline {
    pub fn new(
        sampler: FrameSampler,
        extractor: DetectionExtractor,
        confidence_threshold: f32,
        ledger: PassLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sampler,
            counter: FrameCounter::new(),
            extractor,
            confidence_threshold,
            ledger: Mutex::new(ledger),
            clock,
            processed_count: Mutex::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Counts the frame and says whether it goes to inference.
    pub fn admit_frame(&self) -> bool {
        let count = self.counter.next();
        let admitted = self.sampler.should_process(count);
        if admitted {
            if let Ok(mut processed) = self.processed_count.lock() {
                *processed += 1;
            }
        }
        admitted
    }

    pub fn observe(&self, frame: &Frame, context: &OperationalContext) -> Vec<Observation> {
        self.extractor
            .extract(frame, self.confidence_threshold, context, self.clock.now())
    }

    /// Deduplicates and persists observations in the given order.
    ///
    /// Stops at the first storage failure: events accepted before it stay
    /// stored and logged, the failing one is reported.
    pub fn commit(&self, observations: &[Observation]) -> DispatchResult<Vec<Event>> {
        if observations.is_empty() {
            return Ok(Vec::new());
        }

        let mut ledger = self.lock_ledger()?;
        let mut accepted = Vec::new();
        for observation in observations {
            let now = self.clock.now();
            let stored = match ledger.ingest(observation, now) {
                Ok(stored) => stored,
                Err(e) => {
                    self.append_to_log(&accepted)?;
                    return Err(e.into());
                }
            };
            if let Some(event) = stored {
                accepted.push(event);
            }
        }
        self.append_to_log(&accepted)?;
        Ok(accepted)
    }

    /// Full step for one incoming frame.
    pub fn process_frame(
        &self,
        frame: &Frame,
        context: &OperationalContext,
    ) -> DispatchResult<Vec<Event>> {
        if !self.admit_frame() {
            return Ok(Vec::new());
        }
        let observations = self.observe(frame, context);
        self.commit(&observations)
    }

    /// Samples in frame order, extracts in parallel, commits in frame order.
    pub fn process_batch(
        &self,
        frames: &[Frame],
        context: &OperationalContext,
    ) -> DispatchResult<Vec<Event>> {
        let sampled: Vec<&Frame> = frames.iter().filter(|_| self.admit_frame()).collect();
        debug!("Batch: {} of {} frames sampled", sampled.len(), frames.len());

        let observations: Vec<Observation> = sampled
            .par_iter()
            .map(|frame| self.observe(frame, context))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        self.commit(&observations)
    }

    pub fn restore(&self) -> DispatchResult<usize> {
        let now = self.clock.now();
        Ok(self.lock_ledger()?.restore(now)?)
    }

    /// Runs `f` against the store while holding the ledger lock.
    pub fn with_store<T, F>(&self, f: F) -> DispatchResult<T>
    where
        F: FnOnce(&EventStore) -> Result<T, crate::core::error::StoreError>,
    {
        let ledger = self.lock_ledger()?;
        Ok(f(ledger.store())?)
    }

    pub fn events(&self) -> Vec<Event> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let ledger_stats = self
            .ledger
            .lock()
            .map(|ledger| ledger.stats())
            .unwrap_or_else(|_| LedgerStats::default());
        let frames_processed = self.processed_count.lock().map(|c| *c).unwrap_or(0);
        PipelineStats {
            frames_seen: self.counter.current(),
            frames_processed,
            events_accepted: ledger_stats.events_accepted,
            duplicates_suppressed: ledger_stats.duplicates_suppressed,
            unknown_dropped: ledger_stats.unknown_dropped,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock_ledger(&self) -> DispatchResult<MutexGuard<'_, PassLedger>> {
        self.ledger
            .lock()
            .map_err(|e| DispatchError::LockPoisoned(format!("ledger: {}", e)))
    }

    fn append_to_log(&self, events: &[Event]) -> DispatchResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut log = self
            .log
            .lock()
            .map_err(|e| DispatchError::LockPoisoned(format!("session log: {}", e)))?;
        log.extend_from_slice(events);
        Ok(())
    }
}
