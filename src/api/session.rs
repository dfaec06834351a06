//! 调度会话 - 从开流到停流

use crate::core::clock::{Clock, SystemClock};
use crate::core::config::DispatchConfig;
use crate::core::detection::{DetectionExtractor, ObjectDetector, TextRecognizer};
use crate::core::dispatch::{
    event_channel, DispatchPipeline, Event, EventFilter, EventReceiver, EventStore,
    OperationalContext, PassDeduplicator, PassLedger, PipelineStats, StreamFeed, SyncBatch,
};
use crate::core::error::{CapabilityError, DispatchError, DispatchResult};
use crate::core::report::DispatchSummary;
use crate::core::video::{Frame, FrameSampler, FrameSource};
use log::{error, info};
use std::path::Path;
use std::sync::Arc;

/// Outcome of a pull loop that reached the end of its source.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PullSummary {
    pub frames_read: u64,
    pub events_stored: usize,
}

/// Owns everything one detection session needs: the pipeline state, the
/// store handle and the session log. Created at stream start, dropped at stop.
///
/// ```ignore
/// let session = DispatchSession::create(config, recognizer, |path| load_tflite(path))?;
/// let ctx = OperationalContext::new("Guelb El Rhein", "Matin", "Android_Internal");
/// session.run_pull_loop(&mut camera, &ctx)?;
/// ```
pub struct DispatchSession {
    config: DispatchConfig,
    pipeline: Arc<DispatchPipeline>,
}

impl DispatchSession {
    /// Validates the config, loads the detector, opens the store and restores
    /// the suppression window. A missing or unloadable model is fatal.
    pub fn create<F>(
        config: DispatchConfig,
        recognizer: Arc<dyn TextRecognizer>,
        load_detector: F,
    ) -> DispatchResult<Self>
    where
        F: FnOnce(&Path) -> Result<Arc<dyn ObjectDetector>, CapabilityError>,
    {
        Self::create_with_clock(config, recognizer, load_detector, Arc::new(SystemClock))
    }

    pub fn create_with_clock<F>(
        config: DispatchConfig,
        recognizer: Arc<dyn TextRecognizer>,
        load_detector: F,
        clock: Arc<dyn Clock>,
    ) -> DispatchResult<Self>
    where
        F: FnOnce(&Path) -> Result<Arc<dyn ObjectDetector>, CapabilityError>,
    {
        info!("🎬 DispatchSession: starting with {:?}", config);
        config.validate()?;

        if !config.model_path.exists() {
            error!("❌ Detection model not found at {:?}", config.model_path);
            return Err(DispatchError::ModelLoadFailed(format!(
                "model not found at {:?}",
                config.model_path
            )));
        }
        let detector = load_detector(&config.model_path).map_err(|e| {
            error!("❌ Failed to load detection model: {}", e);
            DispatchError::ModelLoadFailed(e.to_string())
        })?;
        info!("✅ Detection model loaded from {:?}", config.model_path);

        let store = EventStore::open(&config.db_path)?;
        let ledger = PassLedger::new(
            PassDeduplicator::new(config.suppression_window(), config.nominal_tonnage),
            store,
            config.append_retries,
        );
        let extractor = DetectionExtractor::new(detector, recognizer, config.input_size);
        let pipeline = Arc::new(DispatchPipeline::new(
            FrameSampler::new(config.frame_skip),
            extractor,
            config.confidence_threshold,
            ledger,
            clock,
        ));
        pipeline.restore()?;

        Ok(Self { config, pipeline })
    }

    /// One step of the synchronous pull loop.
    pub fn process_frame(
        &self,
        frame: &Frame,
        context: &OperationalContext,
    ) -> DispatchResult<Vec<Event>> {
        self.pipeline.process_frame(frame, context)
    }

    /// Recorded footage: parallel extraction, ordered persistence.
    pub fn process_batch(
        &self,
        frames: &[Frame],
        context: &OperationalContext,
    ) -> DispatchResult<Vec<Event>> {
        self.pipeline.process_batch(frames, context)
    }

    /// Reads until end of stream. Stops early, with the error, on a source or
    /// storage failure.
    pub fn run_pull_loop(
        &self,
        source: &mut dyn FrameSource,
        context: &OperationalContext,
    ) -> DispatchResult<PullSummary> {
        let mut summary = PullSummary::default();
        loop {
            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    error!("❌ Frame source failed after {} frames: {}", summary.frames_read, e);
                    return Err(DispatchError::Source(e));
                }
            };
            summary.frames_read += 1;
            summary.events_stored += self.pipeline.process_frame(&frame, context)?.len();
        }
        info!(
            "🏁 Pull loop finished: {} frames, {} events",
            summary.frames_read, summary.events_stored
        );
        Ok(summary)
    }

    /// Opens the callback-driven path: hand the feed to the capability's
    /// frame callback, read events from the receiver.
    pub fn start_stream(&self, context: OperationalContext) -> (StreamFeed, EventReceiver) {
        let (sender, receiver) = event_channel(self.config.queue_capacity);
        info!(
            "📡 Stream opened for {} / {} ({})",
            context.site, context.shift, context.source
        );
        (
            StreamFeed::new(self.pipeline.clone(), context, sender),
            EventReceiver::new(receiver),
        )
    }

    /// Events accepted during this session.
    pub fn events(&self) -> Vec<Event> {
        self.pipeline.events()
    }

    /// Every stored event, all sessions included.
    pub fn list_all(&self) -> DispatchResult<Vec<Event>> {
        self.pipeline.with_store(|store| store.list_all())
    }

    pub fn query(&self, filter: &EventFilter) -> DispatchResult<Vec<Event>> {
        self.pipeline.with_store(|store| store.query(filter))
    }

    pub fn mark_synced(&self, id: i64) -> DispatchResult<()> {
        self.pipeline.with_store(|store| store.mark_synced(id))
    }

    pub fn pending_sync_batch(&self, limit: usize) -> DispatchResult<SyncBatch> {
        let prepared_at = self.pipeline.clock().now();
        self.pipeline
            .with_store(|store| SyncBatch::collect(store, limit, prepared_at))
    }

    pub fn acknowledge_sync(&self, batch: &SyncBatch) -> DispatchResult<usize> {
        self.pipeline.with_store(|store| batch.acknowledge(store))
    }

    pub fn summary(&self, filter: &EventFilter) -> DispatchResult<DispatchSummary> {
        Ok(DispatchSummary::from_events(&self.query(filter)?))
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl Drop for DispatchSession {
    fn drop(&mut self) {
        let stats = self.pipeline.stats();
        info!(
            "🗑️ DispatchSession: stopped ({} frames, {} events)",
            stats.frames_seen, stats.events_accepted
        );
    }
}
