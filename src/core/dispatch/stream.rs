//! Callback-driven front-end
//!
//! The camera capability calls [`StreamFeed::on_frame`] on its own thread.
//! Events are made durable there, under the ledger lock, and only then queued
//! for the consumer; losing the consumer never loses a stored event.

use super::event::{Event, OperationalContext};
use super::pipeline::DispatchPipeline;
use crate::core::error::{DispatchError, DispatchResult};
use crate::core::video::{Frame, RawFrame};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

pub fn event_channel(capacity: Option<usize>) -> (Sender<Event>, Receiver<Event>) {
    match capacity {
        Some(capacity) => channel::bounded(capacity),
        None => channel::unbounded(),
    }
}

/// Producer handle, cloned into the capability's frame callback.
#[derive(Clone)]
pub struct StreamFeed {
    pipeline: Arc<DispatchPipeline>,
    context: OperationalContext,
    sender: Sender<Event>,
}

impl StreamFeed {
    pub fn new(
        pipeline: Arc<DispatchPipeline>,
        context: OperationalContext,
        sender: Sender<Event>,
    ) -> Self {
        Self {
            pipeline,
            context,
            sender,
        }
    }

    /// Handles one pushed frame; returns how many events it produced.
    ///
    /// Runs inference and the SQLite append on the calling thread, so a
    /// sampled frame blocks the camera callback for both. With a bounded
    /// queue it also blocks while the queue is full.
    pub fn on_frame(&self, frame: &Frame) -> DispatchResult<usize> {
        let events = self.pipeline.process_frame(frame, &self.context)?;
        let produced = events.len();
        for event in events {
            if self.sender.send(event).is_err() {
                debug!("Event consumer gone, event stays in the store only");
            }
        }
        Ok(produced)
    }

    pub fn on_raw_frame(&self, raw: &RawFrame) -> DispatchResult<usize> {
        self.on_frame(&raw.to_frame())
    }

    pub fn context(&self) -> &OperationalContext {
        &self.context
    }
}

/// Consumer side of the stream (UI / live log).
pub struct EventReceiver {
    receiver: Receiver<Event>,
}

impl EventReceiver {
    pub fn new(receiver: Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Blocks for the next event; `StreamClosed` once every feed is dropped
    /// and the queue is empty.
    pub fn recv(&self) -> DispatchResult<Event> {
        self.receiver.recv().map_err(|_| DispatchError::StreamClosed)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> DispatchResult<Option<Event>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DispatchError::StreamClosed),
        }
    }

    /// Everything currently queued, without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }

    /// Blocking iterator, ends when every feed is dropped.
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.receiver.iter()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
