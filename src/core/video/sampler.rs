use std::sync::{Arc, Mutex};

/// Picks 1 frame out of every `frame_skip` for full inference.
///
/// Counter-driven rather than timer-driven, so the choice depends only on the
/// frame index and never on wall-clock jitter.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    frame_skip: u64,
}

impl FrameSampler {
    pub fn new(frame_skip: u64) -> Self {
        Self {
            frame_skip: frame_skip.max(1),
        }
    }

    pub fn frame_skip(&self) -> u64 {
        self.frame_skip
    }

    /// `count` is 1-based: with a skip of 4, counts 4, 8, 12, ... are processed.
    pub fn should_process(&self, count: u64) -> bool {
        count != 0 && count % self.frame_skip == 0
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Shared frame counter, incremented from whichever thread delivers frames.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    count: Arc<Mutex<u64>>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the new count (first frame -> 1).
    pub fn next(&self) -> u64 {
        let mut count = match self.count.lock() {
            Ok(count) => count,
            Err(poisoned) => poisoned.into_inner(),
        };
        *count += 1;
        *count
    }

    pub fn current(&self) -> u64 {
        match self.count.lock() {
            Ok(count) => *count,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
