use super::frame::Frame;
use crate::core::error::CapabilityError;
use std::collections::VecDeque;

/// Pull-style frame source (camera capture, recorded file).
pub trait FrameSource {
    /// `Ok(None)` marks the end of the stream.
    fn read(&mut self) -> Result<Option<Frame>, CapabilityError>;
}

/// In-memory source replaying a fixed list of frames.
pub struct VecFrameSource {
    frames: VecDeque<Frame>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn read(&mut self) -> Result<Option<Frame>, CapabilityError> {
        Ok(self.frames.pop_front())
    }
}
