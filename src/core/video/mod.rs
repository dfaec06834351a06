pub mod frame;
pub mod sampler;
pub mod source;

pub use frame::{BoundingBox, Frame, RawFrame};
pub use sampler::{FrameCounter, FrameSampler};
pub use source::{FrameSource, VecFrameSource};
