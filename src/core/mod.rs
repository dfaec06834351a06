pub mod clock;
pub mod config;
pub mod detection;
pub mod dispatch;
pub mod error;
pub mod report;
pub mod video;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DispatchConfig;
pub use error::{CapabilityError, DispatchError, DispatchResult, StoreError, StoreResult};
pub use report::DispatchSummary;
