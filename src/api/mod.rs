pub mod session;

pub use session::{DispatchSession, PullSummary};
