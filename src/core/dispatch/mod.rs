//! 过车事件管线：观测 -> 去重 -> 离线持久化
//!
//! 1. 帧采样 - 每 N 帧推理一次
//! 2. 检测 + 编号识别 - 每个货箱一个观测
//! 3. 时间窗去重 - 同一编号 5 分钟内只记一次
//! 4. 先落盘，再进内存日志

pub mod deduplicator;
pub mod event;
pub mod ledger;
pub mod pipeline;
pub mod store;
pub mod stream;
pub mod sync;

pub use deduplicator::{DedupReason, PassDeduplicator};
pub use event::{
    CargoLabel, Event, NewEvent, Observation, OperationalContext, SyncState, UNKNOWN_IDENTIFIER,
};
pub use ledger::{LedgerStats, PassLedger};
pub use pipeline::{DispatchPipeline, PipelineStats};
pub use store::{EventFilter, EventStore};
pub use stream::{event_channel, EventReceiver, StreamFeed};
pub use sync::SyncBatch;
