//! 恢复产物的投递与落盘模块

mod sink;
mod storage;
mod worker;

// 重新导出
pub use sink::{ArtifactSink, ChannelSink};
pub use storage::{ArtifactStore, StorageError};
pub use worker::{ArtifactReady, RecoveryEvent, RecoveryWorker, WorkerSink};
