//! 写盘线程
//!
//! 提取线程只做一次非阻塞入队；写盘和通知在独立线程完成，
//! 写入缓慢或失败都不会拖慢后续的 `ingest`。

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sink::ArtifactSink;
use super::storage::ArtifactStore;
use crate::config::RecoveryConfig;
use crate::extractor::ValidatedPayload;

/// 新产物已写入（发给展示端的单参数事件）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReady {
    pub id: Uuid,
    pub sequence: u64,
    pub path: PathBuf,
    pub len: usize,
    pub fingerprint: u64,
    /// 与上一次写入的产物内容相同
    pub duplicate: bool,
}

/// 写盘线程发往展示端的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryEvent {
    ArtifactReady(ArtifactReady),
    /// 写入失败（非致命，下一帧照常处理）
    StorageFailed { sequence: u64, reason: String },
}

enum WriterCommand {
    Persist(ValidatedPayload),
    Shutdown,
}

/// 挂接到提取器上的接收端句柄
#[derive(Clone)]
pub struct WorkerSink {
    queue: Sender<WriterCommand>,
    dropped: Arc<AtomicU64>,
}

impl ArtifactSink for WorkerSink {
    fn deliver(&self, payload: ValidatedPayload) {
        match self.queue.try_send(WriterCommand::Persist(payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("写盘队列已满，丢弃一帧（累计丢弃{}帧）", dropped);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("写盘线程已退出，丢弃一帧");
            }
        }
    }
}

/// 写盘线程管理器
pub struct RecoveryWorker {
    queue: Sender<WriterCommand>,
    dropped: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl RecoveryWorker {
    /// 启动写盘线程，返回管理器和展示端事件通道
    pub fn spawn(config: &RecoveryConfig) -> std::io::Result<(Self, Receiver<RecoveryEvent>)> {
        let (queue_tx, queue_rx) = channel::bounded(config.queue_depth);
        let (event_tx, event_rx) = channel::unbounded();
        let store = ArtifactStore::new(config.output_path.clone());

        let handle = thread::Builder::new()
            .name("artifact-writer".to_string())
            .spawn(move || run_writer(store, queue_rx, event_tx))?;

        info!(
            "写盘线程已启动: 输出{}, 队列深度{}",
            config.output_path.display(),
            config.queue_depth
        );

        Ok((
            Self {
                queue: queue_tx,
                dropped: Arc::new(AtomicU64::new(0)),
                handle: Some(handle),
            },
            event_rx,
        ))
    }

    /// 获取可挂接到提取器的接收端
    pub fn sink(&self) -> WorkerSink {
        WorkerSink {
            queue: self.queue.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// 因队列满或线程退出而丢弃的帧数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 处理完已入队的帧后停止写盘线程
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // 排在已入队的帧之后
        let _ = self.queue.send(WriterCommand::Shutdown);
        if handle.join().is_err() {
            warn!("写盘线程异常退出");
        }
    }
}

impl Drop for RecoveryWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_writer(
    store: ArtifactStore,
    queue: Receiver<WriterCommand>,
    events: Sender<RecoveryEvent>,
) {
    let mut last_fingerprint: Option<u64> = None;

    for command in queue.iter() {
        let payload = match command {
            WriterCommand::Persist(payload) => payload,
            WriterCommand::Shutdown => break,
        };

        let sequence = payload.sequence();
        let event = match store.write(payload.as_slice()) {
            Ok(()) => {
                let fingerprint = payload.fingerprint();
                let duplicate = last_fingerprint == Some(fingerprint);
                last_fingerprint = Some(fingerprint);

                let ready = ArtifactReady {
                    id: Uuid::new_v4(),
                    sequence,
                    path: store.path().to_path_buf(),
                    len: payload.len(),
                    fingerprint,
                    duplicate,
                };
                info!(
                    "产物 {} 已写入{}: 第{}帧, {}字节, 指纹{:016x}{}",
                    ready.id,
                    ready.path.display(),
                    sequence,
                    ready.len,
                    fingerprint,
                    if duplicate { "（与上次相同）" } else { "" }
                );
                RecoveryEvent::ArtifactReady(ready)
            }
            Err(e) => {
                warn!("第{}帧写入失败: {}", sequence, e);
                RecoveryEvent::StorageFailed {
                    sequence,
                    reason: e.to_string(),
                }
            }
        };

        if events.send(event).is_err() {
            debug!("展示端已关闭，事件未送达");
        }
    }

    debug!("写盘线程退出");
}
