use crossbeam::channel::{Sender, TrySendError};
use tracing::warn;

use crate::extractor::ValidatedPayload;

/// 通知接收端：每次发出的帧投递一次
///
/// 实现不得阻塞提取线程；投递是"发出即忘"，提取器不等待确认也不重试。
pub trait ArtifactSink: Send {
    fn deliver(&self, payload: ValidatedPayload);
}

impl<F> ArtifactSink for F
where
    F: Fn(ValidatedPayload) + Send,
{
    fn deliver(&self, payload: ValidatedPayload) {
        self(payload)
    }
}

/// 基于通道的接收端，把载荷交给另一个线程消费
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ValidatedPayload>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ValidatedPayload>) -> Self {
        Self { tx }
    }
}

impl ArtifactSink for ChannelSink {
    fn deliver(&self, payload: ValidatedPayload) {
        match self.tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(p)) => {
                warn!("通知通道已满，丢弃第{}帧", p.sequence());
            }
            Err(TrySendError::Disconnected(p)) => {
                warn!("通知通道已关闭，丢弃第{}帧", p.sequence());
            }
        }
    }
}
