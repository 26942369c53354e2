//! 接收流水线：数据包 -> CRC校验 -> 帧提取 -> 接收端
//!
//! 单生产者上下文使用，`ImageReceiver` 独占提取器。

use tracing::{debug, trace};

use crate::extractor::{StreamFrameExtractor, ValidatedPayload};
use crate::pdu::decode_pdu;

/// 序号差超过半个序号空间视为落后（重复或乱序迟到）
const SEQ_HALF_RANGE: u16 = 0x8000;

/// 接收统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiverStats {
    pub pdus_accepted: u64,
    pub pdus_corrupt: u64,
    /// 按序号推算的丢包数
    pub pdus_missing: u64,
    /// 重复或迟到（序号落后于期望值）而被丢弃的包
    pub pdus_duplicate: u64,
    pub frames_emitted: u64,
}

/// 图像接收器
#[derive(Debug)]
pub struct ImageReceiver {
    extractor: StreamFrameExtractor,
    expected_seq: Option<u16>,
    stats: ReceiverStats,
}

impl ImageReceiver {
    pub fn new(extractor: StreamFrameExtractor) -> Self {
        Self {
            extractor,
            expected_seq: None,
            stats: ReceiverStats::default(),
        }
    }

    /// 处理一个数据报（一个PDU），返回本次完成的所有帧
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Vec<ValidatedPayload> {
        let pdu = match decode_pdu(datagram) {
            Ok(pdu) => pdu,
            Err(e) => {
                debug!("丢弃损坏数据包: {}", e);
                self.stats.pdus_corrupt += 1;
                return Vec::new();
            }
        };

        if let Some(expected) = self.expected_seq {
            let ahead = pdu.seq.wrapping_sub(expected);
            if ahead >= SEQ_HALF_RANGE {
                // 字节流不允许重复，迟到的包已无法插回原位置
                debug!("丢弃重复或迟到的数据包: 期望{}，收到{}", expected, pdu.seq);
                self.stats.pdus_duplicate += 1;
                return Vec::new();
            }
            if ahead > 0 {
                debug!("序号跳变: 期望{}，收到{}（丢失{}包）", expected, pdu.seq, ahead);
                self.stats.pdus_missing += ahead as u64;
            }
        }
        self.expected_seq = Some(pdu.seq.wrapping_add(1));
        self.stats.pdus_accepted += 1;
        trace!("数据包{}: {}字节载荷", pdu.seq, pdu.payload.len());

        self.ingest_all(pdu.payload)
    }

    /// 处理原始字节流（无PDU封装）
    pub fn on_stream_bytes(&mut self, bytes: &[u8]) -> Vec<ValidatedPayload> {
        self.ingest_all(bytes)
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn extractor(&self) -> &StreamFrameExtractor {
        &self.extractor
    }

    fn ingest_all(&mut self, chunk: &[u8]) -> Vec<ValidatedPayload> {
        let mut frames = Vec::new();
        if let Some(first) = self.extractor.ingest(chunk) {
            frames.push(first);
            frames.extend(self.extractor.drain());
        }
        self.stats.frames_emitted += frames.len() as u64;
        frames
    }
}
