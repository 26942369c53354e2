//! 流式帧提取器 - 从不可靠字节流中恢复首尾标记界定的载荷
//!
//! 输入是持续到达、可能含误码的字节流；标记可能被误码破坏，也可能在载荷
//! 内部偶然出现，一帧可能横跨任意多次投递。
//!
//! 每次 `ingest` 的处理流程：
//! 1. 追加新数据到累积缓冲区
//! 2. 从偏移0查找起始标记，再从起始标记之后查找结束标记
//! 3. 校验候选载荷
//! 4. 有效则发出并推进缓冲区；无效则丢弃到起始标记末尾并重新扫描
//!
//! 每次调用最多发出一帧，剩余的完整帧通过 `drain` 或再次 `ingest(&[])` 取出。

use bytes::Bytes;
use std::hash::Hasher;
use tracing::{debug, info, trace, warn};
use twox_hash::XxHash64;

use crate::config::ExtractorConfig;
use crate::recovery::ArtifactSink;
use crate::validation::{TieredValidator, Validator};

/// 日志中显示的候选头部字节数
const PREVIEW_LEN: usize = 8;

/// 已通过校验的载荷（不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPayload {
    sequence: u64,
    bytes: Bytes,
}

impl ValidatedPayload {
    /// 本提取器发出的第几帧（从0开始）
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// 载荷内容的 xxHash64 指纹
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&self.bytes);
        hasher.finish()
    }
}

/// 提取器统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractorStats {
    /// 累计追加的字节数
    pub bytes_ingested: u64,
    /// 成功发出的帧数
    pub frames_emitted: u64,
    /// 校验失败（误判起始标记）的候选数
    pub candidates_rejected: u64,
    /// 作为垃圾丢弃的字节数
    pub bytes_discarded: u64,
    /// 因缓冲区上限触发的裁剪次数
    pub cap_trims: u64,
}

/// 流式帧提取器
///
/// 非可重入：同一实例的 `ingest` 必须由调用方串行化。
pub struct StreamFrameExtractor {
    config: ExtractorConfig,
    buffer: Vec<u8>,
    validator: Box<dyn Validator>,
    sink: Option<Box<dyn ArtifactSink>>,
    stats: ExtractorStats,
    /// 下次查找起始标记的位置（缓冲区内无起始标记时推进）
    start_scan_from: usize,
    /// 下次查找结束标记的位置（起始标记位于偏移0、等待结束标记时推进）
    end_scan_from: usize,
}

impl StreamFrameExtractor {
    /// 创建新的提取器
    pub fn new(config: ExtractorConfig, validator: impl Validator + 'static) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            validator: Box::new(validator),
            sink: None,
            stats: ExtractorStats::default(),
            start_scan_from: 0,
            end_scan_from: 0,
        }
    }

    /// JPEG 提取器：标准标记 + 长度/结构两级校验
    pub fn jpeg() -> Self {
        let config = ExtractorConfig::jpeg();
        let validator = TieredValidator::jpeg(config.min_payload_len());
        Self::new(config, validator)
    }

    /// 挂接通知接收端，每次发出的帧都会投递一次
    pub fn with_sink(mut self, sink: impl ArtifactSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// 追加数据并尝试提取下一帧
    ///
    /// # 返回
    /// * `Some(payload)` - 本次调用发出了一帧，缓冲区已推进到该帧之后
    /// * `None` - 暂无完整帧，未完成的部分继续保留等待后续数据
    pub fn ingest(&mut self, chunk: &[u8]) -> Option<ValidatedPayload> {
        if !chunk.is_empty() {
            self.stats.bytes_ingested += chunk.len() as u64;
            self.buffer.extend_from_slice(chunk);
            trace!("追加{}字节，缓冲区{}字节", chunk.len(), self.buffer.len());
        }

        let start_len = self.config.start_marker().len();
        let end_len = self.config.end_marker().len();

        loop {
            let Some(start) = find(&self.buffer, self.config.start_marker(), self.start_scan_from)
            else {
                // 已扫描过的区域不会再出现起始标记，只需与新数据衔接
                self.start_scan_from = (self.buffer.len() + 1).saturating_sub(start_len);
                self.trim_without_start();
                return None;
            };

            // 起始标记之前的数据不会再被扫描
            if start > 0 {
                self.discard(start);
            }

            let from = self.end_scan_from.max(start_len);
            let Some(end) = find(&self.buffer, self.config.end_marker(), from) else {
                if self.over_cap() {
                    warn!(
                        "等待结束标记时缓冲区超过上限({}字节)，放弃当前起始标记",
                        self.buffer.len()
                    );
                    self.stats.cap_trims += 1;
                    self.discard(start_len);
                    continue;
                }
                self.end_scan_from = (self.buffer.len() + 1).saturating_sub(end_len);
                return None;
            };

            let frame_len = end + end_len;
            if self.validator.validate(&self.buffer[..frame_len]) {
                let bytes = Bytes::copy_from_slice(&self.buffer[..frame_len]);
                self.consume(frame_len);
                return Some(self.emit(bytes));
            }

            debug!(
                "候选校验失败: {}字节, 头部{}，跳过起始标记重新同步",
                frame_len,
                hex::encode(&self.buffer[..frame_len.min(PREVIEW_LEN)])
            );
            self.stats.candidates_rejected += 1;
            self.discard(start_len);
        }
    }

    /// 取出当前缓冲区中所有已完整的帧
    pub fn drain(&mut self) -> Vec<ValidatedPayload> {
        std::iter::from_fn(|| self.ingest(&[])).collect()
    }

    /// 获取缓冲区当前大小
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &ExtractorStats {
        &self.stats
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    // === 私有方法 ===

    fn emit(&mut self, bytes: Bytes) -> ValidatedPayload {
        let payload = ValidatedPayload {
            sequence: self.stats.frames_emitted,
            bytes,
        };
        self.stats.frames_emitted += 1;

        info!(
            "提取到第{}帧: {}字节, 剩余缓冲{}字节",
            payload.sequence,
            payload.len(),
            self.buffer.len()
        );

        if let Some(sink) = &self.sink {
            sink.deliver(payload.clone());
        }
        payload
    }

    fn discard(&mut self, len: usize) {
        self.consume(len);
        self.stats.bytes_discarded += len as u64;
    }

    /// 移除缓冲区头部；扫描位置以缓冲区头部为基准，一并复位
    fn consume(&mut self, len: usize) {
        self.buffer.drain(..len);
        self.start_scan_from = 0;
        self.end_scan_from = 0;
    }

    fn over_cap(&self) -> bool {
        self.config
            .max_buffer_size()
            .is_some_and(|cap| self.buffer.len() > cap)
    }

    /// 缓冲区内没有起始标记：超过上限时只保留可能构成标记前缀的尾部
    fn trim_without_start(&mut self) {
        if !self.over_cap() {
            return;
        }
        let keep = self.config.start_marker().len() - 1;
        let cut = self.buffer.len() - keep.min(self.buffer.len());
        warn!("缓冲区超过上限且无起始标记，丢弃{}字节", cut);
        self.stats.cap_trims += 1;
        self.discard(cut);
    }
}

impl std::fmt::Debug for StreamFrameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamFrameExtractor")
            .field("config", &self.config)
            .field("buffered", &self.buffer.len())
            .field("has_sink", &self.sink.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

/// 从 `from` 开始查找 `needle` 的第一次出现
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
