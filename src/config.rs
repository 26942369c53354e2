//! 配置模块
//!
//! 所有配置均为构造时确定的常量，提取器创建后不再修改。

use std::path::PathBuf;

/// JPEG 起始标记（SOI）
pub const JPEG_START: &[u8] = &[0xFF, 0xD8];

/// JPEG 结束标记（EOI）
pub const JPEG_END: &[u8] = &[0xFF, 0xD9];

/// 最小可信候选长度（含首尾标记）
pub const DEFAULT_MIN_PAYLOAD_LEN: usize = 100;

/// 累积缓冲区默认上限
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8MB

/// 默认输出文件（"最新恢复产物"）
pub const DEFAULT_OUTPUT_PATH: &str = "recovered_latest.jpg";

/// 写盘队列默认深度
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// 配置错误类型
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("起始标记不能为空")]
    EmptyStartMarker,

    #[error("结束标记不能为空")]
    EmptyEndMarker,

    #[error("缓冲区上限{cap}字节小于最小载荷长度{min_len}字节")]
    CapBelowMinimum { cap: usize, min_len: usize },

    #[error("写盘队列深度必须大于0")]
    ZeroQueueDepth,
}

/// 帧提取器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    start_marker: Vec<u8>,
    end_marker: Vec<u8>,
    min_payload_len: usize,
    max_buffer_size: Option<usize>,
}

impl ExtractorConfig {
    /// 创建新的提取器配置（默认缓冲区上限）
    pub fn new(
        start_marker: &[u8],
        end_marker: &[u8],
        min_payload_len: usize,
    ) -> Result<Self, ConfigError> {
        if start_marker.is_empty() {
            return Err(ConfigError::EmptyStartMarker);
        }
        if end_marker.is_empty() {
            return Err(ConfigError::EmptyEndMarker);
        }

        Ok(Self {
            start_marker: start_marker.to_vec(),
            end_marker: end_marker.to_vec(),
            min_payload_len,
            max_buffer_size: Some(DEFAULT_MAX_BUFFER_SIZE.max(min_payload_len)),
        })
    }

    /// JPEG 图像的标准配置：`FF D8` ... `FF D9`，最少100字节
    pub fn jpeg() -> Self {
        Self {
            start_marker: JPEG_START.to_vec(),
            end_marker: JPEG_END.to_vec(),
            min_payload_len: DEFAULT_MIN_PAYLOAD_LEN,
            max_buffer_size: Some(DEFAULT_MAX_BUFFER_SIZE),
        }
    }

    /// 设置缓冲区上限；`None` 表示无限增长
    pub fn with_max_buffer_size(mut self, cap: Option<usize>) -> Result<Self, ConfigError> {
        if let Some(cap) = cap {
            if cap < self.min_payload_len {
                return Err(ConfigError::CapBelowMinimum {
                    cap,
                    min_len: self.min_payload_len,
                });
            }
        }
        self.max_buffer_size = cap;
        Ok(self)
    }

    pub fn start_marker(&self) -> &[u8] {
        &self.start_marker
    }

    pub fn end_marker(&self) -> &[u8] {
        &self.end_marker
    }

    pub fn min_payload_len(&self) -> usize {
        self.min_payload_len
    }

    pub fn max_buffer_size(&self) -> Option<usize> {
        self.max_buffer_size
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::jpeg()
    }
}

/// 恢复产物的落盘配置
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// 固定输出位置，每次覆盖
    pub output_path: PathBuf,
    /// 提取线程与写盘线程之间的队列深度
    pub queue_depth: usize,
}

impl RecoveryConfig {
    pub fn new(output_path: impl Into<PathBuf>, queue_depth: usize) -> Result<Self, ConfigError> {
        if queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        Ok(Self {
            output_path: output_path.into(),
            queue_depth,
        })
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}
