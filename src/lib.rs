//! Image Harvester - 从不可靠的解调字节流中恢复图像文件的核心库

/// 配置常量与配置结构
pub mod config;

/// 流式帧提取器（核心）
pub mod extractor;

/// 候选载荷校验
pub mod validation;

/// JPEG 结构校验
pub mod jpeg;

/// 空口数据包编解码
pub mod pdu;

/// 恢复产物的投递与落盘
pub mod recovery;

/// 接收流水线
pub mod pipeline;

/// 数据源地址
pub mod source;

/// C 接口
pub mod capi;

/// 测试用的合成数据
#[doc(hidden)]
pub mod testutil;

/// 重新导出常用类型
pub use config::{ExtractorConfig, RecoveryConfig};
pub use extractor::{ExtractorStats, StreamFrameExtractor, ValidatedPayload};
pub use pipeline::{ImageReceiver, ReceiverStats};
pub use recovery::{ArtifactReady, ArtifactSink, RecoveryEvent, RecoveryWorker};
pub use validation::{TieredValidator, Validator};

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 日志系统
pub mod logging;
