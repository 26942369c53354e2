//! 候选载荷校验
//!
//! 两级策略：先做最小长度检查；如果有结构校验能力，再做完整的格式解析。
//! 没有结构校验能力时，长度检查通过即视为有效（宁可偶尔输出错误产物，
//! 也不能把所有帧都静默丢弃）。

use tracing::debug;

use crate::jpeg::verify_jpeg;

/// 候选载荷校验能力
///
/// 任何 `Fn(&[u8]) -> bool` 闭包都可以直接作为校验器使用。
pub trait Validator: Send {
    fn validate(&self, candidate: &[u8]) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&[u8]) -> bool + Send,
{
    fn validate(&self, candidate: &[u8]) -> bool {
        self(candidate)
    }
}

/// JPEG 结构校验器（SOI 到 EOI 逐段解析）
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegStructure;

impl Validator for JpegStructure {
    fn validate(&self, candidate: &[u8]) -> bool {
        match verify_jpeg(candidate) {
            Ok(info) => {
                debug!(
                    "JPEG结构校验通过: {}x{}, {}个分量, {}个扫描段",
                    info.width, info.height, info.components, info.scans
                );
                true
            }
            Err(e) => {
                debug!("JPEG结构校验失败: {}", e);
                false
            }
        }
    }
}

/// 两级校验器：最小长度 + 可选的结构校验
pub struct TieredValidator {
    min_len: usize,
    structural: Option<Box<dyn Validator>>,
}

impl TieredValidator {
    /// 只做长度检查（降级路径）
    pub fn length_only(min_len: usize) -> Self {
        Self {
            min_len,
            structural: None,
        }
    }

    /// 长度检查 + 自定义结构校验
    pub fn with_structural(min_len: usize, structural: impl Validator + 'static) -> Self {
        Self {
            min_len,
            structural: Some(Box::new(structural)),
        }
    }

    /// 长度检查 + JPEG 结构校验
    pub fn jpeg(min_len: usize) -> Self {
        Self::with_structural(min_len, JpegStructure)
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// 是否具备结构校验能力
    pub fn has_structural(&self) -> bool {
        self.structural.is_some()
    }
}

impl Validator for TieredValidator {
    fn validate(&self, candidate: &[u8]) -> bool {
        if candidate.len() < self.min_len {
            debug!("候选过短: {}字节 (最少{}字节)", candidate.len(), self.min_len);
            return false;
        }

        match &self.structural {
            Some(checker) => checker.validate(candidate),
            None => true,
        }
    }
}

impl std::fmt::Debug for TieredValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredValidator")
            .field("min_len", &self.min_len)
            .field("structural", &self.structural.is_some())
            .finish()
    }
}
