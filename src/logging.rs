use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// 初始化 tracing 日志系统（控制台输出，`RUST_LOG` 控制级别，默认 info）
///
/// 重复调用不会报错，便于测试中多次初始化。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("日志系统初始化完成");
    }
}
