use anyhow::Context;
use crossbeam::channel::Receiver;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use image_harvester::logging::init;
use image_harvester::source::{DEFAULT_SOURCE, StreamSource};
use image_harvester::{
    ImageReceiver, RecoveryConfig, RecoveryEvent, RecoveryWorker, StreamFrameExtractor,
};

const MAX_DATAGRAM_SIZE: usize = 65535;

/// 文件回放时每次读取的字节数
const REPLAY_CHUNK: usize = 4096;

/// 事件循环检查退出标志的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 收到 SIGINT/SIGTERM 后置位，主循环退出并走正常的写盘收尾
static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // 处理函数只写原子变量，满足异步信号安全
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

fn main() {
    // 日志系统初始化
    init();

    let mut args = std::env::args();
    let cmd = args.next().unwrap_or_else(|| "image-rx".to_string());
    let rest: Vec<String> = args.collect();

    if rest.len() > 2 || rest.iter().any(|a| a == "-h" || a == "--help") {
        println!("用法: {cmd} [数据源地址] [输出文件]");
        println!("  数据源地址: udp://host:port 或 file:///path (默认 {DEFAULT_SOURCE})");
        println!("  输出文件:   最新恢复图像的位置 (默认 recovered_latest.jpg)");
        return;
    }

    if let Err(e) = run(&rest) {
        error!("接收端退出: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let source: StreamSource = args
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_SOURCE)
        .parse()
        .context("解析数据源地址失败")?;

    let mut config = RecoveryConfig::default();
    if let Some(output) = args.get(1) {
        config.output_path = output.into();
    }

    let (worker, events) = RecoveryWorker::spawn(&config).context("启动写盘线程失败")?;
    let presenter = thread::Builder::new()
        .name("presenter".to_string())
        .spawn(move || present(events))
        .context("启动展示线程失败")?;

    let extractor = StreamFrameExtractor::jpeg().with_sink(worker.sink());
    let mut receiver = ImageReceiver::new(extractor);

    info!("接收端启动: 数据源 {source}, 输出 {}", config.output_path.display());
    install_signal_handlers();

    let result = match &source {
        StreamSource::Udp(addr) => listen_udp(*addr, &mut receiver, &STOP),
        StreamSource::File(path) => replay_file(path, &mut receiver, &STOP),
    };

    info!(
        "接收统计: {:?}, 提取统计: {:?}, 写盘丢弃{}帧",
        receiver.stats(),
        receiver.extractor().stats(),
        worker.dropped()
    );

    // 等待写盘完成，展示线程随事件通道关闭退出
    worker.shutdown();
    if presenter.join().is_err() {
        warn!("展示线程异常退出");
    }
    result
}

/// UDP事件循环：每个数据报是一个PDU，`stop` 置位后返回
fn listen_udp(
    addr: SocketAddr,
    receiver: &mut ImageReceiver,
    stop: &AtomicBool,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    // Setup the event loop.
    let mut poll = mio::Poll::new()?;
    let mut events = mio::Events::with_capacity(1024);

    let mut socket =
        mio::net::UdpSocket::bind(addr).with_context(|| format!("绑定{addr}失败"))?;
    poll.registry()
        .register(&mut socket, mio::Token(0), mio::Interest::READABLE)?;

    info!("正在监听 {}", socket.local_addr()?);

    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = poll.poll(&mut events, Some(POLL_INTERVAL)) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e).context("等待套接字事件失败");
        }

        // Read incoming datagrams until the socket would block.
        'read: loop {
            let (len, from) = match socket.recv_from(&mut buf) {
                Ok(v) => v,

                Err(e) => {
                    if e.kind() == std::io::ErrorKind::WouldBlock {
                        trace!("接收操作将阻塞");
                        break 'read;
                    }
                    return Err(e).context("接收数据报失败");
                },
            };

            trace!("从 {from} 收到 {len} 字节");

            for frame in receiver.on_datagram(&buf[..len]) {
                debug!("第{}帧已交给写盘线程", frame.sequence());
            }
        }
    }

    info!("收到退出信号，停止接收");
    Ok(())
}

/// 回放原始字节流抓包文件（无PDU封装）
fn replay_file(
    path: &Path,
    receiver: &mut ImageReceiver,
    stop: &AtomicBool,
) -> anyhow::Result<()> {
    let mut file =
        File::open(path).with_context(|| format!("打开{}失败", path.display()))?;
    let mut chunk = vec![0u8; REPLAY_CHUNK];

    while !stop.load(Ordering::SeqCst) {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        receiver.on_stream_bytes(&chunk[..n]);
    }

    if receiver.extractor().buffered_len() > 0 {
        info!(
            "回放结束，{}字节未构成完整帧",
            receiver.extractor().buffered_len()
        );
    }
    Ok(())
}

/// 展示端：消费写盘线程的事件
fn present(events: Receiver<RecoveryEvent>) {
    for event in events.iter() {
        match event {
            RecoveryEvent::ArtifactReady(ready) if ready.duplicate => {
                debug!("图像未变化: {}", ready.path.display());
            }
            RecoveryEvent::ArtifactReady(ready) => {
                info!(
                    "新图像可显示: {} ({}字节, 第{}帧)",
                    ready.path.display(),
                    ready.len,
                    ready.sequence
                );
            }
            RecoveryEvent::StorageFailed { sequence, reason } => {
                warn!("第{sequence}帧未能保存: {reason}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_harvester::testutil::synthetic_jpeg;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_udp_loop_returns_when_stopped() {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let listener = thread::spawn(move || {
            let mut receiver = ImageReceiver::new(StreamFrameExtractor::jpeg());
            let started = Instant::now();
            let result = listen_udp("127.0.0.1:0".parse().unwrap(), &mut receiver, &flag);
            (result, started.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);

        let (result, elapsed) = listener.join().unwrap();
        assert!(result.is_ok());
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_replay_stops_before_reading_when_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        let image = synthetic_jpeg(16, 16, 200);
        std::fs::write(&path, &image).unwrap();

        let mut receiver = ImageReceiver::new(StreamFrameExtractor::jpeg());
        replay_file(&path, &mut receiver, &AtomicBool::new(true)).unwrap();
        assert_eq!(receiver.stats().frames_emitted, 0);

        replay_file(&path, &mut receiver, &AtomicBool::new(false)).unwrap();
        assert_eq!(receiver.stats().frames_emitted, 1);
    }
}
