use anyhow::{Context, bail};
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use image_harvester::jpeg::verify_jpeg;
use image_harvester::logging::init;
use image_harvester::pdu::{DEFAULT_PDU_PAYLOAD, Packetizer};
use image_harvester::source::{DEFAULT_SOURCE, StreamSource};

/// 每包之间的间隔，避免接收端套接字缓冲区溢出
const DEFAULT_PACKET_INTERVAL_US: u64 = 200;

/// 两轮发送之间的空闲间隔
const ROUND_GAP: Duration = Duration::from_millis(500);

fn main() {
    // 日志系统初始化
    init();

    let mut args = std::env::args();
    let cmd = args.next().unwrap_or_else(|| "image-tx".to_string());
    let rest: Vec<String> = args.collect();

    if rest.is_empty() || rest.len() > 4 || rest.iter().any(|a| a == "-h" || a == "--help") {
        println!("用法: {cmd} <图像文件> [目标地址] [发送轮数] [包间隔微秒]");
        println!("  目标地址: udp://host:port (默认 {DEFAULT_SOURCE})");
        println!("  发送轮数: 0 表示无限循环 (默认 0)");
        println!("  包间隔:   默认 {DEFAULT_PACKET_INTERVAL_US} 微秒");
        return;
    }

    if let Err(e) = run(&rest) {
        error!("发送端退出: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let image_path = &args[0];
    let target = match args.get(1) {
        Some(s) => s.parse::<StreamSource>(),
        None => DEFAULT_SOURCE.parse::<StreamSource>(),
    }
    .context("解析目标地址失败")?;
    let StreamSource::Udp(target) = target else {
        bail!("发送端只支持 udp:// 目标");
    };
    let rounds: u64 = match args.get(2) {
        Some(s) => s.parse().context("发送轮数必须是整数")?,
        None => 0,
    };
    let interval = Duration::from_micros(match args.get(3) {
        Some(s) => s.parse().context("包间隔必须是整数")?,
        None => DEFAULT_PACKET_INTERVAL_US,
    });

    let image = std::fs::read(image_path).with_context(|| format!("读取{image_path}失败"))?;
    match verify_jpeg(&image) {
        Ok(info) => info!(
            "待发送图像: {image_path}, {}字节, {}x{}",
            image.len(),
            info.width,
            info.height
        ),
        Err(e) => warn!("{image_path} 未通过JPEG结构校验（{e}），接收端可能无法恢复"),
    }

    let socket = UdpSocket::bind(("0.0.0.0", 0)).context("绑定本地套接字失败")?;
    let mut packetizer = Packetizer::new(DEFAULT_PDU_PAYLOAD)?;

    let mut round = 0u64;
    while rounds == 0 || round < rounds {
        let packets = packetizer.packetize(&image);
        for packet in &packets {
            socket
                .send_to(packet, target)
                .with_context(|| format!("发送到{target}失败"))?;
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        round += 1;
        info!("第{round}轮发送完成: {}个数据包 -> {target}", packets.len());
        thread::sleep(ROUND_GAP);
    }

    Ok(())
}
