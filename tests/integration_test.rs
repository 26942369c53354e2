mod common;

use image_harvester::pdu::Packetizer;
use image_harvester::{
    ImageReceiver, RecoveryConfig, RecoveryEvent, RecoveryWorker, StreamFrameExtractor,
};
use std::fs;

use common::{noise, synthetic_jpeg};

fn ready_events(events: Vec<RecoveryEvent>) -> Vec<image_harvester::ArtifactReady> {
    events
        .into_iter()
        .map(|event| match event {
            RecoveryEvent::ArtifactReady(ready) => ready,
            other => panic!("unexpected event: {:?}", other),
        })
        .collect()
}

#[test]
fn test_image_recovered_from_noisy_packet_stream() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("recovered_latest.jpg");
    let config = RecoveryConfig::new(&output, 8).unwrap();
    let (worker, events) = RecoveryWorker::spawn(&config).unwrap();

    let image = synthetic_jpeg(128, 96, 400);
    let stream = [noise(333, 1), image.clone(), noise(97, 2)].concat();

    let mut receiver = ImageReceiver::new(StreamFrameExtractor::jpeg().with_sink(worker.sink()));
    let mut packetizer = Packetizer::default();
    let frames: Vec<_> = packetizer
        .packetize(&stream)
        .iter()
        .flat_map(|packet| receiver.on_datagram(packet))
        .collect();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].as_slice(), image.as_slice());

    worker.shutdown();
    let ready = ready_events(events.iter().collect());
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].path, output);
    assert_eq!(ready[0].len, image.len());
    assert!(!ready[0].duplicate);
    assert_eq!(fs::read(&output).unwrap(), image);
}

#[test]
fn test_lost_packet_resyncs_to_next_image() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("latest.jpg");
    let (worker, events) = RecoveryWorker::spawn(&RecoveryConfig::new(&output, 8).unwrap()).unwrap();

    let damaged = synthetic_jpeg(64, 64, 200);
    let intact = synthetic_jpeg(32, 16, 250);
    let stream = [damaged, noise(50, 3), intact.clone()].concat();

    let mut receiver = ImageReceiver::new(StreamFrameExtractor::jpeg().with_sink(worker.sink()));
    let mut packetizer = Packetizer::default();
    let packets = packetizer.packetize(&stream);

    let mut frames = Vec::new();
    for (i, packet) in packets.iter().enumerate() {
        // 第二个包在空口丢失（覆盖第一张图的量化表和帧头）
        if i == 1 {
            continue;
        }
        frames.extend(receiver.on_datagram(packet));
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].as_slice(), intact.as_slice());
    assert_eq!(receiver.stats().pdus_missing, 1);
    assert_eq!(receiver.extractor().stats().candidates_rejected, 1);

    worker.shutdown();
    let ready = ready_events(events.iter().collect());
    assert_eq!(ready.len(), 1);
    assert_eq!(fs::read(&output).unwrap(), intact);
}

#[test]
fn test_corrupt_packet_dropped_before_extraction() {
    let image = synthetic_jpeg(16, 16, 120);
    let mut receiver = ImageReceiver::new(StreamFrameExtractor::jpeg());
    let mut packetizer = Packetizer::default();

    let mut packets = packetizer.packetize(&image);
    packets[0][6] ^= 0x10;

    let frames: Vec<_> = packets.iter().flat_map(|p| receiver.on_datagram(p)).collect();
    assert!(frames.is_empty());
    assert_eq!(receiver.stats().pdus_corrupt, 1);

    // 下一轮完整发送仍可恢复
    let frames: Vec<_> = packetizer
        .packetize(&image)
        .iter()
        .flat_map(|p| receiver.on_datagram(p))
        .collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].as_slice(), image.as_slice());
}

#[test]
fn test_repeated_transmission_marks_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("latest.jpg");
    let (worker, events) = RecoveryWorker::spawn(&RecoveryConfig::new(&output, 8).unwrap()).unwrap();

    let first = synthetic_jpeg(48, 48, 180);
    let second = synthetic_jpeg(24, 24, 180);
    // 发送端循环发送：同一张图两次，然后换图
    let stream = [first.clone(), first.clone(), second.clone()].concat();

    let mut receiver = ImageReceiver::new(StreamFrameExtractor::jpeg().with_sink(worker.sink()));
    let frames = receiver.on_stream_bytes(&stream);
    assert_eq!(frames.len(), 3);
    assert_eq!(
        frames.iter().map(|f| f.sequence()).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    worker.shutdown();
    let ready = ready_events(events.iter().collect());
    assert_eq!(
        ready.iter().map(|r| r.duplicate).collect::<Vec<_>>(),
        vec![false, true, false]
    );
    assert_eq!(fs::read(&output).unwrap(), second);
}

#[test]
fn test_length_only_degradation_still_emits() {
    use image_harvester::{ExtractorConfig, TieredValidator};

    // 没有结构校验能力时，长度足够的候选即被接受
    let config = ExtractorConfig::jpeg();
    let mut extractor =
        StreamFrameExtractor::new(config, TieredValidator::length_only(100));

    let mut not_really_jpeg = vec![0xFF, 0xD8];
    not_really_jpeg.extend_from_slice(&noise(120, 9));
    not_really_jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let frame = extractor.ingest(&not_really_jpeg).unwrap();
    assert_eq!(frame.as_slice(), not_really_jpeg.as_slice());

    let mut strict = StreamFrameExtractor::jpeg();
    assert!(strict.ingest(&not_really_jpeg).is_none());
}
