#![allow(dead_code)]

use image_harvester::{StreamFrameExtractor, ValidatedPayload};

pub use image_harvester::testutil::synthetic_jpeg;

/// 不含 0xFF 的噪声字节
pub fn noise(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) % 0xF0)
        .collect()
}

/// 依次投递所有分片，每次投递后取出所有已完整的帧
pub fn feed_chunks<'a>(
    extractor: &mut StreamFrameExtractor,
    chunks: impl IntoIterator<Item = &'a [u8]>,
) -> Vec<ValidatedPayload> {
    let mut frames = Vec::new();
    for chunk in chunks {
        if let Some(frame) = extractor.ingest(chunk) {
            frames.push(frame);
            frames.extend(extractor.drain());
        }
    }
    frames
}
