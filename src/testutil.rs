//! Fixtures shared by unit and integration tests.

/// Minimal baseline greyscale image: DQT, SOF0, SOS, entropy data, EOI.
/// `0xFF` only ever appears as a marker prefix or in one stuffed `FF 00`.
pub fn synthetic_jpeg(width: u16, height: u16, entropy_len: usize) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];

    out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    out.extend(1..=64u8);

    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);

    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    for i in 0..entropy_len {
        out.push((i * 7 % 0xF0) as u8);
        if i == entropy_len / 2 {
            out.extend_from_slice(&[0xFF, 0x00]);
        }
    }

    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}
