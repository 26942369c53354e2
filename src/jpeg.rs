//! JPEG structural verifier
//!
//! Walks the marker segments of a candidate from SOI to EOI without decoding
//! any pixels. A candidate passes when every segment length is consistent,
//! a frame header precedes the first scan, and the EOI is exactly the last
//! two bytes.

use thiserror::Error;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JpegError {
    #[error("missing SOI marker")]
    MissingSoi,

    #[error("truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("expected marker at offset {offset}, found 0x{byte:02X}")]
    ExpectedMarker { offset: usize, byte: u8 },

    #[error("invalid marker 0xFF{marker:02X} at offset {offset}")]
    InvalidMarker { offset: usize, marker: u8 },

    #[error("segment 0xFF{marker:02X} has bad length {length}")]
    BadSegmentLength { marker: u8, length: usize },

    #[error("malformed frame header: {0}")]
    InvalidFrameHeader(&'static str),

    #[error("scan header at offset {offset} appears before any frame header")]
    ScanBeforeFrame { offset: usize },

    #[error("malformed scan header at offset {offset}")]
    InvalidScanHeader { offset: usize },

    #[error("no frame header before EOI")]
    MissingFrameHeader,

    #[error("no scan before EOI")]
    MissingScan,

    #[error("{trailing} bytes after EOI")]
    TrailingData { trailing: usize },
}

/// What the verifier learned from the headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u16,
    pub height: u16,
    pub components: u8,
    pub scans: usize,
}

fn is_frame_header(marker: u8) -> bool {
    // C4 = DHT, C8 = JPG extension, CC = DAC
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

fn is_restart(marker: u8) -> bool {
    (0xD0..=0xD7).contains(&marker)
}

/// Verify that `data` is one structurally complete JPEG image.
pub fn verify_jpeg(data: &[u8]) -> Result<JpegInfo, JpegError> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != SOI {
        return Err(JpegError::MissingSoi);
    }

    let mut pos = 2;
    let mut frame: Option<(u16, u16, u8)> = None;
    let mut scans = 0usize;

    loop {
        let marker_offset = pos;
        match data.get(pos) {
            None => return Err(JpegError::Truncated { offset: pos }),
            Some(&0xFF) => {}
            Some(&byte) => return Err(JpegError::ExpectedMarker { offset: pos, byte }),
        }

        // fill bytes
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        let marker = *data.get(pos).ok_or(JpegError::Truncated { offset: pos })?;
        pos += 1;

        match marker {
            EOI => {
                let (width, height, components) = frame.ok_or(JpegError::MissingFrameHeader)?;
                if scans == 0 {
                    return Err(JpegError::MissingScan);
                }
                if pos != data.len() {
                    return Err(JpegError::TrailingData {
                        trailing: data.len() - pos,
                    });
                }
                return Ok(JpegInfo {
                    width,
                    height,
                    components,
                    scans,
                });
            }
            TEM => continue,
            m if is_restart(m) => continue,
            SOI | 0x00 => {
                return Err(JpegError::InvalidMarker {
                    offset: marker_offset,
                    marker,
                });
            }
            _ => {}
        }

        let header = data
            .get(pos..pos + 2)
            .ok_or(JpegError::Truncated { offset: pos })?;
        let length = u16::from_be_bytes([header[0], header[1]]) as usize;
        if length < 2 {
            return Err(JpegError::BadSegmentLength { marker, length });
        }
        let end = pos + length;
        if end > data.len() {
            return Err(JpegError::Truncated { offset: data.len() });
        }
        let body = &data[pos + 2..end];

        if is_frame_header(marker) {
            frame = Some(parse_frame_header(body)?);
        } else if marker == SOS {
            if frame.is_none() {
                return Err(JpegError::ScanBeforeFrame {
                    offset: marker_offset,
                });
            }
            let components = *body.first().ok_or(JpegError::InvalidScanHeader {
                offset: marker_offset,
            })? as usize;
            if components == 0 || body.len() != 1 + 2 * components + 3 {
                return Err(JpegError::InvalidScanHeader {
                    offset: marker_offset,
                });
            }
            scans += 1;
            pos = skip_entropy_coded(data, end)?;
            continue;
        }

        pos = end;
    }
}

fn parse_frame_header(body: &[u8]) -> Result<(u16, u16, u8), JpegError> {
    if body.len() < 6 {
        return Err(JpegError::InvalidFrameHeader("too short"));
    }
    let height = u16::from_be_bytes([body[1], body[2]]);
    let width = u16::from_be_bytes([body[3], body[4]]);
    let components = body[5];

    if width == 0 {
        return Err(JpegError::InvalidFrameHeader("zero width"));
    }
    if components == 0 {
        return Err(JpegError::InvalidFrameHeader("no components"));
    }
    if body.len() != 6 + 3 * components as usize {
        return Err(JpegError::InvalidFrameHeader("component table length mismatch"));
    }

    Ok((width, height, components))
}

/// Returns the offset of the first marker that terminates the entropy-coded
/// segment. Stuffed `FF 00` pairs and restart markers belong to the scan.
fn skip_entropy_coded(data: &[u8], mut pos: usize) -> Result<usize, JpegError> {
    while pos < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let next = *data.get(pos + 1).ok_or(JpegError::Truncated { offset: pos + 1 })?;
        if next == 0x00 || is_restart(next) {
            pos += 2;
        } else {
            return Ok(pos);
        }
    }
    Err(JpegError::Truncated { offset: pos })
}
