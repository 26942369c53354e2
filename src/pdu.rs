//! 数据包分帧模块 - 空口数据包（PDU）编解码
//!
//! 发送端把图像切成固定大小的数据包并附加CRC32，接收端丢弃CRC错误的包，
//! 只把通过校验的载荷交给帧提取器。
//!
//! 格式: [2字节序号][2字节长度][载荷][4字节CRC32]
//! 序号和长度均为大端序；CRC32 覆盖序号、长度和载荷。

use thiserror::Error;

/// 包头长度（序号 + 长度）
pub const PDU_HEADER_LEN: usize = 4;

/// CRC32 校验尾长度
pub const PDU_CRC_LEN: usize = 4;

/// 默认每包载荷字节数
pub const DEFAULT_PDU_PAYLOAD: usize = 60;

/// 单包载荷上限（长度字段为16位）
pub const MAX_PDU_PAYLOAD: usize = u16::MAX as usize;

/// 数据包错误类型
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PduError {
    #[error("数据包过短: {len}字节 (最少{min}字节)")]
    TooShort { len: usize, min: usize },

    #[error("长度字段不匹配: 声明{declared}字节，实际{actual}字节")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("CRC校验失败: 期望{expected:08x}，实际{actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("载荷过大: {len}字节 (最大{max}字节)")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("每包载荷大小必须在1到{max}之间: {size}")]
    InvalidPayloadSize { size: usize, max: usize },
}

/// 解析出的数据包（借用输入缓冲区）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pdu<'a> {
    pub seq: u16,
    pub payload: &'a [u8],
}

/// 编码一个数据包
pub fn encode_pdu(seq: u16, payload: &[u8]) -> Result<Vec<u8>, PduError> {
    if payload.len() > MAX_PDU_PAYLOAD {
        return Err(PduError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PDU_PAYLOAD,
        });
    }

    Ok(build_packet(seq, payload))
}

// 调用方保证 payload.len() <= MAX_PDU_PAYLOAD
fn build_packet(seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PDU_HEADER_LEN + payload.len() + PDU_CRC_LEN);
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.extend_from_slice(payload);

    let crc = crc32fast::hash(&packet);
    packet.extend_from_slice(&crc.to_be_bytes());
    packet
}

/// 解码并校验一个数据包
pub fn decode_pdu(data: &[u8]) -> Result<Pdu<'_>, PduError> {
    let min = PDU_HEADER_LEN + PDU_CRC_LEN;
    if data.len() < min {
        return Err(PduError::TooShort {
            len: data.len(),
            min,
        });
    }

    let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
    let actual = data.len() - min;
    if declared != actual {
        return Err(PduError::LengthMismatch { declared, actual });
    }

    let (body, tail) = data.split_at(data.len() - PDU_CRC_LEN);
    let expected = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed = crc32fast::hash(body);
    if expected != computed {
        return Err(PduError::CrcMismatch {
            expected,
            actual: computed,
        });
    }

    Ok(Pdu {
        seq: u16::from_be_bytes([data[0], data[1]]),
        payload: &body[PDU_HEADER_LEN..],
    })
}

/// 发送端分包器，序号跨多次调用连续递增（16位回绕）
#[derive(Debug, Clone)]
pub struct Packetizer {
    payload_size: usize,
    next_seq: u16,
}

impl Packetizer {
    pub fn new(payload_size: usize) -> Result<Self, PduError> {
        if payload_size == 0 || payload_size > MAX_PDU_PAYLOAD {
            return Err(PduError::InvalidPayloadSize {
                size: payload_size,
                max: MAX_PDU_PAYLOAD,
            });
        }
        Ok(Self {
            payload_size,
            next_seq: 0,
        })
    }

    /// 把数据切分为数据包
    pub fn packetize(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        data.chunks(self.payload_size)
            .map(|chunk| {
                let seq = self.next_seq;
                self.next_seq = self.next_seq.wrapping_add(1);
                build_packet(seq, chunk)
            })
            .collect()
    }

    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }
}

impl Default for Packetizer {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PDU_PAYLOAD,
            next_seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_roundtrip() {
        let packet = encode_pdu(7, b"image bytes").unwrap();
        assert_eq!(packet.len(), PDU_HEADER_LEN + 11 + PDU_CRC_LEN);

        let pdu = decode_pdu(&packet).unwrap();
        assert_eq!(pdu.seq, 7);
        assert_eq!(pdu.payload, b"image bytes");
    }

    #[test]
    fn test_bit_error_detected() {
        let mut packet = encode_pdu(1, &[0x55; 60]).unwrap();
        packet[10] ^= 0x04;
        assert!(matches!(
            decode_pdu(&packet),
            Err(PduError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_packet() {
        let packet = encode_pdu(1, b"abcdef").unwrap();
        assert_eq!(
            decode_pdu(&packet[..packet.len() - 1]),
            Err(PduError::LengthMismatch {
                declared: 6,
                actual: 5
            })
        );
        assert_eq!(
            decode_pdu(&packet[..3]),
            Err(PduError::TooShort { len: 3, min: 8 })
        );
    }

    #[test]
    fn test_packetizer_sequence_continues() {
        let mut packetizer = Packetizer::new(60).unwrap();
        let data = vec![0xAB; 150];

        let packets = packetizer.packetize(&data);
        assert_eq!(packets.len(), 3);

        let sizes: Vec<_> = packets
            .iter()
            .map(|p| decode_pdu(p).unwrap().payload.len())
            .collect();
        assert_eq!(sizes, vec![60, 60, 30]);

        let more = packetizer.packetize(b"x");
        assert_eq!(decode_pdu(&more[0]).unwrap().seq, 3);
    }

    #[test]
    fn test_packetizer_matches_encode() {
        let mut packetizer = Packetizer::default();
        let packets = packetizer.packetize(b"short");
        assert_eq!(packets[0], encode_pdu(0, b"short").unwrap());
    }

    #[test]
    fn test_invalid_payload_size() {
        assert!(Packetizer::new(0).is_err());
        assert!(Packetizer::new(MAX_PDU_PAYLOAD + 1).is_err());
    }
}
