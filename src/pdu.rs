//! PDU (Protocol Data Unit) 정의와 코덱
//!
//! ```text
//! Header (7 bytes): [seq:4][checksum:2][flag:1]
//! Payload: 0..buffer_size bytes
//! ```
//!
//! 모든 정수는 네트워크 바이트 순서(big-endian).

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::internet_checksum;
use crate::{Error, Result, HEADER_LEN, MAX_BUFFER_SIZE, MAX_FILENAME_LEN, MAX_PDU_LEN, MAX_WINDOW_SIZE};

/// 체크섬 필드 위치
const CHECKSUM_OFFSET: usize = 4;

/// 플래그 필드 위치
const FLAG_OFFSET: usize = 6;

/// PDU 플래그 (프로토콜 상수)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    /// Receiver-Ready, 누적 ACK
    Rr = 5,

    /// Selective Reject, 빠진 패킷 하나 재요청
    Srej = 6,

    /// 파일 이름 요청 (핸드쉐이크)
    FilenameRequest = 8,

    /// 파일 열기 성공
    FilenameOk = 9,

    /// 전송 종료 및 그 응답
    Eof = 10,

    /// 데이터
    Data = 16,

    /// SREJ로 재전송된 데이터
    DataResent = 17,

    /// 타임아웃으로 재전송된 데이터
    DataResentTimeout = 18,

    /// 파일 없음
    FilenameBad = 33,
}

impl Flag {
    /// 데이터 패킷 계열인지
    pub fn is_data(self) -> bool {
        matches!(self, Flag::Data | Flag::DataResent | Flag::DataResentTimeout)
    }
}

impl TryFrom<u8> for Flag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            5 => Flag::Rr,
            6 => Flag::Srej,
            8 => Flag::FilenameRequest,
            9 => Flag::FilenameOk,
            10 => Flag::Eof,
            16 => Flag::Data,
            17 => Flag::DataResent,
            18 => Flag::DataResentTimeout,
            33 => Flag::FilenameBad,
            other => return Err(Error::UnknownFlag(other)),
        })
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::Rr => "RR",
            Flag::Srej => "SREJ",
            Flag::FilenameRequest => "FILENAME_REQUEST",
            Flag::FilenameOk => "FILENAME_OK",
            Flag::Eof => "EOF",
            Flag::Data => "DATA",
            Flag::DataResent => "DATA_RESENT",
            Flag::DataResentTimeout => "DATA_RESENT_TIMEOUT",
            Flag::FilenameBad => "FILENAME_BAD",
        };
        f.write_str(name)
    }
}

/// 디코딩된 PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub seq: u32,
    pub flag: Flag,
    pub payload: Bytes,
}

impl Pdu {
    /// 새 PDU 생성
    pub fn new(seq: u32, flag: Flag, payload: impl Into<Bytes>) -> Self {
        Self {
            seq,
            flag,
            payload: payload.into(),
        }
    }

    /// RR / SREJ / EOF 응답 PDU
    ///
    /// 헤더 seq와 페이로드 모두 확인 대상 시퀀스를 담는다.
    pub fn ack(flag: Flag, seq: u32) -> Self {
        Self::new(seq, flag, AckPayload(seq).to_bytes())
    }

    /// 와이어 형식으로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        encode(self.seq, self.flag, &self.payload)
    }

    /// 바이트에서 역직렬화 (체크섬 검증 포함)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    /// 응답 PDU가 가리키는 시퀀스 번호
    ///
    /// 페이로드가 4바이트보다 짧으면 헤더 seq를 쓴다.
    pub fn ack_seq(&self) -> u32 {
        AckPayload::from_bytes(&self.payload)
            .map(|ack| ack.0)
            .unwrap_or(self.seq)
    }
}

/// PDU 인코딩
pub fn encode(seq: u32, flag: Flag, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(seq);
    buf.put_u16(0);
    buf.put_u8(flag as u8);
    buf.put_slice(payload);

    let checksum = internet_checksum(&buf);
    buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_be_bytes());
    buf.freeze()
}

/// PDU 디코딩
///
/// 체크섬이 맞지 않으면 `Error::Checksum`. 손상된 패킷은 고치지 않고 버린다.
pub fn decode(bytes: &[u8]) -> Result<Pdu> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Truncated {
            len: bytes.len(),
            header: HEADER_LEN,
        });
    }
    if bytes.len() > MAX_PDU_LEN {
        return Err(Error::Oversized {
            len: bytes.len(),
            max: MAX_PDU_LEN,
        });
    }

    let computed = internet_checksum(bytes);
    if computed != 0 {
        return Err(Error::Checksum { computed });
    }

    let seq = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let flag = Flag::try_from(bytes[FLAG_OFFSET])?;

    Ok(Pdu {
        seq,
        flag,
        payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
    })
}

/// RR / SREJ / EOF 응답의 페이로드 (`[seq:4]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPayload(pub u32);

impl AckPayload {
    pub fn to_bytes(self) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_be_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(Self(u32::from_be_bytes(raw)))
    }
}

/// 파일 이름 요청 (클라이언트 → 서버)
///
/// `[window_size:4][buffer_size:2][filename, NUL 종료]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameRequest {
    /// 요청 윈도우 크기 (패킷 수)
    pub window_size: u32,

    /// 요청 버퍼 크기 (패킷당 페이로드 바이트)
    pub buffer_size: u16,

    /// 원격에서 읽을 파일 이름
    pub filename: String,
}

impl FilenameRequest {
    /// 새 파일 이름 요청 생성
    pub fn new(window_size: u32, buffer_size: u16, filename: impl Into<String>) -> Self {
        Self {
            window_size,
            buffer_size,
            filename: filename.into(),
        }
    }

    /// 범위 검증
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.window_size >= MAX_WINDOW_SIZE {
            return Err(malformed(format!(
                "window_size {} (허용: 1..{})",
                self.window_size, MAX_WINDOW_SIZE
            )));
        }
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(malformed(format!(
                "buffer_size {} (허용: 1..={})",
                self.buffer_size, MAX_BUFFER_SIZE
            )));
        }
        if self.filename.is_empty() || self.filename.len() > MAX_FILENAME_LEN {
            return Err(malformed(format!(
                "filename 길이 {} (허용: 1..={})",
                self.filename.len(),
                MAX_FILENAME_LEN
            )));
        }
        if self.filename.as_bytes().contains(&0) {
            return Err(malformed("filename에 NUL 포함".into()));
        }
        Ok(())
    }

    /// 페이로드 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6 + self.filename.len() + 1);
        buf.put_u32(self.window_size);
        buf.put_u16(self.buffer_size);
        buf.put_slice(self.filename.as_bytes());
        buf.put_u8(0);
        buf.freeze()
    }

    /// 페이로드 역직렬화 + 검증
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 7 {
            return Err(malformed(format!("길이 {} bytes", bytes.len())));
        }

        let window_size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let buffer_size = u16::from_be_bytes([bytes[4], bytes[5]]);

        let name = &bytes[6..];
        let end = name
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("filename NUL 종료 없음".into()))?;
        let filename = std::str::from_utf8(&name[..end])
            .map_err(|e| malformed(format!("filename UTF-8 아님: {}", e)))?
            .to_string();

        let request = Self {
            window_size,
            buffer_size,
            filename,
        };
        request.validate()?;
        Ok(request)
    }

    /// 요청 PDU 생성
    pub fn to_pdu(&self) -> Pdu {
        Pdu::new(0, Flag::FilenameRequest, self.to_bytes())
    }
}

fn malformed(reason: String) -> Error {
    Error::MalformedPayload {
        context: "FILENAME_REQUEST",
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FLAGS: [Flag; 9] = [
        Flag::Rr,
        Flag::Srej,
        Flag::FilenameRequest,
        Flag::FilenameOk,
        Flag::Eof,
        Flag::Data,
        Flag::DataResent,
        Flag::DataResentTimeout,
        Flag::FilenameBad,
    ];

    #[test]
    fn test_header_layout() {
        let bytes = encode(0x0102_0304, Flag::Data, b"xy");
        assert_eq!(bytes.len(), HEADER_LEN + 2);
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(bytes[6], 16);
        assert_eq!(&bytes[7..], b"xy");
    }

    #[test]
    fn test_roundtrip_every_flag() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1400).collect();
        for flag in ALL_FLAGS {
            for len in [0usize, 1, 2, 99, 1400] {
                let bytes = encode(77, flag, &payload[..len]);
                let pdu = decode(&bytes).unwrap();
                assert_eq!(pdu.seq, 77);
                assert_eq!(pdu.flag, flag);
                assert_eq!(&pdu.payload[..], &payload[..len]);
            }
        }
    }

    #[test]
    fn test_every_single_bit_flip_rejected() {
        let bytes = encode(4242, Flag::Data, b"hello, lossy world");
        for bit in 0..bytes.len() * 8 {
            let mut corrupt = bytes.to_vec();
            corrupt[bit / 8] ^= 1 << (bit % 8);
            assert!(
                matches!(decode(&corrupt), Err(Error::Checksum { .. })),
                "bit {} not detected",
                bit
            );
        }
    }

    #[test]
    fn test_short_and_oversized_rejected() {
        assert!(matches!(decode(&[0; 6]), Err(Error::Truncated { .. })));
        let huge = vec![0u8; MAX_PDU_LEN + 1];
        assert!(matches!(decode(&huge), Err(Error::Oversized { .. })));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let mut raw = vec![0, 0, 0, 1, 0, 0, 99];
        let sum = internet_checksum(&raw);
        raw[4..6].copy_from_slice(&sum.to_be_bytes());
        assert!(matches!(decode(&raw), Err(Error::UnknownFlag(99))));
    }

    #[test]
    fn test_ack_carries_sequence() {
        let pdu = Pdu::ack(Flag::Srej, 31);
        let decoded = Pdu::from_bytes(&pdu.to_bytes()).unwrap();
        assert_eq!(decoded.flag, Flag::Srej);
        assert_eq!(decoded.seq, 31);
        assert_eq!(decoded.ack_seq(), 31);
    }

    #[test]
    fn test_filename_request_roundtrip() {
        let request = FilenameRequest::new(4, 100, "src.txt");
        let payload = request.to_bytes();
        assert_eq!(payload.len(), 6 + 7 + 1);
        assert_eq!(payload[payload.len() - 1], 0);
        assert_eq!(FilenameRequest::from_bytes(&payload).unwrap(), request);
    }

    #[test]
    fn test_filename_request_validation() {
        let too_long = "a".repeat(MAX_FILENAME_LEN + 1);
        assert!(FilenameRequest::new(4, 100, too_long).validate().is_err());
        assert!(FilenameRequest::new(0, 100, "f").validate().is_err());
        assert!(FilenameRequest::new(MAX_WINDOW_SIZE, 100, "f").validate().is_err());
        assert!(FilenameRequest::new(4, 0, "f").validate().is_err());
        assert!(FilenameRequest::new(4, 1401, "f").validate().is_err());
        assert!(FilenameRequest::new(4, 1400, "a".repeat(100)).validate().is_ok());
    }

    #[test]
    fn test_filename_request_without_nul_rejected() {
        let mut payload = FilenameRequest::new(4, 100, "abc").to_bytes().to_vec();
        payload.pop();
        assert!(FilenameRequest::from_bytes(&payload).is_err());
    }
}
