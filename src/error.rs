//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// SREJ 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("체크섬 불일치: 재계산 결과 {computed:04X}")]
    Checksum { computed: u16 },

    #[error("PDU가 너무 짧음: {len} bytes (헤더 {header} bytes)")]
    Truncated { len: usize, header: usize },

    #[error("PDU가 너무 큼: {len} bytes (최대 {max} bytes)")]
    Oversized { len: usize, max: usize },

    #[error("알 수 없는 플래그: {0}")]
    UnknownFlag(u8),

    #[error("잘못된 페이로드 ({context}): {reason}")]
    MalformedPayload {
        context: &'static str,
        reason: String,
    },

    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),

    #[error("윈도우 가득 참: capacity={capacity}")]
    WindowFull { capacity: u32 },

    #[error("윈도우에 없는 시퀀스: seq={seq}")]
    NotInWindow { seq: u32 },

    #[error("핸드쉐이크 타임아웃: 파일 이름 요청 {attempts}회 전송 후 응답 없음")]
    HandshakeTimeout { attempts: u32 },

    #[error("상대방 응답 없음: {phase} 단계에서 연속 {retries}회 재시도 초과")]
    PeerUnresponsive { phase: &'static str, retries: u32 },

    #[error("원격 파일 없음: {filename}")]
    RemoteFileNotFound { filename: String },

    #[error("로컬 파일 에러 ({path}): {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// 로컬에서 복구되는 에러인지 (패킷 폐기 또는 대기로 처리)
    ///
    /// 나머지는 전송의 최종 결과로 운영자에게 보고된다.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Checksum { .. }
                | Error::Truncated { .. }
                | Error::Oversized { .. }
                | Error::UnknownFlag(_)
                | Error::MalformedPayload { .. }
                | Error::WindowFull { .. }
                | Error::NotInWindow { .. }
        )
    }

    /// 로컬 파일 에러 생성
    pub fn local_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::LocalFile {
            path: path.into(),
            source,
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
