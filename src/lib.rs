//! # SREJ (Selective Reject File Copy)
//!
//! UDP 위에서 동작하는 신뢰성 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **슬라이딩 윈도우**: 고정 크기 윈도우로 흐름 제어
//! - **누적 ACK (RR)**: 다음에 기대하는 시퀀스 번호를 알림
//! - **선택적 재전송 (SREJ)**: 빠진 패킷 하나만 다시 요청
//! - **Flush**: 빈 자리가 채워지면 버퍼에 쌓인 패킷을 한 번에 기록
//! - **제한된 재시도**: 모든 대기는 1초 타임아웃, 최대 10회 재시도
//!
//! 프로토콜 엔진은 [`Transport`] 트레이트 위에서만 동작하므로
//! 실제 UDP 소켓, 에러 주입 래퍼, 메모리 링크 어디서든 같은 코드가 돈다.

pub mod checksum;
pub mod config;
pub mod connection;
pub mod error;
pub mod file;
pub mod pdu;
pub mod reassembly;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod server;
pub mod stats;
pub mod transport;
pub mod window;

pub use config::Config;
pub use connection::Connection;
pub use error::{Error, Result};
pub use file::{ChunkReader, ChunkWriter};
pub use pdu::{AckPayload, Flag, FilenameRequest, Pdu};
pub use reassembly::{Classification, ReceiverBuffer};
pub use receiver::{ReceiverSession, ReceiverState};
pub use retry::{RetryBudget, RetryPolicy, RetryVerdict};
pub use sender::{SenderSession, SenderState};
pub use server::Server;
pub use stats::TransferStats;
pub use transport::{ErrorInjector, MemoryTransport, Readiness, Transport, UdpTransport};
pub use window::SenderWindow;

/// PDU 헤더 길이 (seq 4 + checksum 2 + flag 1)
pub const HEADER_LEN: usize = 7;

/// 패킷당 최대 페이로드 (바이트)
pub const MAX_BUFFER_SIZE: u16 = 1400;

/// 최대 PDU 크기
pub const MAX_PDU_LEN: usize = MAX_BUFFER_SIZE as usize + HEADER_LEN;

/// 파일 이름 최대 길이 (NUL 제외)
pub const MAX_FILENAME_LEN: usize = 100;

/// 윈도우 크기 상한 (미포함)
pub const MAX_WINDOW_SIZE: u32 = 1 << 30;

/// 기본 대기 타임아웃 (밀리초)
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// 기본 최대 재시도 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 10;
