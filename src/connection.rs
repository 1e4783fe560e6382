//! 연결 (전송 한 건의 세션 상태)
//!
//! 협상된 윈도우/버퍼 크기, 전송 계층, 재시도 정책, 통계를 묶는다.
//! 프로세스 전역 상태는 없고, 연결끼리는 아무것도 공유하지 않는다.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::pdu::{decode, Pdu};
use crate::retry::RetryPolicy;
use crate::stats::TransferStats;
use crate::transport::{Readiness, Transport};
use crate::{Config, Result, MAX_PDU_LEN};

/// 전송 한 건의 연결
#[derive(Debug)]
pub struct Connection<T> {
    transport: T,
    window_size: u32,
    buffer_size: u16,
    retry: RetryPolicy,
    stats: TransferStats,
    /// 최대 PDU보다 한 바이트 크게 잡아 초과 길이를 감지한다
    recv_buf: Vec<u8>,
}

impl<T: Transport> Connection<T> {
    /// 새 연결 생성
    pub fn new(transport: T, window_size: u32, buffer_size: u16, retry: RetryPolicy) -> Self {
        Self {
            transport,
            window_size,
            buffer_size,
            retry,
            stats: TransferStats::new(),
            recv_buf: vec![0u8; MAX_PDU_LEN + 1],
        }
    }

    /// 설정값으로 연결 생성 (요청측)
    pub fn from_config(transport: T, config: &Config) -> Self {
        Self::new(
            transport,
            config.window_size,
            config.buffer_size,
            config.retry_policy(),
        )
    }

    /// 협상된 윈도우 크기 (패킷 수)
    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// 협상된 최대 페이로드 길이
    pub fn buffer_size(&self) -> u16 {
        self.buffer_size
    }

    /// 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// 전송 통계
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    /// 전송 계층
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// PDU 전송
    pub async fn send_pdu(&mut self, pdu: &Pdu) -> Result<()> {
        self.send_frame(&pdu.to_bytes()).await
    }

    /// 이미 인코딩된 프레임 전송
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.transport.send_datagram(frame).await?;
        Ok(())
    }

    /// 지금 읽을 수 있는 유효 PDU 하나 (논블로킹)
    ///
    /// 손상/형식 오류 패킷은 세고 버린 뒤 다음 데이터그램을 본다.
    /// 출발지는 검증을 통과한 뒤에만 전송 계층에 알린다.
    pub fn try_recv_pdu(&mut self) -> Result<Option<Pdu>> {
        loop {
            let Some((len, from)) = self.transport.recv_datagram(&mut self.recv_buf)? else {
                return Ok(None);
            };
            match decode(&self.recv_buf[..len]) {
                Ok(pdu) => {
                    self.transport.confirm_source(from);
                    return Ok(Some(pdu));
                }
                Err(e) if e.is_recoverable() => {
                    self.stats.corrupted_dropped += 1;
                    debug!("{}에서 온 {} bytes 패킷 폐기: {}", from, len, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `deadline`까지 유효 PDU 하나 대기, 시간이 다 되면 `None`
    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Pdu>> {
        loop {
            if let Some(pdu) = self.try_recv_pdu()? {
                return Ok(Some(pdu));
            }

            let now = Instant::now();
            if now >= deadline {
                self.stats.timeouts += 1;
                return Ok(None);
            }
            if self.transport.wait_readable(deadline - now).await? == Readiness::TimedOut {
                self.stats.timeouts += 1;
                return Ok(None);
            }
        }
    }

    /// 최대 `timeout` 동안 유효 PDU 하나 대기
    pub async fn recv_pdu(&mut self, timeout: Duration) -> Result<Option<Pdu>> {
        self.recv_until(Instant::now() + timeout).await
    }
}
