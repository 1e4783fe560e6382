//! 데이터 송신자 (서버측 연결)
//!
//! ```text
//! Handshake ──▶ Sending ⇄ AwaitingAcks ──▶ EofWait ──▶ Closed
//! ```
//!
//! - Sending: 윈도우가 열려 있는 동안 청크를 읽어 DATA로 전송하고,
//!   바로 읽을 수 있는 ACK를 처리한다
//! - AwaitingAcks: 타임아웃 대기. 타임아웃마다 `lower` 패킷 하나를
//!   DATA_RESENT_TIMEOUT으로 재전송, 연속 10회 초과 시 중단
//! - EofWait: EOF(seq = next_to_send) 전송 후 EOF 응답 대기

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::file::ChunkReader;
use crate::pdu::{Flag, Pdu};
use crate::retry::{RetryBudget, RetryVerdict};
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::window::SenderWindow;
use crate::{Error, Result};

/// FILENAME_OK 페이로드
const FILENAME_OK_TEXT: &[u8] = b"OK";

/// 송신자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Handshake,
    Sending,
    AwaitingAcks,
    EofWait,
    Closed,
}

/// 데이터 송신 세션
///
/// 리스너가 요청을 검증하고 원본 파일을 연 뒤 생성한다.
pub struct SenderSession<T, R> {
    conn: Connection<T>,
    window: SenderWindow,
    reader: ChunkReader<R>,
    state: SenderState,

    /// 원본을 끝까지 읽었는지
    source_exhausted: bool,

    /// 데이터 단계 연속 타임아웃 카운터
    data_budget: RetryBudget,
}

impl<T: Transport, R: AsyncRead + Unpin> SenderSession<T, R> {
    /// 새 송신자 생성
    pub fn new(conn: Connection<T>, reader: ChunkReader<R>) -> Self {
        Self {
            window: SenderWindow::new(conn.window_size()),
            data_budget: conn.retry_policy().budget(),
            conn,
            reader,
            state: SenderState::Handshake,
            source_exhausted: false,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> SenderState {
        self.state
    }

    /// 송신 윈도우
    pub fn window(&self) -> &SenderWindow {
        &self.window
    }

    pub fn stats(&self) -> &TransferStats {
        self.conn.stats()
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.conn
    }

    /// 전송 완료 또는 치명적 에러까지 실행
    pub async fn run(&mut self) -> Result<TransferStats> {
        loop {
            let step = match self.state {
                SenderState::Handshake => self.accept().await,
                SenderState::Sending => self.send_available().await,
                SenderState::AwaitingAcks => self.await_acks().await,
                SenderState::EofWait => self.finish().await,
                SenderState::Closed => break,
            };

            match step {
                Ok(next) => {
                    if next != self.state {
                        debug!("송신 상태: {:?} -> {:?}", self.state, next);
                    }
                    self.state = next;
                }
                Err(e) => {
                    warn!("송신 중단 ({:?}): {}", self.state, e);
                    self.state = SenderState::Closed;
                    return Err(e);
                }
            }
        }

        Ok(self.conn.stats().clone())
    }

    /// 현재 윈도우/원본 상태에서 갈 곳
    fn next_state(&self) -> SenderState {
        if self.source_exhausted {
            if self.window.is_empty() {
                SenderState::EofWait
            } else {
                SenderState::AwaitingAcks
            }
        } else if self.window.is_open() {
            SenderState::Sending
        } else {
            SenderState::AwaitingAcks
        }
    }

    async fn accept(&mut self) -> Result<SenderState> {
        self.send_filename_ok().await?;
        info!(
            "전송 시작: window={}, buffer={}",
            self.conn.window_size(),
            self.conn.buffer_size()
        );
        Ok(SenderState::Sending)
    }

    async fn send_filename_ok(&mut self) -> Result<()> {
        let ok = Pdu::new(0, Flag::FilenameOk, Bytes::from_static(FILENAME_OK_TEXT));
        self.conn.send_pdu(&ok).await
    }

    /// 윈도우가 닫히거나 원본이 끝날 때까지 새 데이터 전송
    async fn send_available(&mut self) -> Result<SenderState> {
        let max_len = self.conn.buffer_size() as usize;

        while self.window.is_open() && !self.source_exhausted {
            let (chunk, eof) = self.reader.read_chunk(max_len).await?;
            if eof {
                self.source_exhausted = true;
            }

            if !chunk.is_empty() {
                let len = chunk.len() as u64;
                let seq = self.window.admit(chunk)?;
                let frame = self.window.get(seq)?.frame().clone();
                self.conn.send_frame(&frame).await?;

                let stats = self.conn.stats_mut();
                stats.data_packets_sent += 1;
                stats.data_bytes_sent += len;
                debug!("DATA 전송: seq={}, {} bytes", seq, len);
            }

            self.drain_acks().await?;
        }

        Ok(self.next_state())
    }

    /// 바로 읽을 수 있는 응답 모두 처리
    async fn drain_acks(&mut self) -> Result<()> {
        while let Some(pdu) = self.conn.try_recv_pdu()? {
            self.handle_control(pdu).await?;
        }
        Ok(())
    }

    /// 응답 대기, 타임아웃이면 가장 오래된 패킷 재전송
    async fn await_acks(&mut self) -> Result<SenderState> {
        let deadline = Instant::now() + self.data_budget.timeout();

        // 윈도우가 움직이면 타이머를 새로 시작한다
        while let Some(pdu) = self.conn.recv_until(deadline).await? {
            let lower = self.window.lower();
            self.handle_control(pdu).await?;
            if self.window.lower() != lower {
                return Ok(self.next_state());
            }
        }

        match self.data_budget.record_timeout() {
            RetryVerdict::Retry(attempt) => {
                let lower = self.window.lower();
                let frame = self.window.get(lower)?.reframe(Flag::DataResentTimeout);
                self.conn.send_frame(&frame).await?;
                self.conn.stats_mut().timeout_retransmits += 1;
                debug!(
                    "타임아웃 재전송: seq={} ({}/{})",
                    lower,
                    attempt,
                    self.data_budget.max_retries()
                );
                Ok(SenderState::AwaitingAcks)
            }
            RetryVerdict::Exhausted => Err(Error::PeerUnresponsive {
                phase: "data",
                retries: self.data_budget.max_retries(),
            }),
        }
    }

    /// 수신자 응답 하나 처리
    async fn handle_control(&mut self, pdu: Pdu) -> Result<()> {
        match pdu.flag {
            Flag::Rr => {
                let ack = pdu.ack_seq();
                let released = self.window.acknowledge_cumulative(ack);
                self.conn.stats_mut().rr_received += 1;
                self.data_budget.reset();
                debug!("RR {} 수신: {} 해제, lower={}", ack, released, self.window.lower());
            }
            Flag::Srej => {
                let seq = pdu.ack_seq();
                self.conn.stats_mut().srej_received += 1;
                self.data_budget.reset();

                // next-expected 규약: seq 아래는 모두 도착했다
                self.window.acknowledge_cumulative(seq);

                match self.window.get(seq) {
                    Ok(entry) => {
                        let frame = entry.reframe(Flag::DataResent);
                        self.conn.send_frame(&frame).await?;
                        self.conn.stats_mut().srej_retransmits += 1;
                        debug!("SREJ {} 재전송", seq);
                    }
                    Err(e) if e.is_recoverable() => {
                        debug!("SREJ {}: 재전송할 패킷 없음", seq);
                    }
                    Err(e) => return Err(e),
                }
            }
            Flag::FilenameRequest => {
                debug!("반복된 파일 이름 요청, FILENAME_OK 재전송");
                self.send_filename_ok().await?;
            }
            other => {
                debug!("송신 중 무시한 패킷: {} seq={}", other, pdu.seq);
            }
        }
        Ok(())
    }

    /// EOF 전송 후 응답 대기
    async fn finish(&mut self) -> Result<SenderState> {
        let eof_seq = self.window.next_to_send();
        let eof = Pdu::new(eof_seq, Flag::Eof, Bytes::new());
        self.conn.send_pdu(&eof).await?;

        let mut budget = self.conn.retry_policy().budget();
        loop {
            if self.await_eof_ack(eof_seq, budget.timeout()).await? {
                let stats = self.conn.stats();
                info!(
                    "전송 완료: {} pkts, {} bytes, {:.2}s",
                    stats.data_packets_sent,
                    stats.data_bytes_sent,
                    stats.elapsed().as_secs_f64()
                );
                return Ok(SenderState::Closed);
            }

            match budget.record_timeout() {
                RetryVerdict::Retry(attempt) => {
                    debug!("EOF 재전송: seq={} ({})", eof_seq, attempt);
                    self.conn.send_pdu(&eof).await?;
                }
                RetryVerdict::Exhausted => {
                    return Err(Error::PeerUnresponsive {
                        phase: "eof",
                        retries: budget.max_retries(),
                    })
                }
            }
        }
    }

    /// 한 타임아웃 동안 EOF 응답 대기
    async fn await_eof_ack(&mut self, eof_seq: u32, timeout: std::time::Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while let Some(pdu) = self.conn.recv_until(deadline).await? {
            let acked = match pdu.flag {
                Flag::Eof => pdu.ack_seq() == eof_seq,
                Flag::Rr => pdu.ack_seq() == eof_seq.wrapping_add(1),
                _ => false,
            };
            if acked {
                return Ok(true);
            }
            if pdu.flag != Flag::Eof {
                self.handle_control(pdu).await?;
            }
        }
        Ok(false)
    }
}
