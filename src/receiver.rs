//! 데이터 수신자 (rcopy측 연결)
//!
//! ```text
//! Handshake ──▶ Receiving ──▶ Eof ──▶ Closed
//! ```
//!
//! Receiving 안에서 패킷마다:
//! - in-order: 기록, flush, RR(expected) 한 번
//! - future: 버퍼에 보관, 빈 자리마다 SREJ(expected) 한 번
//! - duplicate: 조용히 버리지 않고 RR(expected)를 다시 보낸다.
//!   잃어버린 RR 때문에 송신자가 같은 패킷을 계속 재전송하는 상황을 끝낸다

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::file::ChunkWriter;
use crate::pdu::{FilenameRequest, Flag, Pdu};
use crate::reassembly::{Classification, ReceiverBuffer};
use crate::retry::RetryVerdict;
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::{Error, Result};

/// EOF 이후 잔류 구간 (타임아웃 배수)
const LINGER_PERIODS: u32 = 3;

/// 수신자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Handshake,
    Receiving,
    /// EOF 확인 후 잔류 (EOF 응답 손실 대비)
    Eof,
    Closed,
}

/// 데이터 수신 세션
pub struct ReceiverSession<T> {
    conn: Connection<T>,
    from_filename: String,
    state: ReceiverState,
    buffer: ReceiverBuffer,

    /// FILENAME_OK보다 먼저 도착한 데이터
    pending: Option<Pdu>,

    /// SREJ를 이미 보낸 빈 자리 (expected 값)
    srej_outstanding: Option<u32>,

    /// EOF 시퀀스
    eof_seq: Option<u32>,
}

impl<T: Transport> ReceiverSession<T> {
    /// 새 수신자 생성
    pub fn new(conn: Connection<T>, from_filename: impl Into<String>) -> Self {
        Self {
            buffer: ReceiverBuffer::new(conn.window_size()),
            conn,
            from_filename: from_filename.into(),
            state: ReceiverState::Handshake,
            pending: None,
            srej_outstanding: None,
            eof_seq: None,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// 재조립 버퍼
    pub fn buffer(&self) -> &ReceiverBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> &TransferStats {
        self.conn.stats()
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.conn
    }

    /// 파일 이름 요청 및 응답 대기
    ///
    /// 타임아웃마다 요청을 다시 보내고, 재전송 상한을 넘기면
    /// `Error::HandshakeTimeout`. FILENAME_BAD는 재시도 없이
    /// `Error::RemoteFileNotFound`.
    pub async fn handshake(&mut self) -> Result<()> {
        let request = FilenameRequest::new(
            self.conn.window_size(),
            self.conn.buffer_size(),
            self.from_filename.as_str(),
        );
        request.validate()?;
        let frame = request.to_pdu().to_bytes();

        self.conn.send_frame(&frame).await?;
        let mut budget = self.conn.retry_policy().budget();

        loop {
            while let Some(pdu) = self.conn.recv_pdu(budget.timeout()).await? {
                match pdu.flag {
                    Flag::FilenameOk => {
                        info!("핸드쉐이크 완료: {}", self.from_filename);
                        self.state = ReceiverState::Receiving;
                        return Ok(());
                    }
                    Flag::FilenameBad => {
                        debug!("FILENAME_BAD: {}", String::from_utf8_lossy(&pdu.payload));
                        self.state = ReceiverState::Closed;
                        return Err(Error::RemoteFileNotFound {
                            filename: self.from_filename.clone(),
                        });
                    }
                    flag if flag.is_data() || flag == Flag::Eof => {
                        // FILENAME_OK 손실
                        debug!("FILENAME_OK 없이 {} 수신, 핸드쉐이크 완료로 간주", flag);
                        self.pending = Some(pdu);
                        self.state = ReceiverState::Receiving;
                        return Ok(());
                    }
                    other => debug!("핸드쉐이크 중 무시: {}", other),
                }
            }

            match budget.record_timeout() {
                RetryVerdict::Retry(attempt) => {
                    debug!("파일 이름 요청 재전송 ({}/{})", attempt, budget.max_retries());
                    self.conn.send_frame(&frame).await?;
                }
                RetryVerdict::Exhausted => {
                    self.state = ReceiverState::Closed;
                    return Err(Error::HandshakeTimeout {
                        attempts: budget.attempts() + 1,
                    });
                }
            }
        }
    }

    /// EOF까지 수신해 `writer`에 순서대로 기록
    pub async fn receive<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut ChunkWriter<W>,
    ) -> Result<TransferStats> {
        let result = self.receive_inner(writer).await;
        if let Err(e) = &result {
            warn!("수신 중단 ({:?}): {}", self.state, e);
        }
        self.state = ReceiverState::Closed;
        result
    }

    async fn receive_inner<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut ChunkWriter<W>,
    ) -> Result<TransferStats> {
        if self.state == ReceiverState::Handshake {
            self.handshake().await?;
        }

        if let Some(pdu) = self.pending.take() {
            self.on_packet(pdu, writer).await?;
        }

        let mut budget = self.conn.retry_policy().budget();
        while self.state == ReceiverState::Receiving {
            match self.conn.recv_pdu(budget.timeout()).await? {
                Some(pdu) => {
                    if pdu.flag.is_data() || pdu.flag == Flag::Eof {
                        budget.reset();
                    }
                    self.on_packet(pdu, writer).await?;
                }
                None => match budget.record_timeout() {
                    RetryVerdict::Retry(attempt) => {
                        debug!("수신 타임아웃 ({}/{})", attempt, budget.max_retries());
                        self.nudge().await?;
                    }
                    RetryVerdict::Exhausted => {
                        return Err(Error::PeerUnresponsive {
                            phase: "receive",
                            retries: budget.max_retries(),
                        });
                    }
                },
            }
        }

        writer.finish().await?;
        let stats = self.conn.stats();
        info!(
            "수신 완료: {} bytes, {} pkts ({} buffered, {} duplicates)",
            stats.bytes_written,
            stats.data_packets_received,
            stats.packets_buffered,
            stats.duplicates
        );

        self.linger().await?;
        Ok(self.conn.stats().clone())
    }

    /// 수신 패킷 하나 처리
    async fn on_packet<W: AsyncWrite + Unpin>(
        &mut self,
        pdu: Pdu,
        writer: &mut ChunkWriter<W>,
    ) -> Result<()> {
        if !(pdu.flag.is_data() || pdu.flag == Flag::Eof) {
            debug!("수신 중 무시: {} seq={}", pdu.flag, pdu.seq);
            return Ok(());
        }
        self.conn.stats_mut().data_packets_received += 1;

        match self.buffer.classify(pdu.seq) {
            Classification::InOrder => {
                self.buffer.advance_expected();
                let mut finished = self.deliver(pdu.seq, pdu.flag, &pdu.payload, writer).await?;

                while !finished {
                    let Some(packet) = self.buffer.try_fetch_expected() else {
                        break;
                    };
                    self.conn.stats_mut().packets_flushed += 1;
                    finished = self
                        .deliver(packet.seq, packet.flag, &packet.payload, writer)
                        .await?;
                }

                if let Some(eof_seq) = self.eof_seq {
                    self.send_ack(Flag::Eof, eof_seq).await?;
                    self.state = ReceiverState::Eof;
                    return Ok(());
                }

                let expected = self.buffer.expected();
                if self.srej_outstanding.map_or(false, |gap| gap < expected) {
                    self.srej_outstanding = None;
                }
                self.send_ack(Flag::Rr, expected).await?;
                if self.buffer.has_gap() {
                    self.request_missing().await?;
                }
            }
            Classification::Future => {
                if !self.buffer.in_window(pdu.seq) {
                    debug!("윈도우 밖 패킷 폐기: seq={}", pdu.seq);
                    return Ok(());
                }
                self.buffer.buffer(pdu.seq, pdu.flag, pdu.payload);
                self.conn.stats_mut().packets_buffered += 1;
                self.request_missing().await?;
            }
            Classification::Duplicate => {
                // 버리기만 하지 않고 현재 위치를 다시 알린다
                self.conn.stats_mut().duplicates += 1;
                let expected = self.buffer.expected();
                debug!("중복 패킷 seq={}, RR {} 재전송", pdu.seq, expected);
                self.send_ack(Flag::Rr, expected).await?;
            }
        }
        Ok(())
    }

    /// 순서대로 전달, EOF면 true
    async fn deliver<W: AsyncWrite + Unpin>(
        &mut self,
        seq: u32,
        flag: Flag,
        payload: &Bytes,
        writer: &mut ChunkWriter<W>,
    ) -> Result<bool> {
        if flag == Flag::Eof {
            self.eof_seq = Some(seq);
            return Ok(true);
        }
        writer.append(payload).await?;
        self.conn.stats_mut().bytes_written += payload.len() as u64;
        Ok(false)
    }

    /// 현재 빈 자리에 SREJ (빈 자리마다 한 번)
    async fn request_missing(&mut self) -> Result<()> {
        let expected = self.buffer.expected();
        if self.srej_outstanding == Some(expected) {
            return Ok(());
        }
        self.srej_outstanding = Some(expected);
        self.send_ack(Flag::Srej, expected).await
    }

    /// 타임아웃 시 상대를 깨운다
    async fn nudge(&mut self) -> Result<()> {
        let expected = self.buffer.expected();
        if self.buffer.has_gap() {
            self.srej_outstanding = Some(expected);
            self.send_ack(Flag::Srej, expected).await
        } else {
            self.send_ack(Flag::Rr, expected).await
        }
    }

    async fn send_ack(&mut self, flag: Flag, seq: u32) -> Result<()> {
        self.conn.send_pdu(&Pdu::ack(flag, seq)).await?;
        let stats = self.conn.stats_mut();
        match flag {
            Flag::Rr => stats.rr_sent += 1,
            Flag::Srej => stats.srej_sent += 1,
            _ => {}
        }
        debug!("{} {} 전송", flag, seq);
        Ok(())
    }

    /// EOF 응답이 손실됐을 때를 위해 잠시 남아 재전송된 EOF에 답한다
    ///
    /// 재전송된 EOF를 받을 때마다 대기 구간(타임아웃 3배)을 새로 시작하고,
    /// 조용한 구간이 한 번 지나가면 끝.
    async fn linger(&mut self) -> Result<()> {
        let Some(eof_seq) = self.eof_seq else {
            return Ok(());
        };
        let policy = self.conn.retry_policy();
        let period = policy.timeout * LINGER_PERIODS;

        for _ in 0..policy.max_retries {
            let Some(pdu) = self.conn.recv_pdu(period).await? else {
                break;
            };
            if pdu.flag == Flag::Eof || pdu.flag.is_data() {
                self.conn.stats_mut().duplicates += 1;
                debug!("EOF 이후 재전송 {} seq={}, EOF 응답 재전송", pdu.flag, pdu.seq);
                self.send_ack(Flag::Eof, eof_seq).await?;
            }
        }
        Ok(())
    }
}
