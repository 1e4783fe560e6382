//! 전송 통계

use std::time::{Duration, Instant};

/// 연결 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 처음 전송한 데이터 패킷 수
    pub data_packets_sent: u64,

    /// 처음 전송한 데이터 바이트
    pub data_bytes_sent: u64,

    /// SREJ로 재전송한 패킷 수
    pub srej_retransmits: u64,

    /// 타임아웃으로 재전송한 패킷 수
    pub timeout_retransmits: u64,

    /// 수신한 데이터 패킷 수 (중복 포함)
    pub data_packets_received: u64,

    /// 파일에 기록한 바이트
    pub bytes_written: u64,

    /// 순서가 어긋나 버퍼에 넣은 패킷 수
    pub packets_buffered: u64,

    /// 빈 자리가 채워져 버퍼에서 꺼낸 패킷 수
    pub packets_flushed: u64,

    /// 중복 수신 패킷 수
    pub duplicates: u64,

    /// 보낸 RR 수
    pub rr_sent: u64,

    /// 보낸 SREJ 수
    pub srej_sent: u64,

    /// 받은 RR 수
    pub rr_received: u64,

    /// 받은 SREJ 수
    pub srej_received: u64,

    /// 체크섬/형식 오류로 버린 패킷 수
    pub corrupted_dropped: u64,

    /// 대기 타임아웃 횟수
    pub timeouts: u64,
}

impl TransferStats {
    /// 새 통계 생성 (시작 시간 기록)
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            data_packets_sent: 0,
            data_bytes_sent: 0,
            srej_retransmits: 0,
            timeout_retransmits: 0,
            data_packets_received: 0,
            bytes_written: 0,
            packets_buffered: 0,
            packets_flushed: 0,
            duplicates: 0,
            rr_sent: 0,
            srej_sent: 0,
            rr_received: 0,
            srej_received: 0,
            corrupted_dropped: 0,
            timeouts: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 총 재전송 수
    pub fn retransmits(&self) -> u64 {
        self.srej_retransmits + self.timeout_retransmits
    }

    /// 유효 처리율 (bytes/sec), 송신측은 보낸 바이트, 수신측은 기록한 바이트 기준
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.data_bytes_sent.max(self.bytes_written) as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.data_packets_sent == 0 {
            return 0.0;
        }
        self.retransmits() as f64 / self.data_packets_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Throughput: {:.1} KB/s | Sent: {} pkts ({} bytes) | Written: {} bytes | Retransmits: {} (SREJ {}, timeout {}) | RR/SREJ sent: {}/{} | Buffered: {} | Duplicates: {} | Dropped: {} | Timeouts: {}",
            self.elapsed().as_secs_f64(),
            self.throughput() / 1024.0,
            self.data_packets_sent,
            self.data_bytes_sent,
            self.bytes_written,
            self.retransmits(),
            self.srej_retransmits,
            self.timeout_retransmits,
            self.rr_sent,
            self.srej_sent,
            self.packets_buffered,
            self.duplicates,
            self.corrupted_dropped,
            self.timeouts,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmit_ratio() {
        let mut stats = TransferStats::new();
        assert_eq!(stats.retransmit_ratio(), 0.0);
        stats.data_packets_sent = 10;
        stats.srej_retransmits = 1;
        stats.timeout_retransmits = 1;
        assert_eq!(stats.retransmits(), 2);
        assert!((stats.retransmit_ratio() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_mentions_counters() {
        let mut stats = TransferStats::new();
        stats.bytes_written = 250;
        stats.srej_sent = 3;
        let summary = stats.summary();
        assert!(summary.contains("Written: 250 bytes"));
        assert!(summary.contains("RR/SREJ sent: 0/3"));
        assert!(summary.contains("Throughput: "));
    }

    #[test]
    fn test_throughput_uses_larger_side() {
        let mut stats = TransferStats::new();
        stats.start_time = Instant::now() - Duration::from_secs(2);
        stats.bytes_written = 4000;
        let rate = stats.throughput();
        assert!(rate > 0.0 && rate <= 2000.0);

        stats.data_bytes_sent = 8000;
        assert!(stats.throughput() > rate);
    }
}
