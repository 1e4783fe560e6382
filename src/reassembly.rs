//! 수신 재조립 버퍼
//!
//! 순서가 어긋나 도착한 패킷을 `seq mod capacity` 슬롯에 보관했다가,
//! 빠진 패킷이 채워지면 연속된 패킷을 한 번에 꺼낸다 (flush).

use std::collections::HashMap;

use bytes::Bytes;

use crate::pdu::Flag;

/// 도착한 시퀀스 번호 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// `seq == expected`
    InOrder,

    /// `seq > expected` (앞에 빠진 패킷이 있음)
    Future,

    /// `seq < expected` (이미 전달됨)
    Duplicate,
}

/// 버퍼에 보관된 패킷
#[derive(Debug, Clone)]
pub struct BufferedPacket {
    pub seq: u32,
    pub flag: Flag,
    pub payload: Bytes,
}

/// 수신 재조립 버퍼 (연결 하나가 독점 소유)
#[derive(Debug)]
pub struct ReceiverBuffer {
    capacity: u32,
    expected: u32,
    highest_seen: i64,
    /// 슬롯 번호 -> 보관 패킷, 보관 중인 패킷 수만큼만 차지한다
    slots: HashMap<usize, BufferedPacket>,
}

impl ReceiverBuffer {
    /// # Panics
    ///
    /// `capacity`가 0이면 패닉.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity >= 1, "buffer capacity must be at least 1");
        Self {
            capacity,
            expected: 0,
            highest_seen: -1,
            slots: HashMap::new(),
        }
    }

    /// 버퍼 슬롯 수
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 다음에 순서대로 전달할 시퀀스
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// 버퍼에 넣은 가장 큰 시퀀스 (없으면 -1)
    pub fn highest_seen(&self) -> i64 {
        self.highest_seen
    }

    fn index(&self, seq: u32) -> usize {
        (seq % self.capacity) as usize
    }

    /// 시퀀스 번호 분류
    pub fn classify(&self, seq: u32) -> Classification {
        if seq == self.expected {
            Classification::InOrder
        } else if seq < self.expected {
            Classification::Duplicate
        } else {
            Classification::Future
        }
    }

    /// 아직 전달되지 않은 항목을 덮어쓰지 않고 보관할 수 있는지
    pub fn in_window(&self, seq: u32) -> bool {
        seq >= self.expected && (seq as u64) < self.expected as u64 + self.capacity as u64
    }

    /// `expected` 이후에 보관된 패킷이 있는지 (빈 자리 존재)
    pub fn has_gap(&self) -> bool {
        self.highest_seen >= self.expected as i64
    }

    /// 패킷 보관
    ///
    /// 같은 슬롯의 이전 항목은 덮어쓴다. 슬롯 재사용은 capacity만큼 전달이
    /// 끝난 뒤에만 가능하므로 이전 항목은 이미 지난 시퀀스다.
    pub fn buffer(&mut self, seq: u32, flag: Flag, payload: Bytes) {
        let index = self.index(seq);
        self.slots.insert(index, BufferedPacket { seq, flag, payload });

        if seq as i64 > self.highest_seen {
            self.highest_seen = seq as i64;
        }
    }

    /// 네트워크에서 바로 전달한 in-order 패킷 소비
    pub fn advance_expected(&mut self) {
        self.expected += 1;
    }

    /// `expected` 슬롯에 그 시퀀스의 패킷이 있는지 (소비하지 않음)
    pub fn has_expected_ready(&self) -> bool {
        self.slots
            .get(&self.index(self.expected))
            .map_or(false, |packet| packet.seq == self.expected)
    }

    /// 보관 중인 패킷 수
    pub fn buffered(&self) -> usize {
        self.slots.len()
    }

    /// `expected` 패킷을 꺼내고 `expected` 증가
    ///
    /// 없으면 `None` (에러 아님).
    pub fn try_fetch_expected(&mut self) -> Option<BufferedPacket> {
        if !self.has_expected_ready() {
            return None;
        }
        let index = self.index(self.expected);
        let packet = self.slots.remove(&index)?;
        self.expected += 1;
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(seq: u32) -> Bytes {
        Bytes::from(format!("packet-{}", seq))
    }

    #[test]
    fn test_classify() {
        let mut buffer = ReceiverBuffer::new(4);
        assert_eq!(buffer.classify(0), Classification::InOrder);
        assert_eq!(buffer.classify(2), Classification::Future);
        buffer.advance_expected();
        buffer.advance_expected();
        assert_eq!(buffer.classify(1), Classification::Duplicate);
        assert_eq!(buffer.classify(2), Classification::InOrder);
    }

    #[test]
    fn test_in_order_arrivals_fetch_one_each() {
        let mut buffer = ReceiverBuffer::new(4);
        for seq in 0..12 {
            buffer.buffer(seq, Flag::Data, data(seq));
            let packet = buffer.try_fetch_expected().unwrap();
            assert_eq!(packet.seq, seq);
            assert_eq!(packet.payload, data(seq));
            assert!(buffer.try_fetch_expected().is_none());
        }
        assert_eq!(buffer.expected(), 12);
    }

    #[test]
    fn test_gap_fill_flushes_contiguous_run() {
        let mut buffer = ReceiverBuffer::new(4);
        buffer.advance_expected(); // 0 전달

        buffer.buffer(2, Flag::Data, data(2));
        buffer.buffer(3, Flag::Data, data(3));
        assert!(buffer.has_gap());
        assert!(!buffer.has_expected_ready());
        assert!(buffer.try_fetch_expected().is_none());

        buffer.buffer(1, Flag::DataResent, data(1));
        let flushed: Vec<u32> = std::iter::from_fn(|| buffer.try_fetch_expected())
            .map(|p| p.seq)
            .collect();
        assert_eq!(flushed, vec![1, 2, 3]);
        assert_eq!(buffer.expected(), 4);
        assert!(!buffer.has_gap());
    }

    #[test]
    fn test_duplicate_leaves_state_untouched() {
        let mut buffer = ReceiverBuffer::new(4);
        for seq in 0..3 {
            buffer.buffer(seq, Flag::Data, data(seq));
            buffer.try_fetch_expected().unwrap();
        }
        buffer.buffer(5, Flag::Data, data(5));
        let expected = buffer.expected();
        let highest = buffer.highest_seen();

        assert_eq!(buffer.classify(0), Classification::Duplicate);
        assert_eq!(buffer.expected(), expected);
        assert_eq!(buffer.highest_seen(), highest);
        assert_eq!(buffer.slots[&1].seq, 5);
    }

    #[test]
    fn test_stale_slot_not_fetched() {
        let mut buffer = ReceiverBuffer::new(2);
        // 슬롯 0에 seq 2가 들어있어도 expected 0과 다르면 꺼내지 않음
        buffer.buffer(2, Flag::Data, data(2));
        assert!(!buffer.has_expected_ready());
        assert!(buffer.try_fetch_expected().is_none());
    }

    #[test]
    fn test_in_window() {
        let mut buffer = ReceiverBuffer::new(4);
        buffer.advance_expected();
        assert!(buffer.in_window(1));
        assert!(buffer.in_window(4));
        assert!(!buffer.in_window(5));
        assert!(!buffer.in_window(0));
    }

    #[test]
    fn test_buffered_eof_keeps_flag() {
        let mut buffer = ReceiverBuffer::new(4);
        buffer.buffer(1, Flag::Eof, Bytes::new());
        buffer.advance_expected();
        let packet = buffer.try_fetch_expected().unwrap();
        assert_eq!(packet.flag, Flag::Eof);
    }

    #[test]
    fn test_far_future_packet_takes_one_slot() {
        let mut buffer = ReceiverBuffer::new(crate::MAX_WINDOW_SIZE - 1);
        assert!(buffer.in_window(20_000_000));
        buffer.buffer(20_000_000, Flag::Data, Bytes::from_static(b"x"));

        assert_eq!(buffer.buffered(), 1);
        assert!(buffer.has_gap());
        assert!(buffer.try_fetch_expected().is_none());
    }

    #[test]
    fn test_fetch_releases_slot() {
        let mut buffer = ReceiverBuffer::new(8);
        buffer.buffer(1, Flag::Data, data(1));
        buffer.buffer(2, Flag::Data, data(2));
        assert_eq!(buffer.buffered(), 2);

        buffer.advance_expected();
        buffer.try_fetch_expected().unwrap();
        assert_eq!(buffer.buffered(), 1);
        buffer.try_fetch_expected().unwrap();
        assert_eq!(buffer.buffered(), 0);
    }
}
