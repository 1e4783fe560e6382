//! 송신 윈도우
//!
//! 전송했지만 아직 확인되지 않은 패킷을 `seq mod capacity` 슬롯에 보관한다.
//!
//! ```text
//!  lower            next_to_send      lower + capacity
//!    │                   │                  │
//! ───┼───────────────────┼──────────────────┼──▶ seq
//!    │ <── in flight ──▶ │ <── 전송 가능 ──▶ │
//! ```
//!
//! - RR(n): `[lower, n)` 슬롯 해제, `lower = n`
//! - SREJ(n): `get(n)`으로 해당 패킷 하나만 재전송

use std::collections::HashMap;

use bytes::Bytes;

use crate::pdu::{encode, Flag};
use crate::{Error, Result};

/// 전송 중인 패킷 기록
#[derive(Debug, Clone)]
pub struct InFlight {
    seq: u32,
    payload: Bytes,
    frame: Bytes,
}

impl InFlight {
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// 원본 페이로드 (재전송 시 플래그를 바꿔 다시 프레이밍)
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// 최초 전송한 DATA 프레임
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    /// 재전송용 프레임
    pub fn reframe(&self, flag: Flag) -> Bytes {
        encode(self.seq, flag, &self.payload)
    }
}

/// 송신 윈도우 (연결 하나가 독점 소유)
#[derive(Debug)]
pub struct SenderWindow {
    capacity: u32,
    lower: u32,
    next_to_send: u32,
    /// 슬롯 번호 -> 전송 중인 패킷, 전송 중인 패킷 수만큼만 차지한다
    slots: HashMap<usize, InFlight>,
}

impl SenderWindow {
    /// # Panics
    ///
    /// `capacity`가 0이면 패닉. 설정 검증을 먼저 거쳐야 한다.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            capacity,
            lower: 0,
            next_to_send: 0,
            slots: HashMap::new(),
        }
    }

    /// 윈도우 슬롯 수
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 가장 오래된 미확인 시퀀스
    pub fn lower(&self) -> u32 {
        self.lower
    }

    /// 다음에 할당할 시퀀스
    pub fn next_to_send(&self) -> u32 {
        self.next_to_send
    }

    /// 확인 대기 중인 패킷 수
    pub fn in_flight(&self) -> u32 {
        self.next_to_send - self.lower
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight() == 0
    }

    /// 새 패킷을 보낼 수 있는지
    pub fn is_open(&self) -> bool {
        self.in_flight() < self.capacity
    }

    fn index(&self, seq: u32) -> usize {
        (seq % self.capacity) as usize
    }

    /// 페이로드를 윈도우에 넣고 시퀀스 번호 할당
    ///
    /// 윈도우가 닫혀 있으면 `Error::WindowFull`.
    pub fn admit(&mut self, payload: Bytes) -> Result<u32> {
        if !self.is_open() {
            return Err(Error::WindowFull {
                capacity: self.capacity,
            });
        }

        let seq = self.next_to_send;
        let index = self.index(seq);
        let frame = encode(seq, Flag::Data, &payload);
        // 슬롯 재사용은 capacity만큼 확인이 끝난 뒤에만 일어난다
        self.slots.insert(
            index,
            InFlight {
                seq,
                payload,
                frame,
            },
        );
        self.next_to_send += 1;
        Ok(seq)
    }

    /// 누적 ACK 처리, 해제된 슬롯 수 반환
    ///
    /// `ack_seq <= lower`는 아무 일도 없다. 보낸 적 없는 시퀀스(`> next_to_send`)를
    /// 가리키는 ACK도 무시한다.
    pub fn acknowledge_cumulative(&mut self, ack_seq: u32) -> u32 {
        if ack_seq <= self.lower || ack_seq > self.next_to_send {
            return 0;
        }

        let mut released = 0;
        for seq in self.lower..ack_seq {
            let index = self.index(seq);
            if self.slots.get(&index).map(|entry| entry.seq) == Some(seq) {
                self.slots.remove(&index);
                released += 1;
            }
        }
        self.lower = ack_seq;
        released
    }

    /// 재전송용 패킷 조회
    ///
    /// 이미 확인됐거나 보낸 적 없는 시퀀스면 `Error::NotInWindow`.
    pub fn get(&self, seq: u32) -> Result<&InFlight> {
        if seq < self.lower || seq >= self.next_to_send {
            return Err(Error::NotInWindow { seq });
        }
        self.slots
            .get(&self.index(seq))
            .filter(|entry| entry.seq == seq)
            .ok_or(Error::NotInWindow { seq })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::decode;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn payload(n: u8) -> Bytes {
        Bytes::from(vec![n; 10])
    }

    #[test]
    fn test_admit_until_full() {
        let mut window = SenderWindow::new(3);
        assert_eq!(window.admit(payload(0)).unwrap(), 0);
        assert_eq!(window.admit(payload(1)).unwrap(), 1);
        assert_eq!(window.admit(payload(2)).unwrap(), 2);
        assert!(!window.is_open());
        assert!(matches!(
            window.admit(payload(3)),
            Err(Error::WindowFull { capacity: 3 })
        ));
        assert_eq!(window.next_to_send(), 3);
    }

    #[test]
    fn test_cumulative_ack_slides_window() {
        let mut window = SenderWindow::new(3);
        for n in 0..3 {
            window.admit(payload(n)).unwrap();
        }
        assert_eq!(window.acknowledge_cumulative(2), 2);
        assert_eq!(window.lower(), 2);
        assert!(window.is_open());
        assert!(window.get(0).is_err());
        assert!(window.get(1).is_err());
        assert_eq!(window.get(2).unwrap().seq(), 2);

        // 슬롯 재사용
        assert_eq!(window.admit(payload(3)).unwrap(), 3);
        assert_eq!(window.admit(payload(4)).unwrap(), 4);
        assert!(!window.is_open());
        assert_eq!(window.get(3).unwrap().payload()[0], 3);
    }

    #[test]
    fn test_stale_and_future_acks_ignored() {
        let mut window = SenderWindow::new(4);
        window.admit(payload(0)).unwrap();
        window.admit(payload(1)).unwrap();
        window.acknowledge_cumulative(1);

        assert_eq!(window.acknowledge_cumulative(1), 0);
        assert_eq!(window.acknowledge_cumulative(0), 0);
        assert_eq!(window.lower(), 1);

        assert_eq!(window.acknowledge_cumulative(9), 0);
        assert_eq!(window.lower(), 1);
    }

    #[test]
    fn test_get_never_sent() {
        let mut window = SenderWindow::new(4);
        window.admit(payload(0)).unwrap();
        assert!(matches!(window.get(1), Err(Error::NotInWindow { seq: 1 })));
        assert!(matches!(window.get(4), Err(Error::NotInWindow { seq: 4 })));
    }

    #[test]
    fn test_stored_frame_and_reframe() {
        let mut window = SenderWindow::new(2);
        let seq = window.admit(Bytes::from_static(b"abc")).unwrap();
        let entry = window.get(seq).unwrap();

        let original = decode(entry.frame()).unwrap();
        assert_eq!(original.flag, Flag::Data);
        assert_eq!(&original.payload[..], b"abc");

        let resent = decode(&entry.reframe(Flag::DataResent)).unwrap();
        assert_eq!(resent.flag, Flag::DataResent);
        assert_eq!(resent.seq, seq);
        assert_eq!(&resent.payload[..], b"abc");
    }

    #[test]
    fn test_window_monotonicity_random_ops() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for capacity in [1u32, 2, 5, 16] {
            let mut window = SenderWindow::new(capacity);
            let mut last_lower = 0;
            for _ in 0..2000 {
                if rng.gen_bool(0.6) {
                    let _ = window.admit(payload(0));
                } else {
                    let ack = rng.gen_range(0..=window.next_to_send() + 2);
                    window.acknowledge_cumulative(ack);
                }
                assert!(window.lower() >= last_lower);
                assert!(window.lower() <= window.next_to_send());
                assert!(window.next_to_send() - window.lower() <= capacity);
                last_lower = window.lower();

                for seq in window.lower()..window.next_to_send() {
                    assert_eq!(window.get(seq).unwrap().seq(), seq);
                }
            }
        }
    }

    #[test]
    fn test_large_capacity_holds_only_in_flight() {
        let mut window = SenderWindow::new(crate::MAX_WINDOW_SIZE - 1);
        for n in 0..3 {
            window.admit(payload(n)).unwrap();
        }
        assert_eq!(window.slots.len(), 3);
        window.acknowledge_cumulative(2);
        assert_eq!(window.slots.len(), 1);
    }
}
