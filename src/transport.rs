//! 전송 계층 추상화
//!
//! 프로토콜 엔진은 세 가지만 요구한다:
//! - 데이터그램 하나 보내기
//! - 읽을 데이터그램이 생기거나 타임아웃이 날 때까지 대기
//! - 지금 읽을 수 있는 데이터그램 하나 꺼내기 (없으면 `None`)
//!
//! 체크섬을 통과한 PDU의 출발지는 [`Transport::confirm_source`]로 통지된다.
//!
//! 구현체:
//! - [`UdpTransport`]: tokio UDP 소켓
//! - [`ErrorInjector`]: 송신 패킷을 확률적으로 버리거나 비트를 뒤집는 래퍼
//! - [`MemoryTransport`]: 프로세스 내부 연결 쌍 (시뮬레이션, 테스트)

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// 대기 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// 읽을 데이터그램이 있음
    Ready,

    /// 타임아웃
    TimedOut,
}

/// 데이터그램 전송 계층
pub trait Transport: Send + Sync {
    /// 데이터그램 하나 전송
    fn send_datagram(&self, buf: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// 읽을 수 있을 때까지 최대 `timeout` 대기
    fn wait_readable(&self, timeout: Duration) -> impl Future<Output = io::Result<Readiness>> + Send;

    /// 논블로킹 수신, 읽을 것이 없으면 `Ok(None)`
    fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// `from`에서 온 데이터그램이 유효한 PDU로 해석됨
    fn confirm_source(&self, _from: SocketAddr) {}
}

// ─────────────────────────────────────────────────────────────────
// UDP
// ─────────────────────────────────────────────────────────────────

/// tokio UDP 소켓 기반 전송
///
/// 서버는 전송마다 새 소켓에서 응답하므로, [`connect`](Self::connect)로 만든
/// 요청측은 첫 유효 PDU의 출발지로 한 번만 상대 주소를 옮긴다.
/// 상대 주소가 정해진 뒤에는 다른 출발지의 데이터그램을 버린다.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: RwLock<SocketAddr>,

    /// 아직 첫 응답을 기다리는 중 (요청측만)
    follow_reply: AtomicBool,
}

impl UdpTransport {
    /// 고정된 상대 주소로 생성
    pub fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer: RwLock::new(peer),
            follow_reply: AtomicBool::new(false),
        }
    }

    /// `peer`와 같은 주소 체계의 임시 포트에 바인딩
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let bind_addr: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        let transport = Self::new(socket, peer);
        transport.follow_reply.store(true, Ordering::Release);
        Ok(transport)
    }

    /// 현재 상대 주소
    pub fn peer(&self) -> SocketAddr {
        *self.peer.read()
    }

    /// 바인딩된 로컬 주소
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    async fn send_datagram(&self, buf: &[u8]) -> io::Result<usize> {
        let peer = self.peer();
        self.socket.send_to(buf, peer).await
    }

    async fn wait_readable(&self, timeout: Duration) -> io::Result<Readiness> {
        match tokio::time::timeout(timeout, self.socket.readable()).await {
            Ok(Ok(())) => Ok(Readiness::Ready),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(Readiness::TimedOut),
        }
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        loop {
            let (len, from) = match self.socket.try_recv_from(buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            };

            if self.follow_reply.load(Ordering::Acquire) || from == self.peer() {
                return Ok(Some((len, from)));
            }
            debug!("상대가 아닌 {}에서 온 {} bytes 폐기", from, len);
        }
    }

    fn confirm_source(&self, from: SocketAddr) {
        if !self.follow_reply.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut peer = self.peer.write();
        if *peer != from {
            debug!("상대 주소 변경: {} -> {}", *peer, from);
            *peer = from;
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// 에러 주입
// ─────────────────────────────────────────────────────────────────

/// 송신 패킷 손상 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Impairment {
    Pass,
    Drop,
    Flip { bit: usize },
}

/// 송신 패킷을 `error_rate` 확률로 버리거나 한 비트 뒤집는 래퍼
///
/// 손상된 패킷의 절반은 버리고 절반은 비트를 뒤집는다.
/// 프로토콜 엔진의 체크섬 검증과 재전송을 시험하기 위한 것.
#[derive(Debug)]
pub struct ErrorInjector<T> {
    inner: T,
    error_rate: f64,
    rng: Mutex<StdRng>,
}

impl<T: Transport> ErrorInjector<T> {
    /// `error_rate`는 [0, 1]로 잘린다. `seed`가 없으면 엔트로피로 초기화
    pub fn new(inner: T, error_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner,
            error_rate: error_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    fn impair(&self, len: usize) -> Impairment {
        if self.error_rate == 0.0 || len == 0 {
            return Impairment::Pass;
        }
        let mut rng = self.rng.lock();
        if !rng.gen_bool(self.error_rate) {
            return Impairment::Pass;
        }
        if rng.gen_bool(0.5) {
            Impairment::Drop
        } else {
            Impairment::Flip {
                bit: rng.gen_range(0..len * 8),
            }
        }
    }
}

impl<T: Transport> Transport for ErrorInjector<T> {
    async fn send_datagram(&self, buf: &[u8]) -> io::Result<usize> {
        match self.impair(buf.len()) {
            Impairment::Pass => self.inner.send_datagram(buf).await,
            Impairment::Drop => {
                debug!("에러 주입: {} bytes 패킷 버림", buf.len());
                Ok(buf.len())
            }
            Impairment::Flip { bit } => {
                debug!("에러 주입: {}번째 비트 반전", bit);
                let mut corrupted = buf.to_vec();
                corrupted[bit / 8] ^= 1 << (bit % 8);
                self.inner.send_datagram(&corrupted).await
            }
        }
    }

    async fn wait_readable(&self, timeout: Duration) -> io::Result<Readiness> {
        self.inner.wait_readable(timeout).await
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_datagram(buf)
    }

    fn confirm_source(&self, from: SocketAddr) {
        self.inner.confirm_source(from)
    }
}

// ─────────────────────────────────────────────────────────────────
// 메모리 링크
// ─────────────────────────────────────────────────────────────────

/// 한 방향 수신함
#[derive(Debug, Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Bytes>>,
    notify: Notify,
}

/// 송신 패킷을 버릴지 결정하는 필터 (true면 버림)
type DropFilter = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// 프로세스 내부 데이터그램 링크의 한쪽 끝
///
/// 보낸 프레임은 모두 기록되고, `drop_when` 필터로 손실을 재현할 수 있다.
pub struct MemoryTransport {
    inbox: Arc<Mailbox>,
    outbox: Arc<Mailbox>,
    remote: SocketAddr,
    filter: Mutex<Option<DropFilter>>,
    sent: Mutex<Vec<Bytes>>,
}

impl MemoryTransport {
    /// 연결된 두 끝 생성
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Mailbox::default());
        let b_to_a = Arc::new(Mailbox::default());
        let addr_a: SocketAddr = (Ipv4Addr::LOCALHOST, 1).into();
        let addr_b: SocketAddr = (Ipv4Addr::LOCALHOST, 2).into();

        let a = Self {
            inbox: b_to_a.clone(),
            outbox: a_to_b.clone(),
            remote: addr_b,
            filter: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        };
        let b = Self {
            inbox: a_to_b,
            outbox: b_to_a,
            remote: addr_a,
            filter: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        };
        (a, b)
    }

    /// 송신 손실 필터 설정
    pub fn drop_when(&self, filter: impl FnMut(&[u8]) -> bool + Send + 'static) {
        *self.filter.lock() = Some(Box::new(filter));
    }

    /// 지금까지 이 끝에서 보낸 프레임 (버려진 것 포함)
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// 아직 읽지 않은 수신 데이터그램 수
    pub fn pending(&self) -> usize {
        self.inbox.queue.lock().len()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("remote", &self.remote)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Transport for MemoryTransport {
    async fn send_datagram(&self, buf: &[u8]) -> io::Result<usize> {
        let frame = Bytes::copy_from_slice(buf);
        self.sent.lock().push(frame.clone());

        let dropped = self
            .filter
            .lock()
            .as_mut()
            .map_or(false, |filter| filter(buf));
        if !dropped {
            self.outbox.queue.lock().push_back(frame);
            self.outbox.notify.notify_one();
        }
        Ok(buf.len())
    }

    async fn wait_readable(&self, timeout: Duration) -> io::Result<Readiness> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.inbox.queue.lock().is_empty() {
                return Ok(Readiness::Ready);
            }
            if tokio::time::timeout_at(deadline, self.inbox.notify.notified())
                .await
                .is_err()
            {
                return Ok(Readiness::TimedOut);
            }
        }
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let Some(frame) = self.inbox.queue.lock().pop_front() else {
            return Ok(None);
        };
        // UDP처럼 버퍼보다 긴 데이터그램은 잘린다
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(Some((len, self.remote)))
    }
}
