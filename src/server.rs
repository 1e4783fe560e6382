//! 파일 이름 요청 리스너
//!
//! 잘 알려진 포트에서 FILENAME_REQUEST를 받아, 원본 파일을 열 수 있으면
//! 전송마다 새 UDP 소켓과 tokio 태스크로 [`SenderSession`]을 띄운다.
//! 열 수 없거나 요청이 잘못됐으면 FILENAME_BAD로 답하고 계속 듣는다 (상태 없음).

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::file::ChunkReader;
use crate::pdu::{decode, FilenameRequest, Flag, Pdu};
use crate::sender::SenderSession;
use crate::transport::{ErrorInjector, UdpTransport};
use crate::{Config, Result, MAX_PDU_LEN};

/// FILENAME_BAD 페이로드
const FILENAME_BAD_TEXT: &[u8] = b"file not found";

/// 리스너
#[derive(Debug)]
pub struct Server {
    socket: UdpSocket,
    config: Config,
    root: PathBuf,

    /// 진행 중인 전송의 클라이언트 주소
    active: Arc<DashMap<SocketAddr, ()>>,
}

impl Server {
    /// `addr`에 바인딩, `root` 아래 파일만 제공
    pub async fn bind(addr: SocketAddr, config: Config, root: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            config,
            root: root.into(),
            active: Arc::new(DashMap::new()),
        })
    }

    /// 바인딩된 리스너 주소
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 진행 중인 전송 수
    pub fn active_transfers(&self) -> usize {
        self.active.len()
    }

    /// 요청 수신 루프
    pub async fn run(&self) -> Result<()> {
        info!("리스너 시작: {}", self.local_addr()?);
        let mut buf = vec![0u8; MAX_PDU_LEN + 1];

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.handle_datagram(&buf[..len], from).await {
                warn!("{} 요청 처리 에러: {}", from, e);
            }
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) -> Result<()> {
        let pdu = match decode(datagram) {
            Ok(pdu) => pdu,
            Err(e) => {
                debug!("{}에서 온 패킷 폐기: {}", from, e);
                return Ok(());
            }
        };

        if pdu.flag != Flag::FilenameRequest {
            debug!("리스너에서 무시: {} from {}", pdu.flag, from);
            return Ok(());
        }
        if self.active.contains_key(&from) {
            debug!("{}: 진행 중인 전송의 재전송 요청 무시", from);
            return Ok(());
        }

        let request = match FilenameRequest::from_bytes(&pdu.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("{}: 잘못된 파일 이름 요청: {}", from, e);
                return self.refuse(from, Bytes::from(e.to_string())).await;
            }
        };

        let Some(file) = self.open_source(&request.filename).await else {
            info!("{}: 파일 없음 '{}'", from, request.filename);
            return self
                .refuse(from, Bytes::from_static(FILENAME_BAD_TEXT))
                .await;
        };

        self.spawn_transfer(from, request, file).await
    }

    /// 리스너 소켓에서 FILENAME_BAD 응답
    async fn refuse(&self, to: SocketAddr, status: Bytes) -> Result<()> {
        let bad = Pdu::new(0, Flag::FilenameBad, status);
        self.socket.send_to(&bad.to_bytes(), to).await?;
        Ok(())
    }

    /// `root` 아래 일반 파일만 연다
    async fn open_source(&self, filename: &str) -> Option<File> {
        let path = resolve(&self.root, filename)?;
        let file = File::open(&path).await.ok()?;
        let metadata = file.metadata().await.ok()?;
        metadata.is_file().then_some(file)
    }

    async fn spawn_transfer(
        &self,
        client: SocketAddr,
        request: FilenameRequest,
        file: File,
    ) -> Result<()> {
        let bind_addr: SocketAddr = if self.local_addr()?.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        let transport = ErrorInjector::new(
            UdpTransport::new(socket, client),
            self.config.error_rate,
            self.config.error_seed,
        );
        let conn = Connection::new(
            transport,
            request.window_size,
            request.buffer_size,
            self.config.retry_policy(),
        );
        let mut session = SenderSession::new(conn, ChunkReader::new(file));

        info!(
            "{}: '{}' 전송 (window={}, buffer={})",
            client, request.filename, request.window_size, request.buffer_size
        );
        self.active.insert(client, ());

        let active = self.active.clone();
        let filename = request.filename;
        tokio::spawn(async move {
            match session.run().await {
                Ok(stats) => info!("{}: '{}' 완료 | {}", client, filename, stats.summary()),
                Err(e) => warn!("{}: '{}' 실패: {}", client, filename, e),
            }
            active.remove(&client);
        });

        Ok(())
    }
}

/// 요청 파일 이름을 `root` 기준 경로로
///
/// 절대 경로나 `..`가 들어간 이름은 거부한다.
fn resolve(root: &Path, filename: &str) -> Option<PathBuf> {
    let relative = Path::new(filename);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let named = relative
        .components()
        .any(|c| matches!(c, Component::Normal(_)));
    if !safe || !named {
        return None;
    }
    Some(root.join(relative))
}
