//! 파일 입출력 협력자
//!
//! - [`ChunkReader`]: 원본 파일을 `buffer_size` 이하 청크로 읽는다 (송신측)
//! - [`ChunkWriter`]: 순서대로 전달된 페이로드를 이어 쓴다 (수신측)

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Result;

/// 청크 단위 파일 리더
#[derive(Debug)]
pub struct ChunkReader<R> {
    inner: R,
    eof: bool,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// 새 리더 생성
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            eof: false,
            bytes_read: 0,
        }
    }

    /// 최대 `max_len` 바이트 읽기
    ///
    /// 짧은 읽기를 이어 붙여 청크를 최대한 채운다. 반환값의 `bool`은
    /// 원본 끝에 도달했는지. 끝에 도달한 뒤에는 빈 청크만 돌려준다.
    pub async fn read_chunk(&mut self, max_len: usize) -> Result<(Bytes, bool)> {
        if self.eof {
            return Ok((Bytes::new(), true));
        }

        let mut buf = BytesMut::zeroed(max_len);
        let mut filled = 0;
        while filled < max_len {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        self.bytes_read += filled as u64;
        Ok((buf.freeze(), self.eof))
    }

    /// 지금까지 읽은 바이트
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// 이어 쓰기 파일 라이터
#[derive(Debug)]
pub struct ChunkWriter<W> {
    inner: W,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> ChunkWriter<W> {
    /// 새 라이터 생성
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub async fn append(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// 버퍼에 남은 내용을 내보낸다
    pub async fn finish(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// 지금까지 기록한 바이트
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// 내부 라이터 반환
    pub fn into_inner(self) -> W {
        self.inner
    }
}
