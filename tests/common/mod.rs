//! 통합 테스트 공용 도우미

#![allow(dead_code)]

use std::io::Cursor;

use bytes::Bytes;
use srej::pdu::decode;
use srej::{
    ChunkReader, ChunkWriter, Config, Connection, Flag, ReceiverSession, RetryPolicy,
    SenderSession, TransferStats, Transport,
};

/// 한 번의 전송 결과
pub struct Transfer<S, R> {
    pub sender: SenderSession<S, Cursor<Vec<u8>>>,
    pub sender_result: srej::Result<TransferStats>,
    pub receiver: ReceiverSession<R>,
    pub receiver_result: srej::Result<TransferStats>,
    pub output: Vec<u8>,
}

/// 줄 번호가 붙은 텍스트 데이터
pub fn test_data(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len + 64);
    let mut line = 0u32;
    while data.len() < len {
        data.extend_from_slice(format!("[{:06}] selective reject over udp\n", line).as_bytes());
        line += 1;
    }
    data.truncate(len);
    data
}

/// 양쪽 세션을 만들어 끝까지 실행
pub async fn transfer<S, R>(
    sender_side: S,
    receiver_side: R,
    data: &[u8],
    window: u32,
    buffer: u16,
) -> Transfer<S, R>
where
    S: Transport + 'static,
    R: Transport + 'static,
{
    let conn = Connection::new(sender_side, window, buffer, RetryPolicy::default());
    let mut sender = SenderSession::new(conn, ChunkReader::new(Cursor::new(data.to_vec())));
    let sender_task = tokio::spawn(async move {
        let result = sender.run().await;
        (sender, result)
    });

    let config = Config::new(window, buffer);
    let mut receiver = ReceiverSession::new(
        Connection::from_config(receiver_side, &config),
        "source.bin",
    );
    let mut writer = ChunkWriter::new(Vec::new());
    let receiver_result = receiver.receive(&mut writer).await;

    let (sender, sender_result) = sender_task.await.expect("sender task panicked");
    Transfer {
        sender,
        sender_result,
        receiver,
        receiver_result,
        output: writer.into_inner(),
    }
}

/// 프레임 목록을 (seq, flag, payload 길이)로
pub fn summarize(frames: &[Bytes]) -> Vec<(u32, Flag, usize)> {
    frames
        .iter()
        .map(|frame| {
            let pdu = decode(frame).expect("sent frame must decode");
            (pdu.seq, pdu.flag, pdu.payload.len())
        })
        .collect()
}

/// 프레임 하나가 주어진 플래그/시퀀스인지
pub fn is_frame(frame: &[u8], flag: Flag, seq: u32) -> bool {
    decode(frame).map_or(false, |pdu| pdu.flag == flag && pdu.seq == seq)
}
