//! rcopy - SREJ 파일 복사 클라이언트 (수신자)
//!
//! 원격 서버에 파일 이름을 요청하고, 받은 데이터를 로컬 파일에 기록한다.
//!
//! 사용법:
//!   rcopy from-filename to-filename window-size buffer-size error-rate remote-machine remote-port
//!
//! 예시:
//!   # 윈도우 10, 버퍼 1000, 에러 20%
//!   cargo run --release --bin rcopy -- big.bin copy.bin 10 1000 0.2 localhost 54321

use std::path::PathBuf;
use std::process::ExitCode;

use tokio::fs::File;
use tokio::io::BufWriter;
use tokio::net::lookup_host;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use srej::{
    ChunkWriter, Config, Connection, Error, ErrorInjector, ReceiverSession, Result,
    TransferStats, UdpTransport, MAX_FILENAME_LEN,
};

const USAGE: &str = "사용법: rcopy from-filename to-filename window-size buffer-size error-rate remote-machine remote-port";

/// 명령행 인자
struct RcopyArgs {
    from_filename: String,
    to_filename: PathBuf,
    remote_host: String,
    remote_port: u16,
    config: Config,
}

fn parse_args() -> std::result::Result<RcopyArgs, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 7 {
        return Err(format!("인자 7개 필요 ({}개 받음)", args.len()));
    }

    for name in &args[..2] {
        if name.is_empty() || name.len() > MAX_FILENAME_LEN {
            return Err(format!(
                "파일 이름 '{}': 1 ~ {} bytes여야 함",
                name, MAX_FILENAME_LEN
            ));
        }
    }

    let window_size = args[2]
        .parse()
        .map_err(|e| format!("window-size '{}': {}", args[2], e))?;
    let buffer_size = args[3]
        .parse()
        .map_err(|e| format!("buffer-size '{}': {}", args[3], e))?;
    let error_rate = args[4]
        .parse()
        .map_err(|e| format!("error-rate '{}': {}", args[4], e))?;
    let remote_port = args[6]
        .parse()
        .map_err(|e| format!("remote-port '{}': {}", args[6], e))?;

    let config = Config::new(window_size, buffer_size).with_error_rate(error_rate);
    config.validate().map_err(|e| e.to_string())?;

    Ok(RcopyArgs {
        from_filename: args[0].clone(),
        to_filename: PathBuf::from(&args[1]),
        remote_host: args[5].clone(),
        remote_port,
        config,
    })
}

async fn copy(args: &RcopyArgs) -> Result<TransferStats> {
    let remote = lookup_host((args.remote_host.as_str(), args.remote_port))
        .await?
        .next()
        .ok_or_else(|| {
            Error::InvalidConfig(format!("호스트를 찾을 수 없음: {}", args.remote_host))
        })?;

    let transport = ErrorInjector::new(
        UdpTransport::connect(remote).await?,
        args.config.error_rate,
        args.config.error_seed,
    );
    let conn = Connection::from_config(transport, &args.config);
    let mut session = ReceiverSession::new(conn, args.from_filename.as_str());

    info!("{}:{} 에 '{}' 요청", args.remote_host, args.remote_port, args.from_filename);
    session.handshake().await?;

    // 원격 파일이 있을 때만 대상 파일을 만든다
    let file = File::create(&args.to_filename)
        .await
        .map_err(|e| Error::local_file(&args.to_filename, e))?;
    let mut writer = ChunkWriter::new(BufWriter::new(file));

    session.receive(&mut writer).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("로깅 초기화 실패");
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(reason) => {
            eprintln!("{}\n{}", reason, USAGE);
            return ExitCode::FAILURE;
        }
    };

    match copy(&args).await {
        Ok(stats) => {
            println!(
                "'{}' -> '{}' 완료",
                args.from_filename,
                args.to_filename.display()
            );
            println!("{}", stats.summary());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("rcopy 실패: {}", e);
            ExitCode::FAILURE
        }
    }
}
