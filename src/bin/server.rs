//! srej-server - SREJ 파일 복사 서버 (송신자)
//!
//! 작업 디렉터리 기준으로 요청받은 파일을 보낸다. 전송마다 별도 소켓과
//! 태스크를 쓰므로 여러 클라이언트를 동시에 처리한다.
//!
//! 사용법:
//!   srej-server error-rate [port]
//!
//! 예시:
//!   # 에러 없이 54321 포트
//!   cargo run --release --bin srej-server -- 0 54321
//!
//!   # 에러 10%, 포트 자동 선택
//!   cargo run --release --bin srej-server -- 0.1

use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use srej::{Config, Server};

const USAGE: &str = "사용법: srej-server error-rate [port]";

fn parse_args() -> Result<(Config, u16), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.len() > 2 {
        return Err(format!("인자 1~2개 필요 ({}개 받음)", args.len()));
    }

    let error_rate = args[0]
        .parse()
        .map_err(|e| format!("error-rate '{}': {}", args[0], e))?;
    let port = match args.get(1) {
        Some(port) => port
            .parse()
            .map_err(|e| format!("port '{}': {}", port, e))?,
        None => 0,
    };

    let config = Config::default().with_error_rate(error_rate);
    config.validate().map_err(|e| e.to_string())?;
    Ok((config, port))
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("로깅 초기화 실패");
    }

    let (config, port) = match parse_args() {
        Ok(parsed) => parsed,
        Err(reason) => {
            eprintln!("{}\n{}", reason, USAGE);
            return ExitCode::FAILURE;
        }
    };

    info!("에러 주입 비율: {:.1}%", config.error_rate * 100.0);
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    let server = match Server::bind(bind_addr, config, ".").await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("바인딩 실패 ({}): {}", bind_addr, e);
            return ExitCode::FAILURE;
        }
    };

    match server.local_addr() {
        Ok(addr) => println!("Server is using port {}", addr.port()),
        Err(e) => {
            eprintln!("로컬 주소 조회 실패: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = server.run().await {
        eprintln!("서버 종료: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
