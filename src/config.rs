//! 프로토콜 설정

use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::{
    Error, Result, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, MAX_BUFFER_SIZE, MAX_WINDOW_SIZE,
};

/// SREJ 연결 설정
///
/// 명령행 검증은 바이너리가 하고, 여기서는 이미 채워진 값을 받는다.
#[derive(Debug, Clone)]
pub struct Config {
    /// 윈도우 크기 (패킷 수, 1 이상 2^30 미만)
    pub window_size: u32,

    /// 패킷당 최대 페이로드 (바이트, 1 ~ 1400)
    pub buffer_size: u16,

    /// 에러 주입 비율 (0.0 ~ 1.0)
    /// 프로토콜 엔진은 보지 않고 `ErrorInjector`만 사용
    pub error_rate: f64,

    /// 에러 주입 RNG 시드 (None이면 OS 엔트로피)
    pub error_seed: Option<u64>,

    /// 대기 한 번의 타임아웃 (밀리초)
    pub timeout_ms: u64,

    /// 연속 타임아웃 허용 횟수
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 16,
            buffer_size: 1000,
            error_rate: 0.0,
            error_seed: None,
            timeout_ms: DEFAULT_TIMEOUT_MS, // 1초
            max_retries: DEFAULT_MAX_RETRIES, // 10회
        }
    }
}

impl Config {
    /// 윈도우/버퍼 크기를 지정한 설정
    pub fn new(window_size: u32, buffer_size: u16) -> Self {
        Self {
            window_size,
            buffer_size,
            ..Self::default()
        }
    }

    /// 에러 주입 비율 지정
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }

    /// 대기 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.timeout(), self.max_retries)
    }

    /// 범위 검증
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.window_size >= MAX_WINDOW_SIZE {
            return Err(Error::InvalidConfig(format!(
                "window_size {}: 1 이상 {} 미만이어야 함",
                self.window_size, MAX_WINDOW_SIZE
            )));
        }
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "buffer_size {}: 1 이상 {} 이하여야 함",
                self.buffer_size, MAX_BUFFER_SIZE
            )));
        }
        if !(0.0..=1.0).contains(&self.error_rate) {
            return Err(Error::InvalidConfig(format!(
                "error_rate {}: 0.0 ~ 1.0 범위여야 함",
                self.error_rate
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeout_ms는 0일 수 없음".into()));
        }
        Ok(())
    }
}
