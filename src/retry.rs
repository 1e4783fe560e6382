//! 재시도 / 타임아웃 정책
//!
//! 네트워크 대기는 모두 같은 규칙을 따른다:
//! 한 번의 대기는 `timeout`, 연속 타임아웃이 `max_retries`를 넘으면 치명적.

use std::time::Duration;

/// 고정 타임아웃 + 재시도 상한
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// 새 재시도 정책 생성
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
        }
    }

    /// 이 정책으로 새 카운터 생성
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(*self)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            crate::DEFAULT_MAX_RETRIES,
        )
    }
}

/// 타임아웃 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// 재전송 허용 (몇 번째 재시도인지)
    Retry(u32),

    /// 상한 초과
    Exhausted,
}

/// 한 단계(핸드쉐이크, 데이터, EOF)의 연속 타임아웃 카운터
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryBudget {
    /// 새 예산 생성
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// 대기 한 번의 타임아웃
    pub fn timeout(&self) -> Duration {
        self.policy.timeout
    }

    /// 지금까지의 연속 재시도 횟수
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_retries(&self) -> u32 {
        self.policy.max_retries
    }

    /// 타임아웃 한 번 기록
    pub fn record_timeout(&mut self) -> RetryVerdict {
        if self.attempts >= self.policy.max_retries {
            return RetryVerdict::Exhausted;
        }
        self.attempts += 1;
        RetryVerdict::Retry(self.attempts)
    }

    /// 유효한 응답을 받으면 초기화
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
