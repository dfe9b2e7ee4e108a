//! 有界重试：指数退避 + 抖动，感知取消
//!
//! 第一次尝试立即执行；可重试错误后休眠 `min(max_delay, base_delay·2^(n-1))·(1±jitter)` 再试，
//! 最多 max_attempts 次，耗尽后返回最后一次错误。取消在退避休眠与进行中的尝试上都会被观察到，
//! 结果总是 `LinkError::Cancelled`，不会被当作普通失败。

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::RetrySection;
use crate::core::LinkError;

/// 判定错误是否可重试
pub type RetryPredicate = Arc<dyn Fn(&LinkError) -> bool + Send + Sync>;

/// 重试策略；不持有可变共享状态，可在任意调用点并发使用
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0.0 ..= 1.0
    pub jitter_factor: f64,
    /// 单次尝试超时；超时计作一次尝试
    pub per_attempt_timeout: Option<Duration>,
    is_retryable: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_factor", &self.jitter_factor)
            .field("per_attempt_timeout", &self.per_attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetrySection::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_factor: 0.0,
            per_attempt_timeout: None,
            is_retryable: Arc::new(LinkError::is_retryable),
        }
    }

    /// 从 [retry] 配置段构建
    pub fn from_config(cfg: &RetrySection) -> Self {
        let policy = Self::new(
            cfg.max_attempts,
            Duration::from_millis(cfg.base_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
        )
        .with_jitter(cfg.jitter_factor);
        match cfg.per_attempt_timeout_ms {
            Some(ms) if ms > 0 => policy.with_timeout(Duration::from_millis(ms)),
            _ => policy,
        }
    }

    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = if factor.is_finite() { factor.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    pub fn with_retry_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&LinkError) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(predicate);
        self
    }

    /// 第 attempt 次失败后的等待时长（attempt 从 1 开始），含随机抖动，且不超过 max_delay
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor)
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, jitter)
    }

    fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let exponential = self.base_delay.saturating_mul(1u32 << exp);
        let capped = exponential.min(self.max_delay);
        let factor = (1.0 + jitter).max(0.0);
        Duration::try_from_secs_f64(capped.as_secs_f64() * factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// 执行 operation，按策略重试
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, LinkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LinkError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(LinkError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                r = self.run_attempt(operation()) => r,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(LinkError::Cancelled) => return Err(LinkError::Cancelled),
                Err(e) => e,
            };

            if !(self.is_retryable)(&err) {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                tracing::warn!("Giving up after {} attempts: {}", attempt, err);
                return Err(err);
            }

            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                "Attempt {}/{} failed ({}), retrying in {:?}",
                attempt,
                self.max_attempts,
                err,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn run_attempt<T, Fut>(&self, fut: Fut) -> Result<T, LinkError>
    where
        Fut: Future<Output = Result<T, LinkError>>,
    {
        match self.per_attempt_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .unwrap_or(Err(LinkError::Timeout)),
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_backoff_delay_bounds() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);
        let policy = RetryPolicy::new(5, base, max).with_jitter(0.25);

        for attempt in 1..5u32 {
            let floor = base.saturating_mul(1 << (attempt - 1)).mul_f64(0.75);
            for _ in 0..200 {
                let delay = policy.backoff_delay(attempt);
                assert!(delay <= max, "attempt {attempt}: {delay:?} > {max:?}");
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            }
        }
    }

    #[test]
    fn test_backoff_is_capped_for_large_attempts() {
        let policy =
            RetryPolicy::new(50, Duration::from_millis(100), Duration::from_secs(2)).with_jitter(1.0);
        for attempt in [10, 31, 40, u32::MAX] {
            assert!(policy.backoff_delay(attempt) <= Duration::from_secs(2));
        }
        assert_eq!(policy.delay_with_jitter(1, 0.0), Duration::from_millis(100));
        assert_eq!(policy.delay_with_jitter(3, 0.0), Duration::from_millis(400));
        assert_eq!(policy.delay_with_jitter(8, 0.0), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = fast_policy(5)
            .execute(&cancel, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(LinkError::Transient(format!("attempt {n}")))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<(), _> = fast_policy(5)
            .execute(&cancel, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(LinkError::Transient(format!("attempt {n}")))
            })
            .await;
        assert_eq!(result, Err(LinkError::Transient("attempt 5".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<(), _> = fast_policy(5)
            .execute(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LinkError::Expired)
            })
            .await;
        assert_eq!(result, Err(LinkError::Expired));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = fast_policy(3).with_retry_predicate(|_| false);
        let result: Result<(), _> = policy
            .execute(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LinkError::Transient("down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(20));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<(), _> = policy
            .execute(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LinkError::Transient("down".into()))
            })
            .await;

        assert_eq!(result, Err(LinkError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_during_attempt_stops_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<(), _> = fast_policy(5)
            .execute(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(LinkError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_huge_max_delay_does_not_overflow() {
        let max = Duration::from_millis(u64::MAX);
        let policy = RetryPolicy::new(5, max, max).with_jitter(1.0);
        for attempt in [1, 2, 40] {
            assert!(policy.backoff_delay(attempt) <= max);
        }
        assert_eq!(policy.delay_with_jitter(3, 1.0), max);
    }

    #[tokio::test]
    async fn test_cancel_before_start_runs_nothing() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = fast_policy(3)
            .execute(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(result, Err(LinkError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_per_attempt_timeout_counts_as_attempt() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = fast_policy(3).with_timeout(Duration::from_millis(20));
        let result: Result<(), _> = policy
            .execute(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(LinkError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
