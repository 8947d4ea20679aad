//! 产物就绪轮询
//!
//! 固定间隔调用检查函数，直到返回结果、超时或被取消

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// 一次轮询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

/// 就绪轮询器
///
/// 先等待再检查，第一次检查发生在一个间隔之后。
/// 总耗时不超过 `timeout + interval`
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPoller {
    interval: Duration,
    timeout: Duration,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 轮询直到 `check` 返回 `Some`
    ///
    /// `check` 返回的错误直接向上传递，不再继续轮询
    pub async fn wait<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let pause = self.interval.min(remaining);

            tokio::select! {
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = sleep(pause) => {}
            }

            if let Some(value) = check().await? {
                return Ok(PollOutcome::Ready(value));
            }

            if Instant::now() >= deadline {
                return Ok(PollOutcome::TimedOut);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_check() {
        let poller = ReadinessPoller::new(Duration::from_secs(3), Duration::from_secs(90));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let counter = Arc::clone(&calls);
        let outcome = poller
            .wait(&CancellationToken::new(), move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok::<_, ()>(if n == 3 { Some("done") } else { None })
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Ready("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_within_one_interval() {
        let poller = ReadinessPoller::new(Duration::from_secs(3), Duration::from_secs(10));
        let started = Instant::now();

        let outcome = poller
            .wait(&CancellationToken::new(), || async { Ok::<Option<()>, ()>(None) })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let poller = ReadinessPoller::new(Duration::from_secs(3), Duration::from_secs(600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(4)).await;
            trigger.cancel();
        });

        let outcome = poller
            .wait(&cancel, || async { Ok::<Option<()>, ()>(None) })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_polling() {
        let poller = ReadinessPoller::new(Duration::from_secs(1), Duration::from_secs(60));
        let result = poller
            .wait(&CancellationToken::new(), || async {
                Err::<Option<()>, _>("page gone")
            })
            .await;
        assert_eq!(result, Err("page gone"));
    }
}
