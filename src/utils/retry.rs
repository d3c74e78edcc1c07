use std::time::Duration;

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// 固定延迟
    Fixed(Duration),
    /// 指数退避
    Exponential {
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
}

impl RetryStrategy {
    /// 计算第 n 次重试的延迟
    pub fn get_delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Fixed(delay) => *delay,
            RetryStrategy::Exponential { initial, multiplier, max_delay } => {
                let delay = initial.as_secs_f64() * multiplier.powf(attempt as f64);
                if !delay.is_finite() || delay >= max_delay.as_secs_f64() {
                    return *max_delay;
                }
                Duration::from_secs_f64(delay)
            }
        }
    }

    /// 轮询用：从轮询间隔开始翻倍，不超过上限
    pub fn poll_backoff(interval: Duration, max_delay: Duration) -> Self {
        if max_delay <= interval {
            return RetryStrategy::Fixed(interval);
        }
        RetryStrategy::Exponential {
            initial: interval,
            multiplier: 2.0,
            max_delay,
        }
    }
}
