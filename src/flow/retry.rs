use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{JobFlowError, Result};

/// 重试策略 - max_attempts 为执行总次数，1 表示只执行一次不重试
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// 尝试间等待；零退避立即返回，等待中响应取消
    pub(crate) async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if self.backoff.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => Ok(()),
            _ = cancel.cancelled() => Err(JobFlowError::Cancelled),
        }
    }
}
