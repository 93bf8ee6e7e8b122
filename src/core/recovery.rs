//! 失败重试策略
//!
//! 根据 AgentError 类型与连续失败次数返回 RecoveryAction，供 PeriodicJob 循环决定回退多久或停止任务。

use std::time::Duration;

use crate::core::{AgentError, RecoveryAction};

/// 回退增长方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// 每次失败都休眠相同的回退延迟
    Constant,
    /// 每次连续失败翻倍，不超过 max
    Exponential { max: Duration },
}

/// 任务失败后的回退策略：基础延迟 + 增长方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn constant(delay: Duration) -> Self {
        Self {
            base: delay,
            strategy: BackoffStrategy::Constant,
        }
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            strategy: BackoffStrategy::Exponential { max: max.max(base) },
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// 第 n 次连续失败（从 1 开始）后的休眠时长
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Constant => self.base,
            BackoffStrategy::Exponential { max } => {
                let exp = consecutive_failures.saturating_sub(1).min(31);
                self.base.saturating_mul(1u32 << exp).min(max)
            }
        }
    }

    /// 将错误映射为恢复动作：可恢复错误回退重试，其它错误终止任务
    pub fn handle(&self, err: &AgentError, consecutive_failures: u32) -> RecoveryAction {
        if err.is_recoverable() {
            RecoveryAction::RetryAfter(self.delay_for(consecutive_failures))
        } else {
            RecoveryAction::Abort
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_delay_does_not_grow() {
        let policy = RetryPolicy::constant(Duration::from_secs(60));
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(10), Duration::from_secs(60));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_query_error_retries() {
        let policy = RetryPolicy::constant(Duration::from_millis(10));
        let action = policy.handle(&AgentError::Query("timeout".into()), 1);
        assert_eq!(action, RecoveryAction::RetryAfter(Duration::from_millis(10)));
    }

    #[test]
    fn test_fatal_error_aborts() {
        let policy = RetryPolicy::constant(Duration::from_millis(10));
        let action = policy.handle(&AgentError::Fatal("unexpected".into()), 1);
        assert_eq!(action, RecoveryAction::Abort);
    }
}
