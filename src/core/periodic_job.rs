//! 周期任务：间隔 + 失败回退延迟 + 隔离边界
//!
//! 状态机：Idle → Running → Sleeping(成功: interval / 失败: 回退延迟) → Running … → Stopped。
//! 取消令牌只在休眠处观察：正在执行的工作会完整跑完当前单元，休眠中的任务立即退出。

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, JobSnapshot, JobState, RecoveryAction, RetryPolicy};

/// 一次工作单元的结果摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkReport {
    /// 处理的条目数（分发的记录 / 受影响的行）
    pub items: u64,
}

impl WorkReport {
    pub fn items(items: u64) -> Self {
        Self { items }
    }
}

/// 任务的工作函数：无参数、可能失败；同一任务内严格串行调用，因此可持有可变状态
#[async_trait]
pub trait JobWork: Send {
    async fn run(&mut self) -> Result<WorkReport, AgentError>;
}

/// 闭包适配器：把返回 Future 的 FnMut 包装为 JobWork
pub struct FnWork<F>(pub F);

#[async_trait]
impl<F, Fut> JobWork for FnWork<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<WorkReport, AgentError>> + Send,
{
    async fn run(&mut self) -> Result<WorkReport, AgentError> {
        (self.0)().await
    }
}

/// 任务退出原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobExit {
    /// 收到取消信号
    Cancelled,
    /// 不可恢复错误，任务自行停止
    Aborted(String),
}

pub struct PeriodicJob {
    name: String,
    interval: Duration,
    retry: RetryPolicy,
    work: Box<dyn JobWork>,
}

impl std::fmt::Debug for PeriodicJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicJob")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PeriodicJob {
    /// 恒定回退延迟；retry_delay 必须严格短于 interval
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        retry_delay: Duration,
        work: impl JobWork + 'static,
    ) -> Result<Self, AgentError> {
        Self::with_policy(name, interval, RetryPolicy::constant(retry_delay), work)
    }

    pub fn with_policy(
        name: impl Into<String>,
        interval: Duration,
        retry: RetryPolicy,
        work: impl JobWork + 'static,
    ) -> Result<Self, AgentError> {
        let name = name.into();
        if interval.is_zero() {
            return Err(AgentError::Config(format!("job '{name}': interval must be positive")));
        }
        if retry.base_delay().is_zero() || retry.base_delay() >= interval {
            return Err(AgentError::Config(format!(
                "job '{name}': retry delay {:?} must be positive and shorter than interval {:?}",
                retry.base_delay(),
                interval
            )));
        }
        Ok(Self {
            name,
            interval,
            retry,
            work: Box::new(work),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// 运行任务直到取消或不可恢复错误；每次状态变化写入 snapshot
    pub async fn run(mut self, token: CancellationToken, snapshot: watch::Sender<JobSnapshot>) -> JobExit {
        let name = self.name.clone();
        let mut cycle: u64 = 0;
        let mut failures: u32 = 0;
        tracing::info!(job = %name, interval_ms = self.interval.as_millis() as u64, "job started");

        let exit = loop {
            if token.is_cancelled() {
                break JobExit::Cancelled;
            }

            cycle += 1;
            snapshot.send_modify(|s| {
                s.state = JobState::Running;
                s.cycles = cycle;
            });

            let (delay, after_failure) = match self.work.run().await {
                Ok(report) => {
                    failures = 0;
                    tracing::info!(job = %name, cycle, items = report.items, "cycle completed");
                    snapshot.send_modify(|s| {
                        s.consecutive_failures = 0;
                        s.last_error = None;
                    });
                    (self.interval, false)
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let message = e.to_string();
                    snapshot.send_modify(|s| {
                        s.consecutive_failures = failures;
                        s.last_error = Some(message.clone());
                    });
                    match self.retry.handle(&e, failures) {
                        RecoveryAction::RetryAfter(delay) => {
                            let delay = delay.min(self.interval);
                            tracing::warn!(
                                job = %name,
                                cycle,
                                failures,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "cycle failed, retrying after fallback delay"
                            );
                            (delay, true)
                        }
                        RecoveryAction::Abort => {
                            tracing::error!(job = %name, cycle, error = %e, "unrecoverable failure, job stopped");
                            break JobExit::Aborted(message);
                        }
                    }
                }
            };

            snapshot.send_modify(|s| s.state = JobState::Sleeping { after_failure });
            tokio::select! {
                biased;
                _ = token.cancelled() => break JobExit::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        };

        snapshot.send_modify(|s| s.state = JobState::Stopped);
        tracing::info!(job = %name, cycles = cycle, "job stopped");
        exit
    }
}
