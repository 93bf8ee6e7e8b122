//! 代理运行器：并发启动全部周期任务，协调停止
//!
//! 持有根 CancellationToken，每个任务分得一个子 token 与一个 watch 快照通道；
//! 每个任务运行在独立的 tokio 任务中，一个任务 panic 不会影响其它任务。

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, JobExit, JobSnapshot, JobState, PeriodicJob};
use crate::datasource::DataSource;

/// 运行器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Created,
    Running,
    Stopped,
}

/// 一个已启动的任务：任务句柄、快照接收端，以及任务异常结束时由运行器补写的终态
struct JobSlot {
    name: String,
    handle: Option<JoinHandle<JobExit>>,
    snapshot: watch::Receiver<JobSnapshot>,
    terminal: Option<JobSnapshot>,
}

impl JobSlot {
    fn current(&self) -> JobSnapshot {
        self.terminal
            .clone()
            .unwrap_or_else(|| self.snapshot.borrow().clone())
    }
}

struct RunnerInner {
    phase: RunnerPhase,
    jobs: Vec<JobSlot>,
}

pub struct AgentRunner {
    source: Arc<dyn DataSource>,
    token: CancellationToken,
    inner: Mutex<RunnerInner>,
}

impl AgentRunner {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            token: CancellationToken::new(),
            inner: Mutex::new(RunnerInner {
                phase: RunnerPhase::Created,
                jobs: Vec::new(),
            }),
        }
    }

    pub async fn phase(&self) -> RunnerPhase {
        self.inner.lock().await.phase
    }

    /// 连接数据源并并发启动全部任务；任务调度完成即返回，不等待任务结束
    ///
    /// 连接失败返回 Connection 错误，不会启动任何任务。
    pub async fn start(&self, jobs: Vec<PeriodicJob>) -> Result<(), AgentError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != RunnerPhase::Created {
            return Err(AgentError::Config(format!(
                "runner cannot start from phase {:?}",
                inner.phase
            )));
        }

        self.source.connect().await?;
        match self.source.list_tables().await {
            Ok(tables) => tracing::info!(
                source = self.source.name(),
                count = tables.len(),
                tables = %tables.join(", "),
                "data source tables"
            ),
            Err(e) => tracing::warn!(source = self.source.name(), "could not list tables: {}", e),
        }

        for job in jobs {
            let name = job.name().to_string();
            let (tx, rx) = watch::channel(JobSnapshot::idle(name.clone()));
            let handle = tokio::spawn(job.run(self.token.child_token(), tx));
            inner.jobs.push(JobSlot {
                name,
                handle: Some(handle),
                snapshot: rx,
                terminal: None,
            });
        }
        inner.phase = RunnerPhase::Running;
        tracing::info!(jobs = inner.jobs.len(), "agent runner started");
        Ok(())
    }

    /// 当前所有任务的快照
    pub async fn snapshots(&self) -> Vec<JobSnapshot> {
        self.inner.lock().await.jobs.iter().map(JobSlot::current).collect()
    }

    /// 取消全部任务、等待每个任务进入 Stopped，然后断开数据源；重复调用无额外效果
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.phase == RunnerPhase::Stopped {
            return;
        }
        tracing::info!("Stopping agent runner...");
        self.token.cancel();

        let handles: Vec<JoinHandle<JobExit>> = inner
            .jobs
            .iter_mut()
            .filter_map(|slot| slot.handle.take())
            .collect();
        let results = join_all(handles).await;
        for (slot, result) in inner.jobs.iter_mut().zip(results) {
            let name = &slot.name;
            let failure = match result {
                Ok(JobExit::Cancelled) => {
                    tracing::debug!(job = %name, "job cancelled");
                    None
                }
                Ok(JobExit::Aborted(reason)) => {
                    tracing::warn!(job = %name, %reason, "job had already stopped on unrecoverable failure");
                    None
                }
                Err(e) if e.is_panic() => {
                    tracing::error!(job = %name, "job panicked: {}", e);
                    Some(format!("job panicked: {e}"))
                }
                Err(e) => {
                    tracing::warn!(job = %name, "job join failed: {}", e);
                    Some(format!("job join failed: {e}"))
                }
            };
            if let Some(message) = failure {
                let mut last = slot.snapshot.borrow().clone();
                last.state = JobState::Stopped;
                last.last_error = Some(message);
                slot.terminal = Some(last);
            }
        }

        self.source.disconnect().await;
        inner.phase = RunnerPhase::Stopped;
        tracing::info!("Agent runner stopped");
    }
}
