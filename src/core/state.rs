//! 状态定义：JobState 与 JobSnapshot 投影
//!
//! 每个任务循环通过 watch 通道发布轻量快照（阶段、周期数、连续失败数、最近错误），供 AgentRunner 与测试观察。

use serde::Serialize;

/// 任务阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    Running,
    /// after_failure 为 true 时处于回退休眠
    Sleeping { after_failure: bool },
    Stopped,
}

/// 任务看到的「投影」状态
#[derive(Clone, Debug, Serialize)]
pub struct JobSnapshot {
    pub name: String,
    pub state: JobState,
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl JobSnapshot {
    pub fn idle(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: JobState::Idle,
            cycles: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state == JobState::Stopped
    }
}
