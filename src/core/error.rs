//! 代理错误类型与恢复动作
//!
//! 与 RetryPolicy 配合：根据 AgentError 决定 RetryAfter（回退延迟后重试）或 Abort（停止该任务）。

use std::time::Duration;

use thiserror::Error;

/// 单个处理器失败（批次内收集，不中断后续记录）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub discriminant: String,
    pub message: String,
}

/// 代理运行过程中可能出现的错误（连接、查询、处理器、超时、配置等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Handler '{discriminant}' failed: {message}")]
    Handler {
        discriminant: String,
        message: String,
    },

    /// 同一批次内一个或多个处理器失败；批次已完整分发
    #[error("{} of {total} records failed in handlers", failures.len())]
    HandlerBatch {
        failures: Vec<HandlerFailure>,
        total: usize,
    },

    #[error("Data source call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl AgentError {
    /// 可恢复错误在任务边界被捕获并触发回退重试；不可恢复错误使该任务停止
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AgentError::Config(_) | AgentError::Fatal(_))
    }
}

/// 重试策略根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 休眠给定时长后重新执行
    RetryAfter(Duration),
    /// 终止当前任务（兄弟任务不受影响）
    Abort,
}
