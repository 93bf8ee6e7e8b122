//! 处理器注册表与记录分发
//!
//! 所有处理器实现 RecordHandler trait，由 RecordDispatcher 按判别值注册与查找；
//! 处理器表在启动时构建，之后只读，多个监控任务可通过 Arc 共享而无需加锁。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::dispatch::Record;

/// 记录处理器：处理一条已分类的记录，失败返回错误描述
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// 处理器名称（用于日志）
    fn name(&self) -> &str;

    async fn handle(&self, record: &Record) -> Result<(), String>;
}

/// 闭包适配器：把 async 闭包包装为 RecordHandler
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> RecordHandler for FnHandler<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), String>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, record: &Record) -> Result<(), String> {
        (self.f)(record.clone()).await
    }
}

/// 判别值 -> 处理器 的分发表
#[derive(Default)]
pub struct RecordDispatcher {
    handlers: HashMap<String, Arc<dyn RecordHandler>>,
}

impl RecordDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器；同一判别值后注册者覆盖先注册者
    pub fn register(&mut self, discriminant: impl Into<String>, handler: impl RecordHandler + 'static) {
        self.register_arc(discriminant, Arc::new(handler));
    }

    pub fn register_arc(&mut self, discriminant: impl Into<String>, handler: Arc<dyn RecordHandler>) {
        let discriminant = discriminant.into();
        if let Some(old) = self.handlers.insert(discriminant.clone(), handler) {
            tracing::debug!(%discriminant, replaced = old.name(), "handler replaced");
        }
    }

    pub fn discriminants(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// 分发一条记录：找到处理器则调用并传播其失败；未注册的判别值静默忽略，返回 Ok(false)
    pub async fn dispatch(&self, record: &Record) -> Result<bool, AgentError> {
        let Some(handler) = self.handlers.get(&record.discriminant) else {
            tracing::debug!(discriminant = %record.discriminant, "no handler registered, record ignored");
            return Ok(false);
        };
        handler
            .handle(record)
            .await
            .map(|_| true)
            .map_err(|message| AgentError::Handler {
                discriminant: record.discriminant.clone(),
                message,
            })
    }
}
