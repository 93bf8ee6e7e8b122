//! Mock 数据源（用于测试，无需数据库）
//!
//! 按脚本依次返回查询结果（成功批次或失败），脚本耗尽后返回空批次；记录调用次数与收到的 since。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::AgentError;
use crate::datasource::{DataSource, Statement, TableSpec};
use crate::dispatch::Record;

#[derive(Debug, Default)]
pub struct MockDataSource {
    queries: Mutex<VecDeque<Result<Vec<Record>, String>>>,
    executes: Mutex<VecDeque<Result<u64, String>>>,
    connect_error: Option<String>,
    since_seen: Mutex<Vec<DateTime<Utc>>>,
    statements_seen: Mutex<Vec<Statement>>,
    query_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    connected: AtomicBool,
    disconnects: AtomicUsize,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// connect 时返回 Connection 错误
    pub fn failing_connect(message: impl Into<String>) -> Self {
        Self {
            connect_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn push_rows(&self, rows: Vec<Record>) -> &Self {
        lock(&self.queries).push_back(Ok(rows));
        self
    }

    pub fn push_query_error(&self, message: impl Into<String>) -> &Self {
        lock(&self.queries).push_back(Err(message.into()));
        self
    }

    pub fn push_affected(&self, affected: u64) -> &Self {
        lock(&self.executes).push_back(Ok(affected));
        self
    }

    pub fn push_execute_error(&self, message: impl Into<String>) -> &Self {
        lock(&self.executes).push_back(Err(message.into()));
        self
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// 每次 query 收到的 since，按调用顺序
    pub fn since_seen(&self) -> Vec<DateTime<Utc>> {
        lock(&self.since_seen).clone()
    }

    pub fn statements_seen(&self) -> Vec<Statement> {
        lock(&self.statements_seen).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl DataSource for MockDataSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<(), AgentError> {
        if let Some(message) = &self.connect_error {
            return Err(AgentError::Connection(message.clone()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, _table: &TableSpec, since: DateTime<Utc>) -> Result<Vec<Record>, AgentError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.since_seen).push(since);
        match lock(&self.queries).pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(AgentError::Query(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, AgentError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.statements_seen).push(statement.clone());
        match lock(&self.executes).pop_front() {
            Some(Ok(affected)) => Ok(affected),
            Some(Err(message)) => Err(AgentError::Query(message)),
            None => Ok(0),
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
