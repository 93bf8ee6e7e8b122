//! 数据源抽象
//!
//! 所有后端（SQLite / Mock）实现 DataSource：connect、query（按水位线取新增行）、execute（维护语句）、disconnect。
//! 连接生命周期由数据源自身管理；调用方只持有 Arc<dyn DataSource>。

pub mod mock;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::dispatch::Record;

pub use mock::MockDataSource;
pub use sqlite::SqliteDataSource;

/// 时间戳的存储格式（UTC，文本比较与时间顺序一致）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// 解析存储中的时间戳：本格式、无小数秒格式、RFC 3339
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// 被监控的表：表名 + 创建时间列 + 判别列
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default = "default_created_column")]
    pub created_column: String,
    #[serde(default = "default_discriminant_column")]
    pub discriminant_column: String,
}

fn default_created_column() -> String {
    "created_date".to_string()
}

fn default_discriminant_column() -> String {
    "event_type".to_string()
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_column: default_created_column(),
            discriminant_column: default_discriminant_column(),
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        for ident in [&self.name, &self.created_column, &self.discriminant_column] {
            quote_ident(ident)?;
        }
        Ok(())
    }
}

/// 带位置参数的维护语句
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// 给 SQL 标识符加双引号；含引号或 NUL 的名字拒绝
pub fn quote_ident(ident: &str) -> Result<String, AgentError> {
    if ident.is_empty() || ident.contains('"') || ident.contains('\0') {
        return Err(AgentError::Config(format!("invalid identifier: {ident:?}")));
    }
    Ok(format!("\"{ident}\""))
}

/// 数据源 trait：连接管理、按水位线查询、执行维护语句
#[async_trait]
pub trait DataSource: Send + Sync {
    /// 数据源名称（用于日志）
    fn name(&self) -> &str;

    /// 建立连接；失败为 Connection 错误，启动阶段不重试
    async fn connect(&self) -> Result<(), AgentError>;

    /// 连接测试
    async fn ping(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// 列出可见的表（启动时记录清单）
    async fn list_tables(&self) -> Result<Vec<String>, AgentError> {
        Ok(Vec::new())
    }

    /// 查询创建时间严格晚于 since 的行，按创建时间降序
    async fn query(&self, table: &TableSpec, since: DateTime<Utc>) -> Result<Vec<Record>, AgentError>;

    /// 执行语句，返回受影响行数
    async fn execute(&self, statement: &Statement) -> Result<u64, AgentError>;

    /// 释放连接；可重复调用
    async fn disconnect(&self);
}
