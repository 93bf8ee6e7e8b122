//! SQLite 数据源
//!
//! 单个 rusqlite::Connection 放在 Arc<Mutex<Option<_>>> 中，所有任务共享并串行访问；
//! 每次调用在 spawn_blocking 中执行，慢查询不会阻塞其它任务的定时器。
//! 每次调用施加请求超时，超时返回 AgentError::Timeout（阻塞线程上的语句仍会跑完）。
//! 创建时间经 julianday() 比较与排序：空格或 T 分隔、带 Z 或偏移后缀的值都按实际时刻比较，无法解析的值不会被返回。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value;

use crate::config::DatabaseSection;
use crate::core::AgentError;
use crate::datasource::{format_timestamp, parse_timestamp, quote_ident, DataSource, Statement, TableSpec};
use crate::dispatch::Record;

pub struct SqliteDataSource {
    path: PathBuf,
    busy_timeout: Duration,
    request_timeout: Duration,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteDataSource {
    pub fn new(cfg: &DatabaseSection) -> Self {
        Self {
            path: cfg.path.clone(),
            busy_timeout: Duration::from_secs(cfg.busy_timeout_secs),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs.max(1)),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    /// 在阻塞线程池上使用已建立的连接执行 f，并施加请求超时
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AgentError::Query(format!("{op}: connection mutex poisoned")))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| AgentError::Connection(format!("{op}: not connected")))?;
            f(conn).map_err(|e| AgentError::Query(format!("{op}: {e}")))
        });

        match tokio::time::timeout(self.request_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(AgentError::Query(format!("{op}: blocking task failed: {e}"))),
            Err(_) => Err(AgentError::Timeout(self.request_timeout)),
        }
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn connect(&self) -> Result<(), AgentError> {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        let in_memory = self.is_in_memory();
        let busy_timeout = self.busy_timeout;

        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AgentError::Connection("connection mutex poisoned".to_string()))?;
            if guard.is_some() {
                return Ok(());
            }
            if !in_memory {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AgentError::Connection(format!("create {}: {e}", parent.display()))
                    })?;
                }
            }
            let connection = Connection::open(&path)
                .map_err(|e| AgentError::Connection(format!("open {}: {e}", path.display())))?;
            connection
                .busy_timeout(busy_timeout)
                .map_err(|e| AgentError::Connection(e.to_string()))?;
            *guard = Some(connection);
            Ok::<(), AgentError>(())
        })
        .await
        .map_err(|e| AgentError::Connection(format!("connect task failed: {e}")))??;

        self.ping()
            .await
            .map_err(|e| AgentError::Connection(format!("connection test failed: {e}")))?;
        tracing::info!(path = %self.path.display(), "Connected to SQLite database");
        Ok(())
    }

    async fn ping(&self) -> Result<(), AgentError> {
        self.with_conn("ping", |conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|_| ())
    }

    async fn list_tables(&self) -> Result<Vec<String>, AgentError> {
        self.with_conn("list_tables", |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
    }

    async fn query(&self, table: &TableSpec, since: DateTime<Utc>) -> Result<Vec<Record>, AgentError> {
        let sql = format!(
            "SELECT * FROM {table} WHERE julianday({created}) > julianday(?1) ORDER BY julianday({created}) DESC",
            table = quote_ident(&table.name)?,
            created = quote_ident(&table.created_column)?,
        );
        let since = format_timestamp(since);
        let discriminant_column = table.discriminant_column.clone();
        let created_column = table.created_column.clone();

        self.with_conn("query", move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let rows = stmt.query_map([since], |row| {
                let mut fields = BTreeMap::new();
                for (i, name) in columns.iter().enumerate() {
                    fields.insert(name.clone(), json_from_sql(row.get_ref(i)?));
                }
                Ok(fields)
            })?;

            let mut records = Vec::new();
            for fields in rows {
                records.push(record_from_fields(fields?, &discriminant_column, &created_column));
            }
            Ok(records)
        })
        .await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, AgentError> {
        let sql = statement.sql.clone();
        let params: Vec<SqlValue> = statement.params.iter().map(sql_from_json).collect();
        self.with_conn("execute", move |conn| {
            conn.execute(&sql, rusqlite::params_from_iter(params))
                .map(|n| n as u64)
        })
        .await
    }

    async fn disconnect(&self) {
        let conn = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || {
            let taken = match conn.lock() {
                Ok(mut guard) => guard.take(),
                Err(_) => None,
            };
            match taken {
                Some(connection) => match connection.close() {
                    Ok(()) => true,
                    Err((_, e)) => {
                        tracing::warn!("SQLite close failed: {}", e);
                        true
                    }
                },
                None => false,
            }
        })
        .await
        .unwrap_or(false);

        if closed {
            tracing::info!(path = %self.path.display(), "Disconnected from SQLite database");
        }
    }
}

fn json_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

fn sql_from_json(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn record_from_fields(
    fields: BTreeMap<String, Value>,
    discriminant_column: &str,
    created_column: &str,
) -> Record {
    let discriminant = match fields.get(discriminant_column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let created_at = fields
        .get(created_column)
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    Record {
        discriminant,
        fields,
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn memory_source() -> SqliteDataSource {
        SqliteDataSource::new(&DatabaseSection {
            path: PathBuf::from(":memory:"),
            ..DatabaseSection::default()
        })
    }

    async fn seed(source: &SqliteDataSource) {
        source
            .execute(&Statement::new(
                "CREATE TABLE user_events (
                    id INTEGER PRIMARY KEY,
                    event_type TEXT,
                    user_id TEXT,
                    created_date TEXT NOT NULL
                )",
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_calls_before_connect_fail_with_connection_error() {
        let source = memory_source();
        let err = source.ping().await.unwrap_err();
        assert!(matches!(err, AgentError::Connection(_)));
    }

    #[tokio::test]
    async fn test_query_returns_newer_rows_newest_first() {
        let source = memory_source();
        source.connect().await.unwrap();
        seed(&source).await;

        let base = Utc::now();
        for (id, offset, kind) in [(1, -120, "user_signup"), (2, -30, "user_signup"), (3, -10, "payment_completed")] {
            source
                .execute(
                    &Statement::new(
                        "INSERT INTO user_events (id, event_type, user_id, created_date) VALUES (?1, ?2, ?3, ?4)",
                    )
                    .bind(id)
                    .bind(kind)
                    .bind(format!("u{id}"))
                    .bind(format_timestamp(base + ChronoDuration::seconds(offset))),
                )
                .await
                .unwrap();
        }

        let records = source
            .query(&TableSpec::new("user_events"), base - ChronoDuration::seconds(60))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].discriminant, "payment_completed");
        assert_eq!(records[1].get_str("user_id"), Some("u2".to_string()));
        assert!(records[0].created_at > records[1].created_at);

        assert_eq!(source.list_tables().await.unwrap(), vec!["user_events".to_string()]);
        source.disconnect().await;
        source.disconnect().await;
    }

    #[tokio::test]
    async fn test_mixed_timestamp_formats_compare_by_instant() {
        let source = memory_source();
        source.connect().await.unwrap();
        seed(&source).await;

        for (id, created) in [
            (1, "2026-01-01T00:00:00Z"),
            (2, "2026-01-01T13:00:00+02:00"),
            (3, "2026-01-01T12:30:00"),
            (4, "2026-01-01 12:00:00.500000"),
            (5, "not a timestamp"),
        ] {
            source
                .execute(
                    &Statement::new("INSERT INTO user_events (id, event_type, created_date) VALUES (?1, 'user_signup', ?2)")
                        .bind(id)
                        .bind(created),
                )
                .await
                .unwrap();
        }

        let since = parse_timestamp("2026-01-01 12:00:00").unwrap();
        let records = source.query(&TableSpec::new("user_events"), since).await.unwrap();
        let ids: Vec<String> = records.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec!["3".to_string(), "4".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let source = memory_source();
        source.connect().await.unwrap();
        let err = source
            .query(&TableSpec::new("nope"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Query(_)));
    }
}
