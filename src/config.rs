//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ROWWATCH__*` 覆盖（双下划线表示嵌套，如 `ROWWATCH__DATABASE__PATH=/var/lib/rowwatch.db`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryPolicy;
use crate::datasource::TableSpec;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSection,
    pub monitoring: MonitoringSection,
    pub maintenance: MaintenanceSection,
    pub backoff: BackoffSection,
    pub shutdown: ShutdownSection,
    pub log: LogSection,
}

/// [database] 段：连接目标与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite 文件路径，`:memory:` 表示内存库
    pub path: PathBuf,
    pub busy_timeout_secs: u64,
    /// 单次数据源调用超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/rowwatch.db"),
            busy_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

/// [monitoring] 段：轮询间隔、失败回退延迟、被监控的表
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringSection {
    pub interval_secs: u64,
    pub retry_delay_secs: u64,
    pub tables: Vec<TableSpec>,
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            retry_delay_secs: 60,
            tables: vec![TableSpec::new("user_events")],
        }
    }
}

/// [maintenance] 段：维护间隔、失败回退延迟、保留期清理规则
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub interval_secs: u64,
    pub retry_delay_secs: u64,
    pub retention: Vec<RetentionRule>,
    /// 清理后执行 ANALYZE 刷新统计信息
    pub analyze: bool,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            retry_delay_secs: 60 * 60,
            retention: vec![RetentionRule {
                table: "audit_logs".to_string(),
                column: "created_date".to_string(),
                days: 30,
            }],
            analyze: true,
        }
    }
}

/// 删除 table 中 column 早于 days 天前的行
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetentionRule {
    pub table: String,
    #[serde(default = "default_retention_column")]
    pub column: String,
    pub days: u32,
}

fn default_retention_column() -> String {
    "created_date".to_string()
}

/// [backoff] 段：constant（默认，恒定回退）或 exponential（翻倍，封顶 max_secs）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffSection {
    pub strategy: BackoffKind,
    pub max_secs: Option<u64>,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            strategy: BackoffKind::Constant,
            max_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Constant,
    Exponential,
}

impl BackoffSection {
    /// 以 retry_delay 为基础延迟构建策略；exponential 未设 max_secs 时封顶为 interval
    pub fn policy(&self, retry_delay: Duration, interval: Duration) -> RetryPolicy {
        match self.strategy {
            BackoffKind::Constant => RetryPolicy::constant(retry_delay),
            BackoffKind::Exponential => {
                let max = self.max_secs.map(Duration::from_secs).unwrap_or(interval);
                RetryPolicy::exponential(retry_delay, max.min(interval))
            }
        }
    }
}

/// [shutdown] 段：停止时等待任务退出的硬超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownSection {
    pub timeout_secs: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// [log] 段：默认日志级别（RUST_LOG 优先）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ROWWATCH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ROWWATCH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if !path.exists() {
            return Err(config::ConfigError::NotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path.clone()));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ROWWATCH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.monitoring.interval_secs, 300);
        assert_eq!(cfg.monitoring.retry_delay_secs, 60);
        assert_eq!(cfg.monitoring.tables, vec![TableSpec::new("user_events")]);
        assert_eq!(cfg.maintenance.retention[0].days, 30);
        assert_eq!(cfg.backoff.strategy, BackoffKind::Constant);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
path = "/tmp/agent.db"

[monitoring]
interval_secs = 30
retry_delay_secs = 5

[[monitoring.tables]]
name = "orders"
created_column = "CreatedDate"

[maintenance]
analyze = false

[[maintenance.retention]]
table = "sessions"
days = 7

[backoff]
strategy = "exponential"
max_secs = 20
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.database.path, PathBuf::from("/tmp/agent.db"));
        assert_eq!(cfg.database.request_timeout_secs, 30);
        assert_eq!(cfg.monitoring.interval_secs, 30);
        assert_eq!(cfg.monitoring.tables[0].name, "orders");
        assert_eq!(cfg.monitoring.tables[0].created_column, "CreatedDate");
        assert_eq!(cfg.monitoring.tables[0].discriminant_column, "event_type");
        assert_eq!(cfg.maintenance.interval_secs, 86400);
        assert!(!cfg.maintenance.analyze);
        assert_eq!(cfg.maintenance.retention[0].column, "created_date");
        assert_eq!(cfg.backoff.strategy, BackoffKind::Exponential);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/rowwatch.toml"))).is_err());
    }

    #[test]
    fn test_exponential_policy_capped_by_interval() {
        let backoff = BackoffSection {
            strategy: BackoffKind::Exponential,
            max_secs: Some(10_000),
        };
        let policy = backoff.policy(Duration::from_secs(60), Duration::from_secs(300));
        assert_eq!(policy.delay_for(10), Duration::from_secs(300));
    }
}
