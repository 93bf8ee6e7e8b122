//! 任务装配：把配置变成一组 PeriodicJob
//!
//! 每张被监控的表一个 `monitor:<table>` 任务（各自持有独立的水位线），外加一个 `maintenance` 任务。
//! 所有任务共享同一个数据源与同一个分发器。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{AgentError, PeriodicJob, WatermarkTracker};
use crate::datasource::DataSource;
use crate::dispatch::RecordDispatcher;
use crate::jobs::{MaintenanceWork, MonitoringWork};

pub const MAINTENANCE_JOB: &str = "maintenance";

pub fn monitor_job_name(table: &str) -> String {
    format!("monitor:{table}")
}

/// 根据配置构建全部任务；任何非法间隔或标识符都会在启动前以 Config 错误返回
pub fn build_jobs(
    cfg: &AppConfig,
    source: Arc<dyn DataSource>,
    dispatcher: Arc<RecordDispatcher>,
) -> Result<Vec<PeriodicJob>, AgentError> {
    let mut jobs = Vec::with_capacity(cfg.monitoring.tables.len() + 1);

    let interval = Duration::from_secs(cfg.monitoring.interval_secs);
    let retry_delay = Duration::from_secs(cfg.monitoring.retry_delay_secs);
    for table in &cfg.monitoring.tables {
        table.validate()?;
        let work = MonitoringWork::new(
            source.clone(),
            table.clone(),
            WatermarkTracker::new(interval),
            dispatcher.clone(),
        );
        jobs.push(PeriodicJob::with_policy(
            monitor_job_name(&table.name),
            interval,
            cfg.backoff.policy(retry_delay, interval),
            work,
        )?);
    }

    let interval = Duration::from_secs(cfg.maintenance.interval_secs);
    let retry_delay = Duration::from_secs(cfg.maintenance.retry_delay_secs);
    let work = MaintenanceWork::new(source, cfg.maintenance.retention.clone(), cfg.maintenance.analyze)?;
    jobs.push(PeriodicJob::with_policy(
        MAINTENANCE_JOB,
        interval,
        cfg.backoff.policy(retry_delay, interval),
        work,
    )?);

    tracing::info!(
        jobs = jobs.len(),
        handlers = %dispatcher.discriminants().join(", "),
        "jobs assembled"
    );
    Ok(jobs)
}
