//! rowwatch 入口：加载配置、初始化日志、连接数据源、启动任务，直到收到关闭信号
//!
//! 用法：`rowwatch [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rowwatch::agent::build_jobs;
use rowwatch::config::load_config;
use rowwatch::core::{AgentRunner, RunnerCleanup, ShutdownCoordinator, ShutdownManager};
use rowwatch::datasource::{DataSource, SqliteDataSource};
use rowwatch::handlers::default_dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;
    rowwatch::observability::init(&cfg.log.level);

    // 信号处理器先于连接安装：启动过程中的中断同样走优雅停止
    let manager = Arc::new(ShutdownManager::new());
    let mut reasons = manager.subscribe();
    manager.install_signal_handlers();

    let source: Arc<dyn DataSource> = Arc::new(SqliteDataSource::new(&cfg.database));
    let dispatcher = Arc::new(default_dispatcher());
    let jobs = build_jobs(&cfg, source.clone(), dispatcher).context("Invalid job configuration")?;

    let runner = Arc::new(AgentRunner::new(source));
    runner.start(jobs).await.context("Failed to start agent runner")?;

    manager.wait_for_shutdown().await;
    if let Ok(reason) = reasons.try_recv() {
        tracing::info!(?reason, "shutdown requested");
    }

    let mut coordinator = ShutdownCoordinator::new().with_timeout(Duration::from_secs(cfg.shutdown.timeout_secs));
    coordinator.register(RunnerCleanup::new(runner));
    let incomplete = coordinator.run_cleanup().await;
    if !incomplete.is_empty() {
        // 阻塞线程池上仍可能有未完成的 SQLite 调用；运行时析构会等待它们，因此直接退出
        tracing::error!(tasks = ?incomplete, "shutdown timed out, exiting without waiting for in-flight calls");
        std::process::exit(1);
    }

    Ok(())
}
