//! 运行器集成测试：完整的 连接 → 周期轮询 → 分发 → 停止 流程

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rowwatch::agent::build_jobs;
use rowwatch::config::{AppConfig, DatabaseSection, RetentionRule};
use rowwatch::core::{AgentError, AgentRunner, FnWork, JobWork, PeriodicJob, WatermarkTracker, WorkReport};
use rowwatch::datasource::{format_timestamp, DataSource, MockDataSource, SqliteDataSource, Statement, TableSpec};
use rowwatch::dispatch::{FnHandler, Record, RecordDispatcher};
use rowwatch::jobs::{MaintenanceWork, MonitoringWork};

fn signup_dispatcher(seen: Arc<Mutex<Vec<String>>>) -> Arc<RecordDispatcher> {
    let mut dispatcher = RecordDispatcher::new();
    dispatcher.register(
        "user_signup",
        FnHandler::new("collect", move |record: Record| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(record.get_str("user_id").unwrap_or_default());
                Ok::<(), String>(())
            }
        }),
    );
    Arc::new(dispatcher)
}

fn monitor_job(source: Arc<MockDataSource>, dispatcher: Arc<RecordDispatcher>, interval: Duration, retry: Duration) -> PeriodicJob {
    let work = MonitoringWork::new(source, TableSpec::new("user_events"), WatermarkTracker::new(interval), dispatcher);
    PeriodicJob::new("monitor:user_events", interval, retry, work).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_recovers_from_query_failures_and_dispatches_once() {
    let source = Arc::new(MockDataSource::new());
    source
        .push_query_error("connection reset")
        .push_query_error("connection reset")
        .push_rows(vec![Record::new("user_signup").with_field("user_id", "u-1")]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let runner = AgentRunner::new(source.clone());
    let started = tokio::time::Instant::now();
    runner
        .start(vec![monitor_job(
            source.clone(),
            signup_dispatcher(seen.clone()),
            Duration::from_millis(50),
            Duration::from_millis(10),
        )])
        .await
        .unwrap();

    // 0ms 失败，10ms 失败，20ms 成功
    tokio::time::sleep_until(started + Duration::from_millis(15)).await;
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(source.query_calls(), 2);

    tokio::time::sleep_until(started + Duration::from_millis(65)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["u-1"]);
    assert_eq!(source.query_calls(), 3);

    runner.stop().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_records_dispatched_in_query_order() {
    let source = Arc::new(MockDataSource::new());
    source.push_rows(vec![
        Record::new("user_signup").with_field("user_id", "t2"),
        Record::new("user_signup").with_field("user_id", "t1"),
    ]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut work = MonitoringWork::new(
        source,
        TableSpec::new("user_events"),
        WatermarkTracker::new(Duration::from_secs(60)),
        signup_dispatcher(seen.clone()),
    );

    assert_eq!(work.run().await.unwrap(), WorkReport::items(2));
    assert_eq!(*seen.lock().unwrap(), vec!["t2", "t1"]);
}

#[tokio::test]
async fn test_unknown_discriminant_is_a_no_op() {
    let source = Arc::new(MockDataSource::new());
    source.push_rows(vec![Record::new("order_shipped").with_field("order_id", 7)]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut work = MonitoringWork::new(
        source,
        TableSpec::new("user_events"),
        WatermarkTracker::new(Duration::from_secs(60)),
        signup_dispatcher(seen.clone()),
    );

    assert_eq!(work.run().await.unwrap(), WorkReport::items(0));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_while_sleeping_returns_promptly() {
    let source = Arc::new(MockDataSource::new());
    let runner = AgentRunner::new(source.clone());
    let jobs = build_jobs(&AppConfig::default(), source.clone(), Arc::new(RecordDispatcher::new())).unwrap();
    runner.start(jobs).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let started = Instant::now();
    runner.stop().await;
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(runner.snapshots().await.iter().all(|s| s.is_stopped()));
    assert!(!source.is_connected());
}

#[tokio::test]
async fn test_start_fails_on_connection_error() {
    let runner = AgentRunner::new(Arc::new(MockDataSource::failing_connect("login failed")));
    let err = runner.start(Vec::new()).await.unwrap_err();
    assert!(matches!(err, AgentError::Connection(msg) if msg.contains("login failed")));
}

#[tokio::test]
async fn test_failing_job_does_not_affect_sibling() {
    let source = Arc::new(MockDataSource::new());
    let healthy_runs = Arc::new(AtomicUsize::new(0));
    let counter = healthy_runs.clone();

    let failing = PeriodicJob::new(
        "failing",
        Duration::from_millis(40),
        Duration::from_millis(5),
        FnWork(|| async { Err::<WorkReport, _>(AgentError::Query("always down".into())) }),
    )
    .unwrap();
    let healthy = PeriodicJob::new(
        "healthy",
        Duration::from_millis(20),
        Duration::from_millis(5),
        FnWork(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AgentError>(WorkReport::items(1))
            }
        }),
    )
    .unwrap();

    let runner = AgentRunner::new(source);
    runner.start(vec![failing, healthy]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(110)).await;

    let snapshots = runner.snapshots().await;
    let failing = snapshots.iter().find(|s| s.name == "failing").unwrap();
    let healthy = snapshots.iter().find(|s| s.name == "healthy").unwrap();
    assert!(failing.consecutive_failures >= 2);
    assert_eq!(healthy.consecutive_failures, 0);
    assert!(healthy_runs.load(Ordering::SeqCst) >= 3);

    runner.stop().await;
}

#[tokio::test]
async fn test_retention_purge_is_idempotent_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(SqliteDataSource::new(&DatabaseSection {
        path: dir.path().join("agent.db"),
        ..DatabaseSection::default()
    }));
    source.connect().await.unwrap();
    source
        .execute(&Statement::new(
            "CREATE TABLE audit_logs (id INTEGER PRIMARY KEY, created_date TEXT NOT NULL)",
        ))
        .await
        .unwrap();

    let now = chrono::Utc::now();
    for days_ago in [90, 45, 31, 10, 0] {
        let created = now - chrono::Duration::days(days_ago);
        source
            .execute(&Statement::new("INSERT INTO audit_logs (created_date) VALUES (?1)").bind(format_timestamp(created)))
            .await
            .unwrap();
    }

    let rules = vec![RetentionRule {
        table: "audit_logs".to_string(),
        column: "created_date".to_string(),
        days: 30,
    }];
    let mut work = MaintenanceWork::new(source.clone(), rules, true).unwrap();
    assert_eq!(work.run().await.unwrap(), WorkReport::items(3));
    assert_eq!(work.run().await.unwrap(), WorkReport::items(0));

    source.disconnect().await;
}
