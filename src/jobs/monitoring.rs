//! 监控工作：每个周期查询 created > since 的新行，按返回顺序逐条分发
//!
//! 单条记录的处理器失败不会中断本批次；批次结束后若有失败，整个周期以 HandlerBatch 失败，
//! 由任务循环走回退延迟。失败的记录不会被重新拉取（水位线已越过它们）。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::core::{AgentError, HandlerFailure, JobWork, WatermarkTracker, WorkReport};
use crate::datasource::{DataSource, TableSpec};
use crate::dispatch::RecordDispatcher;

pub struct MonitoringWork {
    source: Arc<dyn DataSource>,
    table: TableSpec,
    tracker: WatermarkTracker,
    dispatcher: Arc<RecordDispatcher>,
}

impl MonitoringWork {
    pub fn new(
        source: Arc<dyn DataSource>,
        table: TableSpec,
        tracker: WatermarkTracker,
        dispatcher: Arc<RecordDispatcher>,
    ) -> Self {
        Self {
            source,
            table,
            tracker,
            dispatcher,
        }
    }
}

#[async_trait]
impl JobWork for MonitoringWork {
    async fn run(&mut self) -> Result<WorkReport, AgentError> {
        let since = self.tracker.begin_cycle(Utc::now());
        let records = self.source.query(&self.table, since).await?;
        tracing::debug!(table = %self.table.name, %since, rows = records.len(), "polled new rows");

        let total = records.len();
        let mut dispatched: u64 = 0;
        let mut failures = Vec::new();
        for record in &records {
            match self.dispatcher.dispatch(record).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(AgentError::Handler { discriminant, message }) => {
                    let id = record.id();
                    tracing::warn!(
                        table = %self.table.name,
                        %discriminant,
                        id = ?id,
                        "handler failed: {}",
                        message
                    );
                    failures.push(HandlerFailure { discriminant, message });
                }
                Err(other) => return Err(other),
            }
        }

        if failures.is_empty() {
            Ok(WorkReport::items(dispatched))
        } else {
            Err(AgentError::HandlerBatch { failures, total })
        }
    }
}
