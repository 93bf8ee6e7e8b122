//! 维护工作：按保留期规则删除过期行，然后可选地执行 ANALYZE
//!
//! 每条规则生成 `DELETE FROM "t" WHERE julianday("c") < julianday(?1)`，截止时间为 now - days。
//! 报告的条目数只统计删除的行；ANALYZE 不返回有意义的行数。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use crate::config::RetentionRule;
use crate::core::{AgentError, JobWork, WorkReport};
use crate::datasource::{format_timestamp, quote_ident, DataSource, Statement};

pub struct MaintenanceWork {
    source: Arc<dyn DataSource>,
    rules: Vec<RetentionRule>,
    analyze: bool,
}

impl MaintenanceWork {
    /// 表名与列名在构造时校验
    pub fn new(source: Arc<dyn DataSource>, rules: Vec<RetentionRule>, analyze: bool) -> Result<Self, AgentError> {
        for rule in &rules {
            quote_ident(&rule.table)?;
            quote_ident(&rule.column)?;
        }
        Ok(Self { source, rules, analyze })
    }

    fn purge_statement(rule: &RetentionRule, now: chrono::DateTime<Utc>) -> Result<Statement, AgentError> {
        let cutoff = now - ChronoDuration::days(i64::from(rule.days));
        Ok(Statement::new(format!(
            "DELETE FROM {} WHERE julianday({}) < julianday(?1)",
            quote_ident(&rule.table)?,
            quote_ident(&rule.column)?
        ))
        .bind(format_timestamp(cutoff)))
    }
}

#[async_trait]
impl JobWork for MaintenanceWork {
    async fn run(&mut self) -> Result<WorkReport, AgentError> {
        let now = Utc::now();
        let mut purged: u64 = 0;
        for rule in &self.rules {
            let statement = Self::purge_statement(rule, now)?;
            let affected = self.source.execute(&statement).await?;
            tracing::info!(table = %rule.table, days = rule.days, affected, "retention purge");
            purged += affected;
        }

        if self.analyze {
            self.source.execute(&Statement::new("ANALYZE")).await?;
            tracing::debug!("statistics refreshed");
        }

        Ok(WorkReport::items(purged))
    }
}
