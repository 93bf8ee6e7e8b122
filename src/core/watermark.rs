//! 水位线：轮询任务的「上次检查」时间点
//!
//! 首次窗口为 now - interval，此后为上一次 advance 记录的 now；检查点只前进不后退。
//! 检查点在查询之前推进，因此记录可能重复、不会在进程存活期间丢失。

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// 单个监控任务独占的水位线
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    lookback: ChronoDuration,
    last_checked: Option<DateTime<Utc>>,
}

impl WatermarkTracker {
    /// lookback 通常等于任务的轮询间隔
    pub fn new(lookback: std::time::Duration) -> Self {
        Self {
            lookback: ChronoDuration::from_std(lookback).unwrap_or(ChronoDuration::MAX),
            last_checked: None,
        }
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    /// 下一次轮询的下界（以当前时钟计算首次窗口）
    pub fn window(&self) -> DateTime<Utc> {
        self.window_at(Utc::now())
    }

    pub fn window_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_checked {
            Some(last) => last,
            None => now
                .checked_sub_signed(self.lookback)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// 记录新的检查点；时钟回拨时保持原值
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_checked = Some(match self.last_checked {
            Some(last) if last > now => last,
            _ => now,
        });
    }

    /// 一次监控周期的开始：取窗口下界并立即推进到 now
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let since = self.window_at(now);
        self.advance(now);
        since
    }
}
