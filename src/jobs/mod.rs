//! 两类周期工作：监控（按水位线取新行并分发）与维护（保留期清理 + 统计刷新）

pub mod maintenance;
pub mod monitoring;

pub use maintenance::MaintenanceWork;
pub use monitoring::MonitoringWork;
