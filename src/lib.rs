//! rowwatch - 轮询数据库的周期任务运行器
//!
//! 模块划分：
//! - **agent**: 按配置装配监控与维护任务
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、水位线、周期任务、运行器、优雅关闭
//! - **datasource**: 数据源抽象与 SQLite / Mock 实现
//! - **dispatch**: 记录与按判别值分发的处理器注册表
//! - **handlers**: 内置的事件处理器
//! - **jobs**: 监控与维护两类工作单元
//! - **observability**: 日志初始化

pub mod agent;
pub mod config;
pub mod core;
pub mod datasource;
pub mod dispatch;
pub mod handlers;
pub mod jobs;
pub mod observability;
