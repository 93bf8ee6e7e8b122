//! 核心层：错误与恢复、水位线、状态投影、周期任务、运行器与关闭协调

pub mod error;
pub mod periodic_job;
pub mod recovery;
pub mod runner;
pub mod shutdown;
pub mod state;
pub mod watermark;

pub use error::{AgentError, HandlerFailure, RecoveryAction};
pub use periodic_job::{FnWork, JobExit, JobWork, PeriodicJob, WorkReport};
pub use recovery::{BackoffStrategy, RetryPolicy};
pub use runner::{AgentRunner, RunnerPhase};
pub use shutdown::{RunnerCleanup, ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason};
pub use state::{JobSnapshot, JobState};
pub use watermark::WatermarkTracker;
