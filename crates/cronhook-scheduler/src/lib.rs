//! # Cronhook Scheduler
//!
//! The scheduling engine and execution pipeline: the in-memory job
//! registry with per-job timers and gating, the retrying HTTP invoker,
//! the durable execution-log recorder, and the retention sweeper.

pub mod engine;
pub mod invoker;
pub mod recorder;
pub mod sweeper;

pub use engine::{JobRunState, JobStatusInfo, SchedulerEngine};
pub use invoker::{ExecutionOutcome, HttpInvoker, InvokerConfig};
pub use recorder::ExecutionRecorder;
pub use sweeper::RetentionSweeper;
