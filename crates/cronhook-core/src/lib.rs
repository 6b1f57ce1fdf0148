//! # Cronhook Core
//!
//! Shared foundation for the Cronhook scheduler: the unified error type,
//! environment-driven configuration, the job/log domain model, and the
//! schedule-expression parser.

pub mod config;
pub mod error;
pub mod model;
pub mod schedule;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use model::{CronJob, ExecutionLog, ExecutionMode, ExecutionStatus, HttpMethod, ScheduleType};
pub use schedule::Schedule;
