//! # Cronhook Database
//!
//! Store gateway over SQLx. This crate is the single place where
//! SQL-dialect differences between SQLite and MySQL are handled; the
//! rest of the system sees pure domain types.

pub mod jobs;
pub mod logs;
pub mod migration;
pub mod pool;

mod row;

pub use jobs::JobRepository;
pub use logs::{JobStats, LogFilter, LogPage, LogRepository, LogStats, StatsBucket};
pub use migration::Migrator;
pub use pool::DatabasePool;
