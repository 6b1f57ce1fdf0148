//! # Cronhook API
//!
//! The REST surface consumed by the web front-end: job CRUD and
//! lifecycle, execution-log queries and statistics, the rate-limited
//! manual trigger, and data export/import.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use chrono_tz::Tz;

use cronhook_database::{JobRepository, LogRepository};
use cronhook_scheduler::{RetentionSweeper, SchedulerEngine};

pub mod dto;
pub mod error;
pub mod handlers;
pub mod rate_limit;
mod service;

pub use error::{ApiError, HttpError, HttpResult};
pub use rate_limit::TriggerRateLimiter;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiContext {
    pub jobs: JobRepository,
    pub logs: LogRepository,
    pub engine: SchedulerEngine,
    pub sweeper: RetentionSweeper,
    pub limiter: Arc<TriggerRateLimiter>,
    pub timezone: Tz,
}

/// Build the `/api` router
pub fn router(ctx: ApiContext) -> Router {
    Router::new()
        .route(
            "/api/jobs",
            get(handlers::jobs::list_jobs).post(handlers::jobs::create_job),
        )
        .route(
            "/api/jobs/:id",
            get(handlers::jobs::get_job)
                .put(handlers::jobs::update_job)
                .delete(handlers::jobs::delete_job),
        )
        .route("/api/jobs/:id/toggle", put(handlers::jobs::toggle_job))
        .route("/api/jobs/:id/trigger", post(handlers::jobs::trigger_job))
        .route("/api/jobs/:id/logs", get(handlers::jobs::job_logs))
        .route("/api/logs/search", get(handlers::logs::search_logs))
        .route("/api/logs/stats", get(handlers::logs::log_stats))
        .route("/api/logs/cleanup", post(handlers::logs::cleanup_logs))
        .route("/api/data/export", get(handlers::data::export_data))
        .route("/api/data/import", post(handlers::data::import_data))
        .route("/api/data/import/file", post(handlers::data::import_file))
        .route("/api/data/validate", post(handlers::data::validate_data))
        .with_state(ctx)
}
