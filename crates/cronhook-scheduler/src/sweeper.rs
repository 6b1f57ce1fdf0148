//! Retention sweeper: periodically deletes execution logs older than
//! the configured horizon.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use cronhook_core::config::RetentionConfig;
use cronhook_core::error::Result;
use cronhook_database::LogRepository;

/// Daily at midnight, seconds precision, evaluated in the configured zone
const SWEEP_SCHEDULE: &str = "0 0 0 * * *";

struct SweeperInner {
    logs: LogRepository,
    config: RetentionConfig,
    timezone: Tz,
    schedule: cron::Schedule,
    handle: Mutex<Option<AbortHandle>>,
}

/// Cheap-to-clone handle; all clones drive the same sweep loop.
#[derive(Clone)]
pub struct RetentionSweeper {
    inner: Arc<SweeperInner>,
}

impl RetentionSweeper {
    pub fn new(logs: LogRepository, config: RetentionConfig, timezone: Tz) -> Self {
        let schedule = cron::Schedule::from_str(SWEEP_SCHEDULE).expect("static sweep schedule");
        Self {
            inner: Arc::new(SweeperInner {
                logs,
                config,
                timezone,
                schedule,
                handle: Mutex::new(None),
            }),
        }
    }

    /// Start the periodic loop. Runs an initial sweep immediately when
    /// cleanup is enabled.
    pub fn start(&self) {
        if !self.inner.config.enabled {
            info!("Log cleanup disabled, sweeper not started");
            return;
        }

        let sweeper = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = sweeper.sweep_now(None).await {
                error!(error = %err, "Initial retention sweep failed");
            }

            loop {
                let next = sweeper
                    .inner
                    .schedule
                    .after(&Utc::now().with_timezone(&sweeper.inner.timezone))
                    .next();
                let Some(next) = next else {
                    warn!("Sweep schedule yielded no next instant, stopping");
                    break;
                };

                let wait = (next.with_timezone(&Utc) - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                if let Err(err) = sweeper.sweep_now(None).await {
                    error!(error = %err, "Retention sweep failed");
                }
            }
        })
        .abort_handle();

        *self.inner.handle.lock() = Some(handle);
        info!(
            retention_days = self.inner.config.days,
            "Retention sweeper started"
        );
    }

    pub fn stop(&self) {
        if let Some(handle) = self.inner.handle.lock().take() {
            handle.abort();
            info!("Retention sweeper stopped");
        }
    }

    /// Delete logs older than the horizon. `days_override` lets the
    /// operator sweep with a different horizon than the configured one.
    pub async fn sweep_now(&self, days_override: Option<u32>) -> Result<u64> {
        let days = days_override.unwrap_or(self.inner.config.days).max(1);
        let cutoff = Utc::now() - ChronoDuration::days(days as i64);

        info!(retention_days = days, cutoff = %cutoff, "Retention sweep starting");
        let started = std::time::Instant::now();

        let deleted = self.inner.logs.delete_older_than(cutoff).await?;

        info!(
            deleted,
            duration_ms = started.elapsed().as_millis() as u64,
            "Retention sweep complete"
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cronhook_core::model::{CronJob, ExecutionMode, HttpMethod, ScheduleType};
    use cronhook_core::model::{ExecutionLog, ExecutionStatus};
    use cronhook_database::{DatabasePool, JobRepository, LogFilter, Migrator};
    use uuid::Uuid;

    async fn seeded_logs(old: usize, fresh: usize) -> LogRepository {
        let pool = DatabasePool::connect_in_memory().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        let jobs = JobRepository::new(pool.clone());
        let logs = LogRepository::new(pool);

        let job = CronJob {
            id: Uuid::new_v4(),
            name: "sweep-target".into(),
            url: "https://api.example.com/x".into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            schedule: "1h".into(),
            schedule_type: ScheduleType::Repeat,
            is_active: true,
            request_timeout: None,
            execution_mode: ExecutionMode::Sequential,
            max_concurrent: 1,
            current_running: 0,
            execution_count: 0,
            last_executed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        jobs.create(&job).await.unwrap();

        let ages: Vec<i64> = std::iter::repeat(4i64)
            .take(old)
            .chain(std::iter::repeat(1i64).take(fresh))
            .collect();
        for age_days in ages {
            let log = ExecutionLog {
                id: Uuid::new_v4(),
                job_id: job.id,
                executed_at: Utc::now() - ChronoDuration::days(age_days),
                status: ExecutionStatus::Success,
                response_code: Some(200),
                execution_time: 10,
                response_body: None,
                error_message: None,
                triggered_manually: false,
            };
            logs.insert(&log).await.unwrap();
        }
        logs
    }

    #[tokio::test]
    async fn sweep_deletes_only_past_horizon() {
        let logs = seeded_logs(100, 10).await;
        let sweeper = RetentionSweeper::new(logs.clone(), RetentionConfig::default(), Tz::UTC);

        let deleted = sweeper.sweep_now(None).await.unwrap();
        assert_eq!(deleted, 100);

        let remaining = logs.count(&LogFilter::default()).await.unwrap();
        assert_eq!(remaining, 10);
    }

    #[tokio::test]
    async fn sweep_override_widens_horizon() {
        let logs = seeded_logs(100, 10).await;
        let sweeper = RetentionSweeper::new(logs, RetentionConfig::default(), Tz::UTC);

        // A 10-day horizon keeps everything
        let deleted = sweeper.sweep_now(Some(10)).await.unwrap();
        assert_eq!(deleted, 0);
    }
}
