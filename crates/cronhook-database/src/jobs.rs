//! Job repository: typed persistence operations over `cronjobs`.

use chrono::Utc;
use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

use cronhook_core::error::{Error, Result};
use cronhook_core::model::{CronJob, JobRuntimeUpdate, Tag};

use crate::pool::DatabasePool;
use crate::row::{from_millis, job_from_row, parse_uuid, store_err, to_millis};

#[derive(Clone)]
pub struct JobRepository {
    pool: DatabasePool,
}

impl JobRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert a new job
    pub async fn create(&self, job: &CronJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cronjobs (
                id, name, url, method, headers, body, schedule, schedule_type,
                is_active, request_timeout, execution_mode, max_concurrent,
                current_running, execution_count, last_executed_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.name.clone())
        .bind(job.url.clone())
        .bind(job.method.as_str())
        .bind(job.headers.clone())
        .bind(job.body.clone())
        .bind(job.schedule.clone())
        .bind(job.schedule_type.as_str())
        .bind(job.is_active as i64)
        .bind(job.request_timeout.map(|t| t as i64))
        .bind(job.execution_mode.as_str())
        .bind(job.max_concurrent as i64)
        .bind(job.current_running as i64)
        .bind(job.execution_count as i64)
        .bind(job.last_executed_at.map(to_millis))
        .bind(to_millis(job.created_at))
        .bind(to_millis(job.updated_at))
        .execute(self.pool.inner())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    /// Fetch a job, or None when absent
    pub async fn find(&self, id: Uuid) -> Result<Option<CronJob>> {
        let row = sqlx::query("SELECT * FROM cronjobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool.inner())
            .await
            .map_err(store_err)?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Fetch a job, or NotFound
    pub async fn get(&self, id: Uuid) -> Result<CronJob> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::not_found("CronJob", id))
    }

    /// All jobs, newest first
    pub async fn list(&self) -> Result<Vec<CronJob>> {
        let rows = sqlx::query("SELECT * FROM cronjobs ORDER BY created_at DESC")
            .fetch_all(self.pool.inner())
            .await
            .map_err(store_err)?;

        rows.iter().map(job_from_row).collect()
    }

    /// All jobs with `is_active = true`
    pub async fn list_active(&self) -> Result<Vec<CronJob>> {
        let rows = sqlx::query("SELECT * FROM cronjobs WHERE is_active = 1 ORDER BY created_at")
            .fetch_all(self.pool.inner())
            .await
            .map_err(store_err)?;

        rows.iter().map(job_from_row).collect()
    }

    pub async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM cronjobs")
            .fetch_one(self.pool.inner())
            .await
            .map_err(store_err)?;
        let n: i64 = row.try_get("n").map_err(store_err)?;
        Ok(n.max(0) as u64)
    }

    /// Replace every user-writable field; runtime counters are preserved
    pub async fn update(&self, job: &CronJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cronjobs SET
                name = ?, url = ?, method = ?, headers = ?, body = ?,
                schedule = ?, schedule_type = ?, is_active = ?,
                request_timeout = ?, execution_mode = ?, max_concurrent = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.name.clone())
        .bind(job.url.clone())
        .bind(job.method.as_str())
        .bind(job.headers.clone())
        .bind(job.body.clone())
        .bind(job.schedule.clone())
        .bind(job.schedule_type.as_str())
        .bind(job.is_active as i64)
        .bind(job.request_timeout.map(|t| t as i64))
        .bind(job.execution_mode.as_str())
        .bind(job.max_concurrent as i64)
        .bind(to_millis(Utc::now()))
        .bind(job.id.to_string())
        .execute(self.pool.inner())
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("CronJob", job.id));
        }
        Ok(())
    }

    /// Flip the active flag
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<CronJob> {
        let result = sqlx::query("UPDATE cronjobs SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active as i64)
            .bind(to_millis(Utc::now()))
            .bind(id.to_string())
            .execute(self.pool.inner())
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("CronJob", id));
        }
        self.get(id).await
    }

    /// Best-effort patch of engine-maintained fields. Lost updates under
    /// contention are acceptable; the counters are observational.
    pub async fn update_runtime(&self, id: Uuid, update: JobRuntimeUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let mut sets: Vec<&str> = Vec::new();
        if update.current_running.is_some() {
            sets.push("current_running = ?");
        }
        if update.last_executed_at.is_some() {
            sets.push("last_executed_at = ?");
        }
        if update.execution_count.is_some() {
            sets.push("execution_count = ?");
        }

        let sql = format!("UPDATE cronjobs SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(running) = update.current_running {
            query = query.bind(running as i64);
        }
        if let Some(at) = update.last_executed_at {
            query = query.bind(to_millis(at));
        }
        if let Some(count) = update.execution_count {
            query = query.bind(count as i64);
        }
        query
            .bind(id.to_string())
            .execute(self.pool.inner())
            .await
            .map_err(store_err)?;

        Ok(())
    }

    /// Delete a job and everything hanging off it. The log and tag-link
    /// deletes are explicit so SQLite works without the foreign-key
    /// pragma; MySQL would cascade anyway.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM execution_logs WHERE job_id = ?")
            .bind(id.to_string())
            .execute(self.pool.inner())
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM cronjob_tags WHERE job_id = ?")
            .bind(id.to_string())
            .execute(self.pool.inner())
            .await
            .map_err(store_err)?;

        let result = sqlx::query("DELETE FROM cronjobs WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool.inner())
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("CronJob", id));
        }
        Ok(())
    }

    // ── Tags (carried for export/import; never consulted by the engine) ──

    /// Tag names attached to a job, alphabetical
    pub async fn tag_names(&self, job_id: Uuid) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT t.name AS name FROM tags t
            INNER JOIN cronjob_tags jt ON jt.tag_id = t.id
            WHERE jt.job_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(job_id.to_string())
        .fetch_all(self.pool.inner())
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(store_err))
            .collect()
    }

    /// Attach the named tags to a job, creating missing tags
    pub async fn set_tag_names(&self, job_id: Uuid, names: &[String]) -> Result<()> {
        sqlx::query("DELETE FROM cronjob_tags WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(self.pool.inner())
            .await
            .map_err(store_err)?;

        for name in names {
            let tag_id = match self.find_tag_id(name).await? {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4();
                    sqlx::query("INSERT INTO tags (id, name, color, created_at) VALUES (?, ?, ?, ?)")
                        .bind(id.to_string())
                        .bind(name.clone())
                        .bind(Option::<String>::None)
                        .bind(to_millis(Utc::now()))
                        .execute(self.pool.inner())
                        .await
                        .map_err(store_err)?;
                    id
                }
            };
            if let Err(err) = sqlx::query("INSERT INTO cronjob_tags (job_id, tag_id) VALUES (?, ?)")
                .bind(job_id.to_string())
                .bind(tag_id.to_string())
                .execute(self.pool.inner())
                .await
            {
                warn!(job_id = %job_id, tag = %name, error = %err, "Failed to link tag");
            }
        }
        Ok(())
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT * FROM tags ORDER BY name")
            .fetch_all(self.pool.inner())
            .await
            .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(store_err)?;
                let created_at: i64 = row.try_get("created_at").map_err(store_err)?;
                Ok(Tag {
                    id: parse_uuid("id", &id)?,
                    name: row.try_get("name").map_err(store_err)?,
                    color: row.try_get("color").map_err(store_err)?,
                    created_at: from_millis(created_at),
                })
            })
            .collect()
    }

    async fn find_tag_id(&self, name: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM tags WHERE name = ?")
            .bind(name.to_string())
            .fetch_optional(self.pool.inner())
            .await
            .map_err(store_err)?;

        row.map(|r| {
            let id: String = r.try_get("id").map_err(store_err)?;
            parse_uuid("id", &id)
        })
        .transpose()
    }
}
