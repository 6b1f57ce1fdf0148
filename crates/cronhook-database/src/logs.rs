//! Execution-log repository: append-only writes, filtered reads,
//! retention deletes, and aggregate statistics.

use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use cronhook_core::config::DatabaseKind;
use cronhook_core::error::Result;
use cronhook_core::model::{ExecutionLog, ExecutionStatus};

use crate::pool::DatabasePool;
use crate::row::{escape_like, log_from_row, parse_uuid, store_err, to_millis};

/// Filter over execution logs. Every field is optional; absent fields
/// match everything.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub job_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub triggered_manually: Option<bool>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Case-insensitive contains over the owning job's name
    pub job_name_contains: Option<String>,
    /// Case-insensitive contains over the response body
    pub response_contains: Option<String>,
}

impl LogFilter {
    fn needs_join(&self) -> bool {
        self.job_name_contains.is_some()
    }

    /// WHERE conditions plus their bind arguments, in order
    fn conditions(&self) -> (Vec<String>, Vec<Arg>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(job_id) = self.job_id {
            clauses.push("l.job_id = ?".to_string());
            args.push(Arg::Text(job_id.to_string()));
        }
        if let Some(status) = self.status {
            clauses.push("l.status = ?".to_string());
            args.push(Arg::Text(status.as_str().to_string()));
        }
        if let Some(manual) = self.triggered_manually {
            clauses.push("l.triggered_manually = ?".to_string());
            args.push(Arg::Int(manual as i64));
        }
        if let Some(start) = self.start {
            clauses.push("l.executed_at >= ?".to_string());
            args.push(Arg::Int(to_millis(start)));
        }
        if let Some(end) = self.end {
            clauses.push("l.executed_at <= ?".to_string());
            args.push(Arg::Int(to_millis(end)));
        }
        if let Some(name) = &self.job_name_contains {
            clauses.push("LOWER(j.name) LIKE ? ESCAPE '!'".to_string());
            args.push(Arg::Text(contains_pattern(name)));
        }
        if let Some(content) = &self.response_contains {
            clauses.push("LOWER(l.response_body) LIKE ? ESCAPE '!'".to_string());
            args.push(Arg::Text(contains_pattern(content)));
        }

        (clauses, args)
    }
}

fn contains_pattern(needle: &str) -> String {
    format!("%{}%", escape_like(&needle.to_lowercase()))
}

enum Arg {
    Int(i64),
    Text(String),
}

fn clone_args(args: &[Arg]) -> Vec<Arg> {
    args.iter()
        .map(|arg| match arg {
            Arg::Int(v) => Arg::Int(*v),
            Arg::Text(v) => Arg::Text(v.clone()),
        })
        .collect()
}

fn bind_args<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    args: Vec<Arg>,
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    for arg in args {
        query = match arg {
            Arg::Int(v) => query.bind(v),
            Arg::Text(v) => query.bind(v),
        };
    }
    query
}

/// One page of logs plus the unpaginated total
#[derive(Debug, Clone)]
pub struct LogPage {
    pub logs: Vec<ExecutionLog>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Aggregates over a set of execution logs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsBucket {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Percentage, rounded to two decimals
    pub success_rate: f64,
    pub min_time_ms: u64,
    pub avg_time_ms: u64,
    pub max_time_ms: u64,
}

impl StatsBucket {
    fn from_aggregates(total: i64, success: i64, min: Option<i64>, max: Option<i64>, sum: Option<i64>) -> Self {
        let total = total.max(0) as u64;
        let success = success.max(0) as u64;
        let success_rate = if total == 0 {
            0.0
        } else {
            (success as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        Self {
            total,
            success,
            failed: total - success.min(total),
            success_rate,
            min_time_ms: min.unwrap_or(0).max(0) as u64,
            avg_time_ms: if total == 0 {
                0
            } else {
                (sum.unwrap_or(0).max(0) as u64) / total
            },
            max_time_ms: max.unwrap_or(0).max(0) as u64,
        }
    }
}

/// Per-job aggregate row
#[derive(Debug, Clone)]
pub struct JobStats {
    pub job_id: Uuid,
    pub job_name: String,
    pub bucket: StatsBucket,
}

/// Overall plus per-job statistics
#[derive(Debug, Clone)]
pub struct LogStats {
    pub overall: StatsBucket,
    pub per_job: Vec<JobStats>,
}

#[derive(Clone)]
pub struct LogRepository {
    pool: DatabasePool,
}

impl LogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Append one execution record
    pub async fn insert(&self, log: &ExecutionLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_logs (
                id, job_id, executed_at, status, response_code,
                execution_time, response_body, error_message, triggered_manually
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.job_id.to_string())
        .bind(to_millis(log.executed_at))
        .bind(log.status.as_str())
        .bind(log.response_code.map(|c| c as i64))
        .bind(log.execution_time as i64)
        .bind(log.response_body.clone())
        .bind(log.error_message.clone())
        .bind(log.triggered_manually as i64)
        .execute(self.pool.inner())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    /// Filtered page, newest first
    pub async fn list(&self, filter: &LogFilter, page: u32, limit: u32) -> Result<LogPage> {
        let total = self.count(filter).await?;

        let (clauses, args) = filter.conditions();
        let mut sql = String::from("SELECT l.* FROM execution_logs l");
        if filter.needs_join() {
            sql.push_str(" INNER JOIN cronjobs j ON j.id = l.job_id");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY l.executed_at DESC LIMIT ? OFFSET ?");

        let page = page.max(1);
        let offset = (page as i64 - 1) * limit as i64;

        let query = bind_args(sqlx::query(&sql), args).bind(limit as i64).bind(offset);
        let rows = query.fetch_all(self.pool.inner()).await.map_err(store_err)?;

        Ok(LogPage {
            logs: rows.iter().map(log_from_row).collect::<Result<_>>()?,
            total,
            page,
            limit,
        })
    }

    /// Number of logs matching the filter
    pub async fn count(&self, filter: &LogFilter) -> Result<u64> {
        let (clauses, args) = filter.conditions();
        let mut sql = String::from("SELECT COUNT(*) AS n FROM execution_logs l");
        if filter.needs_join() {
            sql.push_str(" INNER JOIN cronjobs j ON j.id = l.job_id");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let row = bind_args(sqlx::query(&sql), args)
            .fetch_one(self.pool.inner())
            .await
            .map_err(store_err)?;
        let n: i64 = row.try_get("n").map_err(store_err)?;
        Ok(n.max(0) as u64)
    }

    /// Delete every log whose `executed_at` is before the cutoff.
    /// Returns the number of rows removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM execution_logs WHERE executed_at < ?")
            .bind(to_millis(cutoff))
            .execute(self.pool.inner())
            .await
            .map_err(store_err)?;

        Ok(result.rows_affected())
    }

    /// Overall and per-job aggregates within the optional date range
    pub async fn stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<LogStats> {
        // MySQL SUM() yields DECIMAL, which the Any driver cannot decode;
        // both dialects accept an integer cast spelled their own way.
        let cast = match self.pool.kind() {
            DatabaseKind::Sqlite => "INTEGER",
            DatabaseKind::Mysql => "SIGNED",
        };

        let mut range_clauses = Vec::new();
        let mut range_args = Vec::new();
        if let Some(start) = start {
            range_clauses.push("l.executed_at >= ?");
            range_args.push(Arg::Int(to_millis(start)));
        }
        if let Some(end) = end {
            range_clauses.push("l.executed_at <= ?");
            range_args.push(Arg::Int(to_millis(end)));
        }
        let where_sql = if range_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", range_clauses.join(" AND "))
        };

        let aggregates = format!(
            "CAST(COUNT(*) AS {cast}) AS total, \
             CAST(SUM(CASE WHEN l.status = 'success' THEN 1 ELSE 0 END) AS {cast}) AS ok, \
             MIN(l.execution_time) AS min_ms, \
             MAX(l.execution_time) AS max_ms, \
             CAST(SUM(l.execution_time) AS {cast}) AS sum_ms"
        );

        let overall_sql = format!("SELECT {aggregates} FROM execution_logs l{where_sql}");
        let overall_row = bind_args(sqlx::query(&overall_sql), clone_args(&range_args))
            .fetch_one(self.pool.inner())
            .await
            .map_err(store_err)?;
        let overall = Self::bucket_from_row(&overall_row)?;

        let per_job_sql = format!(
            "SELECT l.job_id AS job_id, j.name AS job_name, {aggregates} \
             FROM execution_logs l INNER JOIN cronjobs j ON j.id = l.job_id{where_sql} \
             GROUP BY l.job_id, j.name ORDER BY j.name"
        );
        let rows = bind_args(sqlx::query(&per_job_sql), range_args)
            .fetch_all(self.pool.inner())
            .await
            .map_err(store_err)?;

        let per_job = rows
            .iter()
            .map(|row| {
                let job_id: String = row.try_get("job_id").map_err(store_err)?;
                Ok(JobStats {
                    job_id: parse_uuid("job_id", &job_id)?,
                    job_name: row.try_get("job_name").map_err(store_err)?,
                    bucket: Self::bucket_from_row(row)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LogStats { overall, per_job })
    }

    fn bucket_from_row(row: &AnyRow) -> Result<StatsBucket> {
        let total: i64 = row.try_get("total").map_err(store_err)?;
        let ok: Option<i64> = row.try_get("ok").map_err(store_err)?;
        let min_ms: Option<i64> = row.try_get("min_ms").map_err(store_err)?;
        let max_ms: Option<i64> = row.try_get("max_ms").map_err(store_err)?;
        let sum_ms: Option<i64> = row.try_get("sum_ms").map_err(store_err)?;
        Ok(StatsBucket::from_aggregates(
            total,
            ok.unwrap_or(0),
            min_ms,
            max_ms,
            sum_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_math() {
        let bucket = StatsBucket::from_aggregates(3, 2, Some(10), Some(90), Some(150));
        assert_eq!(bucket.total, 3);
        assert_eq!(bucket.success, 2);
        assert_eq!(bucket.failed, 1);
        assert_eq!(bucket.success_rate, 66.67);
        assert_eq!(bucket.min_time_ms, 10);
        assert_eq!(bucket.avg_time_ms, 50);
        assert_eq!(bucket.max_time_ms, 90);
    }

    #[test]
    fn test_bucket_empty() {
        let bucket = StatsBucket::from_aggregates(0, 0, None, None, None);
        assert_eq!(bucket.success_rate, 0.0);
        assert_eq!(bucket.avg_time_ms, 0);
    }

    #[test]
    fn test_contains_pattern_folds_case() {
        assert_eq!(contains_pattern("Ping"), "%ping%");
        assert_eq!(contains_pattern("50%"), "%50!%%");
    }
}
