//! Row-mapping helpers shared by the repositories.
//!
//! The Any driver only moves scalar kinds across the wire, so the
//! gateway persists timestamps as epoch milliseconds and booleans as
//! 0/1 integers, converting here in both directions.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use cronhook_core::error::Error;
use cronhook_core::model::{
    CronJob, ExecutionLog, ExecutionMode, ExecutionStatus, HttpMethod, ScheduleType,
};

pub fn store_err(err: sqlx::Error) -> Error {
    Error::store_with_source(err.to_string(), err)
}

pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
}

pub fn parse_uuid(column: &str, value: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value)
        .map_err(|_| Error::store(format!("malformed uuid in column {column}: {value}")))
}

pub fn job_from_row(row: &AnyRow) -> Result<CronJob, Error> {
    let id: String = row.try_get("id").map_err(store_err)?;
    let method: String = row.try_get("method").map_err(store_err)?;
    let schedule_type: String = row.try_get("schedule_type").map_err(store_err)?;
    let execution_mode: String = row.try_get("execution_mode").map_err(store_err)?;
    let is_active: i64 = row.try_get("is_active").map_err(store_err)?;
    let request_timeout: Option<i64> = row.try_get("request_timeout").map_err(store_err)?;
    let max_concurrent: i64 = row.try_get("max_concurrent").map_err(store_err)?;
    let current_running: i64 = row.try_get("current_running").map_err(store_err)?;
    let execution_count: i64 = row.try_get("execution_count").map_err(store_err)?;
    let last_executed_at: Option<i64> = row.try_get("last_executed_at").map_err(store_err)?;
    let created_at: i64 = row.try_get("created_at").map_err(store_err)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(store_err)?;

    Ok(CronJob {
        id: parse_uuid("id", &id)?,
        name: row.try_get("name").map_err(store_err)?,
        url: row.try_get("url").map_err(store_err)?,
        method: HttpMethod::parse(&method)?,
        headers: row.try_get("headers").map_err(store_err)?,
        body: row.try_get("body").map_err(store_err)?,
        schedule: row.try_get("schedule").map_err(store_err)?,
        schedule_type: ScheduleType::parse(&schedule_type)?,
        is_active: is_active != 0,
        request_timeout: request_timeout.map(|t| t as u64),
        execution_mode: ExecutionMode::parse(&execution_mode)?,
        max_concurrent: max_concurrent as u32,
        current_running: current_running.max(0) as u32,
        execution_count: execution_count.max(0) as u64,
        last_executed_at: last_executed_at.map(from_millis),
        created_at: from_millis(created_at),
        updated_at: from_millis(updated_at),
    })
}

pub fn log_from_row(row: &AnyRow) -> Result<ExecutionLog, Error> {
    let id: String = row.try_get("id").map_err(store_err)?;
    let job_id: String = row.try_get("job_id").map_err(store_err)?;
    let executed_at: i64 = row.try_get("executed_at").map_err(store_err)?;
    let status: String = row.try_get("status").map_err(store_err)?;
    let response_code: Option<i64> = row.try_get("response_code").map_err(store_err)?;
    let execution_time: i64 = row.try_get("execution_time").map_err(store_err)?;
    let triggered_manually: i64 = row.try_get("triggered_manually").map_err(store_err)?;

    Ok(ExecutionLog {
        id: parse_uuid("id", &id)?,
        job_id: parse_uuid("job_id", &job_id)?,
        executed_at: from_millis(executed_at),
        status: ExecutionStatus::parse(&status)?,
        response_code: response_code.map(|c| c as u16),
        execution_time: execution_time.max(0) as u64,
        response_body: row.try_get("response_body").map_err(store_err)?,
        error_message: row.try_get("error_message").map_err(store_err)?,
        triggered_manually: triggered_manually != 0,
    })
}

/// Escape `%`, `_` and the escape character itself for LIKE patterns.
/// `!` is the escape character because a literal backslash means
/// different things to the SQLite and MySQL string parsers.
pub fn escape_like(s: &str) -> String {
    s.replace('!', "!!").replace('%', "!%").replace('_', "!_")
}
