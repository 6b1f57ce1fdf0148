//! Domain model: scheduled jobs and their execution logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::schedule;

/// Default per-request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Permitted request timeout range in milliseconds
pub const REQUEST_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 1_000..=300_000;
/// Permitted `max_concurrent` range
pub const MAX_CONCURRENT_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// HTTP method a job may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(Error::invalid_input(
                "method",
                format!("unsupported HTTP method: {other}"),
            )),
        }
    }
}

/// Which schedule dialect a job uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Cron,
    Repeat,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Cron => "cron",
            ScheduleType::Repeat => "repeat",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cron" => Ok(ScheduleType::Cron),
            "repeat" => Ok(ScheduleType::Repeat),
            other => Err(Error::invalid_input(
                "scheduleType",
                format!("unsupported schedule type: {other}"),
            )),
        }
    }
}

/// Whether fires of the same job may overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            other => Err(Error::invalid_input(
                "executionMode",
                format!("unsupported execution mode: {other}"),
            )),
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

/// A persisted recipe for one HTTP request plus a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    /// Optional JSON object literal stored as text; invalid JSON is
    /// treated as an empty map at execution time
    pub headers: Option<String>,
    /// Optional request body; sent as JSON when parsable, text otherwise
    pub body: Option<String>,
    pub schedule: String,
    pub schedule_type: ScheduleType,
    pub is_active: bool,
    /// Per-request timeout in milliseconds; None means the default
    pub request_timeout: Option<u64>,
    pub execution_mode: ExecutionMode,
    pub max_concurrent: u32,
    /// Engine-maintained; never user-writable
    pub current_running: u32,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CronJob {
    /// The timeout the invoker actually applies
    pub fn effective_timeout_ms(&self) -> u64 {
        self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
    }

    /// The concurrency bound the dispatcher actually enforces.
    /// Sequential jobs are strictly single-flight regardless of
    /// `max_concurrent`.
    pub fn effective_max_concurrent(&self) -> u32 {
        match self.execution_mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => self.max_concurrent,
        }
    }

    /// Validate the user-writable invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_input("name", "must not be empty"));
        }
        validate_url(&self.url)?;
        schedule::Schedule::parse(&self.schedule, self.schedule_type)?;
        if let Some(timeout) = self.request_timeout {
            if !REQUEST_TIMEOUT_RANGE_MS.contains(&timeout) {
                return Err(Error::invalid_input(
                    "requestTimeout",
                    format!(
                        "must be between {} and {} ms",
                        REQUEST_TIMEOUT_RANGE_MS.start(),
                        REQUEST_TIMEOUT_RANGE_MS.end()
                    ),
                ));
            }
        }
        if !MAX_CONCURRENT_RANGE.contains(&self.max_concurrent) {
            return Err(Error::invalid_input(
                "maxConcurrent",
                format!(
                    "must be between {} and {}",
                    MAX_CONCURRENT_RANGE.start(),
                    MAX_CONCURRENT_RANGE.end()
                ),
            ));
        }
        if let Some(headers) = &self.headers {
            if !headers.trim().is_empty() {
                match serde_json::from_str::<serde_json::Value>(headers) {
                    Ok(serde_json::Value::Object(_)) => {}
                    // Non-fatal by contract, but rejected at the API boundary
                    _ => {
                        return Err(Error::invalid_headers(
                            "headers must be a JSON object literal",
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

/// Validate an absolute HTTP/HTTPS URL. The hostname may be a DNS name,
/// an IP literal, or a container service name (alphanumerics, dots,
/// hyphens, underscores).
pub fn validate_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::invalid_input("url", "must not be empty"));
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| Error::invalid_input("url", "must start with http:// or https://"))?;

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority
        .rsplit_once(':')
        .map(|(h, port)| {
            // A trailing :port must be numeric; bracketed IPv6 keeps its colons
            if h.starts_with('[') || port.chars().all(|c| c.is_ascii_digit()) {
                h
            } else {
                authority
            }
        })
        .unwrap_or(authority);
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.is_empty() {
        return Err(Error::invalid_input("url", "missing hostname"));
    }
    let valid = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'));
    if !valid {
        return Err(Error::invalid_input(
            "url",
            format!("invalid hostname: {host}"),
        ));
    }
    Ok(())
}

/// Terminal outcome of one attempt sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(Error::invalid_input(
                "status",
                format!("unsupported execution status: {other}"),
            )),
        }
    }
}

/// One record per attempt sequence, insert-only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub id: Uuid,
    pub job_id: Uuid,
    /// When the attempt sequence started
    pub executed_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub response_code: Option<u16>,
    /// Milliseconds from start to terminal outcome, backoffs included
    pub execution_time: u64,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub triggered_manually: bool,
}

/// A label attached to jobs; carried through export/import but never
/// consulted by the scheduling engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Best-effort runtime field patch applied by the execution finalizer
#[derive(Debug, Clone, Copy, Default)]
pub struct JobRuntimeUpdate {
    pub current_running: Option<u32>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: Option<u64>,
}

impl JobRuntimeUpdate {
    pub fn is_empty(&self) -> bool {
        self.current_running.is_none()
            && self.last_executed_at.is_none()
            && self.execution_count.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> CronJob {
        CronJob {
            id: Uuid::new_v4(),
            name: "ping".into(),
            url: "https://api.example.com/ping".into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            schedule: "5s".into(),
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
        }
    }

    #[test]
    fn test_valid_job() {
        assert!(job().validate().is_ok());
    }

    #[test]
    fn test_effective_timeout_default() {
        assert_eq!(job().effective_timeout_ms(), 30_000);
        let mut j = job();
        j.request_timeout = Some(5_000);
        assert_eq!(j.effective_timeout_ms(), 5_000);
    }

    #[test]
    fn test_sequential_caps_concurrency() {
        let mut j = job();
        j.max_concurrent = 10;
        assert_eq!(j.effective_max_concurrent(), 1);
        j.execution_mode = ExecutionMode::Parallel;
        assert_eq!(j.effective_max_concurrent(), 10);
    }

    #[test]
    fn test_timeout_range() {
        let mut j = job();
        j.request_timeout = Some(500);
        assert!(j.validate().is_err());
        j.request_timeout = Some(300_001);
        assert!(j.validate().is_err());
        j.request_timeout = Some(1_000);
        assert!(j.validate().is_ok());
    }

    #[test]
    fn test_headers_must_be_object() {
        let mut j = job();
        j.headers = Some(r#"{"X-Token": "abc"}"#.into());
        assert!(j.validate().is_ok());
        j.headers = Some(r#"["not", "an", "object"]"#.into());
        assert!(j.validate().is_err());
    }

    #[test]
    fn test_url_hosts() {
        assert!(validate_url("http://my_service:8080/hook").is_ok());
        assert!(validate_url("https://10.0.0.7/ping").is_ok());
        assert!(validate_url("http://[::1]:9000/x").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("http:///nohost").is_err());
    }

    #[test]
    fn test_enum_round_trips() {
        assert_eq!(HttpMethod::parse("post").unwrap(), HttpMethod::Post);
        assert_eq!(ScheduleType::parse("CRON").unwrap(), ScheduleType::Cron);
        assert_eq!(
            ExecutionMode::parse("parallel").unwrap(),
            ExecutionMode::Parallel
        );
        assert_eq!(
            ExecutionStatus::parse("failed").unwrap(),
            ExecutionStatus::Failed
        );
        assert!(HttpMethod::parse("PATCH").is_err());
    }
}
