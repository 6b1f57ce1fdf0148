//! Wire-format request and response types. Everything speaks camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use cronhook_core::model::{
    CronJob, ExecutionLog, ExecutionMode, ExecutionStatus, HttpMethod, ScheduleType, Tag,
};
use cronhook_database::{JobStats, LogStats, StatsBucket};
use cronhook_scheduler::JobStatusInfo;

/// Body-preview length when logs are listed without `expand`
pub const COLLAPSED_BODY_CHARS: usize = 500;

fn default_true() -> bool {
    true
}

fn default_method() -> HttpMethod {
    HttpMethod::Get
}

fn default_max_concurrent() -> u32 {
    1
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    pub headers: Option<String>,
    pub body: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub schedule: String,
    pub schedule_type: ScheduleType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[validate(range(min = 1000, max = 300000, message = "must be 1000-300000 ms"))]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_max_concurrent")]
    #[validate(range(min = 1, max = 100, message = "must be 1-100"))]
    pub max_concurrent: u32,
    #[serde(default)]
    pub tag_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobRequest {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub schedule: Option<String>,
    pub schedule_type: Option<ScheduleType>,
    pub is_active: Option<bool>,
    #[validate(range(min = 1000, max = 300000, message = "must be 1000-300000 ms"))]
    pub request_timeout: Option<u64>,
    pub execution_mode: Option<ExecutionMode>,
    #[validate(range(min = 1, max = 100, message = "must be 1-100"))]
    pub max_concurrent: Option<u32>,
    pub tag_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub schedule: String,
    pub schedule_type: ScheduleType,
    pub schedule_description: Option<String>,
    pub is_active: bool,
    pub request_timeout: Option<u64>,
    pub execution_mode: ExecutionMode,
    pub max_concurrent: u32,
    pub current_running: u32,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub tag_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobResponse {
    pub fn from_parts(
        job: CronJob,
        tag_names: Vec<String>,
        status: Option<JobStatusInfo>,
    ) -> Self {
        Self {
            id: job.id,
            name: job.name,
            url: job.url,
            method: job.method,
            headers: job.headers,
            body: job.body,
            schedule: job.schedule,
            schedule_type: job.schedule_type,
            schedule_description: status.as_ref().map(|s| s.schedule_description.clone()),
            is_active: job.is_active,
            request_timeout: job.request_timeout,
            execution_mode: job.execution_mode,
            max_concurrent: job.max_concurrent,
            current_running: status
                .as_ref()
                .map(|s| s.running_count)
                .unwrap_or(job.current_running),
            execution_count: job.execution_count,
            last_executed_at: job.last_executed_at,
            next_run: status.as_ref().and_then(|s| s.next_run),
            is_running: status
                .as_ref()
                .map(|s| s.running_count > 0)
                .unwrap_or(false),
            tag_names,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub status: Option<ExecutionStatus>,
    pub triggered_manually: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub expand: bool,
}

// Not flattened over LogQuery: the urlencoded deserializer cannot
// parse numbers through a flattened map
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub status: Option<ExecutionStatus>,
    pub triggered_manually: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub expand: bool,
    pub job_id: Option<Uuid>,
    /// Case-insensitive contains over the owning job's name
    pub job_name: Option<String>,
    /// Case-insensitive contains over the response body
    pub response_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    #[serde(default)]
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub response_code: Option<u16>,
    pub execution_time: u64,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub triggered_manually: bool,
}

impl LogResponse {
    pub fn from_log(log: ExecutionLog, expand: bool) -> Self {
        let response_body = log.response_body.map(|body| {
            if expand || body.chars().count() <= COLLAPSED_BODY_CHARS {
                body
            } else {
                let preview: String = body.chars().take(COLLAPSED_BODY_CHARS).collect();
                format!("{preview}...")
            }
        });
        Self {
            id: log.id,
            job_id: log.job_id,
            executed_at: log.executed_at,
            status: log.status,
            response_code: log.response_code,
            execution_time: log.execution_time,
            response_body,
            error_message: log.error_message,
            triggered_manually: log.triggered_manually,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(limit as u64)
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedLogs {
    pub data: Vec<LogResponse>,
    pub meta: PaginationMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBucketDto {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub min_execution_time: u64,
    pub avg_execution_time: u64,
    pub max_execution_time: u64,
}

impl From<StatsBucket> for StatsBucketDto {
    fn from(bucket: StatsBucket) -> Self {
        Self {
            total: bucket.total,
            success: bucket.success,
            failed: bucket.failed,
            success_rate: bucket.success_rate,
            min_execution_time: bucket.min_time_ms,
            avg_execution_time: bucket.avg_time_ms,
            max_execution_time: bucket.max_time_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatsDto {
    pub job_id: Uuid,
    pub job_name: String,
    #[serde(flatten)]
    pub bucket: StatsBucketDto,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub overall: StatsBucketDto,
    pub per_job: Vec<JobStatsDto>,
}

impl From<LogStats> for StatsResponse {
    fn from(stats: LogStats) -> Self {
        Self {
            overall: stats.overall.into(),
            per_job: stats
                .per_job
                .into_iter()
                .map(|JobStats { job_id, job_name, bucket }| JobStatsDto {
                    job_id,
                    job_name,
                    bucket: bucket.into(),
                })
                .collect(),
        }
    }
}

// ── Export / import payload ─────────────────────────────────────────

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub metadata: ExportMetadata,
    pub data: ExportData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    pub version: String,
    pub counts: ExportCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCounts {
    pub cron_jobs: u64,
    pub tags: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub cron_jobs: Vec<ExportedJob>,
    #[serde(default)]
    pub tags: Vec<ExportedTag>,
}

/// The identity set restored by an export→import round trip
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedJob {
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub schedule: String,
    pub schedule_type: ScheduleType,
    pub is_active: bool,
    pub request_timeout: Option<u64>,
    pub execution_mode: ExecutionMode,
    pub max_concurrent: u32,
    #[serde(default)]
    pub tag_names: Vec<String>,
}

impl ExportedJob {
    pub fn from_job(job: &CronJob, tag_names: Vec<String>) -> Self {
        Self {
            name: job.name.clone(),
            url: job.url.clone(),
            method: job.method,
            headers: job.headers.clone(),
            body: job.body.clone(),
            schedule: job.schedule.clone(),
            schedule_type: job.schedule_type,
            is_active: job.is_active,
            request_timeout: job.request_timeout,
            execution_mode: job.execution_mode,
            max_concurrent: job.max_concurrent,
            tag_names,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedTag {
    pub name: String,
    pub color: Option<String>,
}

impl From<&Tag> for ExportedTag {
    fn from(tag: &Tag) -> Self {
        Self {
            name: tag.name.clone(),
            color: tag.color.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub job_count: u64,
    pub tag_count: u64,
    pub errors: Vec<String>,
}
