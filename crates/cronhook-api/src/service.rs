//! Service layer bridging the REST handlers, the store, and the engine.
//!
//! This is the reconciler: every store write is followed by the
//! matching engine lifecycle call, so the in-memory registry tracks
//! CRUD without a cyclic dependency between the API and the scheduler.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use cronhook_core::error::Result;
use cronhook_core::model::CronJob;
use cronhook_core::schedule::Schedule;
use cronhook_database::LogFilter;

use crate::dto::{
    CreateJobRequest, ExportCounts, ExportData, ExportMetadata, ExportPayload, ExportedJob,
    ExportedTag, ImportSummary, JobResponse, LogQuery, LogResponse, PaginatedLogs, PaginationMeta,
    SearchQuery, StatsQuery, StatsResponse, UpdateJobRequest, ValidationReport, EXPORT_VERSION,
};
use crate::ApiContext;

/// Hard ceiling on page size
pub const MAX_PAGE_LIMIT: u32 = 100;

impl ApiContext {
    // ── Jobs ────────────────────────────────────────────────────────

    pub async fn create_job(&self, request: CreateJobRequest) -> Result<JobResponse> {
        let now = Utc::now();
        let job = CronJob {
            id: Uuid::new_v4(),
            name: request.name,
            url: request.url,
            method: request.method,
            headers: request.headers,
            body: request.body,
            schedule: request.schedule,
            schedule_type: request.schedule_type,
            is_active: request.is_active,
            request_timeout: request.request_timeout,
            execution_mode: request.execution_mode,
            max_concurrent: request.max_concurrent,
            current_running: 0,
            execution_count: 0,
            last_executed_at: None,
            created_at: now,
            updated_at: now,
        };
        job.validate()?;

        self.jobs.create(&job).await?;
        if let Some(names) = &request.tag_names {
            self.jobs.set_tag_names(job.id, names).await?;
        }

        if job.is_active {
            self.engine.register(job.clone())?;
        }

        self.job_response(job).await
    }

    pub async fn update_job(&self, id: Uuid, request: UpdateJobRequest) -> Result<JobResponse> {
        let mut job = self.jobs.get(id).await?;

        if let Some(name) = request.name {
            job.name = name;
        }
        if let Some(url) = request.url {
            job.url = url;
        }
        if let Some(method) = request.method {
            job.method = method;
        }
        if request.headers.is_some() {
            job.headers = request.headers;
        }
        if request.body.is_some() {
            job.body = request.body;
        }
        if let Some(schedule) = request.schedule {
            job.schedule = schedule;
        }
        if let Some(schedule_type) = request.schedule_type {
            job.schedule_type = schedule_type;
        }
        if let Some(is_active) = request.is_active {
            job.is_active = is_active;
        }
        if request.request_timeout.is_some() {
            job.request_timeout = request.request_timeout;
        }
        if let Some(mode) = request.execution_mode {
            job.execution_mode = mode;
        }
        if let Some(max) = request.max_concurrent {
            job.max_concurrent = max;
        }
        job.validate()?;

        self.jobs.update(&job).await?;
        if let Some(names) = &request.tag_names {
            self.jobs.set_tag_names(id, names).await?;
        }

        // Any field change reinstalls the timer with fresh settings
        self.engine.update(id).await?;

        let job = self.jobs.get(id).await?;
        self.job_response(job).await
    }

    pub async fn toggle_job(&self, id: Uuid) -> Result<JobResponse> {
        let job = self.jobs.get(id).await?;
        let job = self.jobs.set_active(id, !job.is_active).await?;

        if job.is_active {
            self.engine.enable(id).await?;
        } else {
            self.engine.disable(id);
        }

        self.job_response(job).await
    }

    pub async fn delete_job(&self, id: Uuid) -> Result<()> {
        self.jobs.delete(id).await?;
        self.engine.remove(id);
        self.limiter.forget(id);
        Ok(())
    }

    pub async fn get_job(&self, id: Uuid) -> Result<JobResponse> {
        let job = self.jobs.get(id).await?;
        self.job_response(job).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobResponse>> {
        let jobs = self.jobs.list().await?;
        let mut responses = Vec::with_capacity(jobs.len());
        for job in jobs {
            responses.push(self.job_response(job).await?);
        }
        Ok(responses)
    }

    /// Rate-limited manual trigger. The limit lives here, at the API
    /// boundary; the engine itself never consults it.
    pub async fn trigger_job(&self, id: Uuid) -> Result<LogResponse> {
        self.limiter.check(id)?;
        let log = self.engine.execute_job_manually(id).await?;
        Ok(LogResponse::from_log(log, true))
    }

    async fn job_response(&self, job: CronJob) -> Result<JobResponse> {
        let tag_names = self.jobs.tag_names(job.id).await?;
        let status = self.engine.job_status(job.id);
        Ok(JobResponse::from_parts(job, tag_names, status))
    }

    // ── Logs ────────────────────────────────────────────────────────

    pub async fn job_logs(&self, id: Uuid, query: LogQuery) -> Result<PaginatedLogs> {
        // 404 for unknown jobs rather than an empty page
        self.jobs.get(id).await?;

        let filter = LogFilter {
            job_id: Some(id),
            status: query.status,
            triggered_manually: query.triggered_manually,
            start: query.start_date,
            end: query.end_date,
            ..LogFilter::default()
        };
        self.page_logs(filter, query.page, query.limit, query.expand)
            .await
    }

    pub async fn search_logs(&self, query: SearchQuery) -> Result<PaginatedLogs> {
        let filter = LogFilter {
            job_id: query.job_id,
            status: query.status,
            triggered_manually: query.triggered_manually,
            start: query.start_date,
            end: query.end_date,
            job_name_contains: query.job_name,
            response_contains: query.response_content,
        };
        self.page_logs(filter, query.page, query.limit, query.expand)
            .await
    }

    async fn page_logs(
        &self,
        filter: LogFilter,
        page: u32,
        limit: u32,
        expand: bool,
    ) -> Result<PaginatedLogs> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let page = page.max(1);

        let result = self.logs.list(&filter, page, limit).await?;
        Ok(PaginatedLogs {
            data: result
                .logs
                .into_iter()
                .map(|log| LogResponse::from_log(log, expand))
                .collect(),
            meta: PaginationMeta::new(page, limit, result.total),
        })
    }

    pub async fn log_stats(&self, query: StatsQuery) -> Result<StatsResponse> {
        let stats = self.logs.stats(query.start_date, query.end_date).await?;
        Ok(stats.into())
    }

    pub async fn sweep_logs(&self, days_override: Option<u32>) -> Result<u64> {
        self.sweeper.sweep_now(days_override).await
    }

    // ── Export / import ─────────────────────────────────────────────

    pub async fn export_data(&self) -> Result<ExportPayload> {
        let jobs = self.jobs.list().await?;
        let tags = self.jobs.list_tags().await?;

        let mut exported_jobs = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let tag_names = self.jobs.tag_names(job.id).await?;
            exported_jobs.push(ExportedJob::from_job(job, tag_names));
        }

        Ok(ExportPayload {
            metadata: ExportMetadata {
                exported_at: Utc::now(),
                version: EXPORT_VERSION.into(),
                counts: ExportCounts {
                    cron_jobs: exported_jobs.len() as u64,
                    tags: tags.len() as u64,
                },
            },
            data: ExportData {
                cron_jobs: exported_jobs,
                tags: tags.iter().map(ExportedTag::from).collect(),
            },
        })
    }

    pub async fn import_data(&self, payload: ExportPayload) -> Result<ImportSummary> {
        let mut summary = ImportSummary {
            imported: 0,
            skipped: 0,
            errors: Vec::new(),
        };

        for exported in payload.data.cron_jobs {
            let name = exported.name.clone();
            match self.import_one(exported).await {
                Ok(_) => summary.imported += 1,
                Err(err) => {
                    summary.skipped += 1;
                    summary.errors.push(format!("{name}: {err}"));
                }
            }
        }

        Ok(summary)
    }

    async fn import_one(&self, exported: ExportedJob) -> Result<()> {
        let now = Utc::now();
        let job = CronJob {
            id: Uuid::new_v4(),
            name: exported.name,
            url: exported.url,
            method: exported.method,
            headers: exported.headers,
            body: exported.body,
            schedule: exported.schedule,
            schedule_type: exported.schedule_type,
            is_active: exported.is_active,
            request_timeout: exported.request_timeout,
            execution_mode: exported.execution_mode,
            max_concurrent: exported.max_concurrent,
            current_running: 0,
            execution_count: 0,
            last_executed_at: None,
            created_at: now,
            updated_at: now,
        };
        job.validate()?;

        self.jobs.create(&job).await?;
        if !exported.tag_names.is_empty() {
            self.jobs.set_tag_names(job.id, &exported.tag_names).await?;
        }

        if job.is_active {
            if let Err(err) = self.engine.register(job) {
                warn!(error = %err, "Imported job could not be registered");
            }
        }
        Ok(())
    }

    pub fn validate_payload(&self, payload: &ExportPayload) -> ValidationReport {
        let mut errors = Vec::new();

        for (index, job) in payload.data.cron_jobs.iter().enumerate() {
            if job.name.trim().is_empty() {
                errors.push(format!("cronJobs[{index}]: name must not be empty"));
            }
            if let Err(err) = cronhook_core::model::validate_url(&job.url) {
                errors.push(format!("cronJobs[{index}] ({}): {err}", job.name));
            }
            if let Err(err) = Schedule::validate(&job.schedule, job.schedule_type) {
                errors.push(format!("cronJobs[{index}] ({}): {err}", job.name));
            }
        }
        for (index, tag) in payload.data.tags.iter().enumerate() {
            if tag.name.trim().is_empty() {
                errors.push(format!("tags[{index}]: name must not be empty"));
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            job_count: payload.data.cron_jobs.len() as u64,
            tag_count: payload.data.tags.len() as u64,
            errors,
        }
    }
}
