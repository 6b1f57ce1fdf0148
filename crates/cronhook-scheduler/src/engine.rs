//! Scheduler core: registry, timers, gating, dispatch, lifecycle.
//!
//! Every registered job owns one timer task that sleeps until the next
//! fire instant and then dispatches. Dispatch re-reads the job from the
//! store, gates on a per-entry atomic counter, and hands the actual
//! HTTP work to a separately spawned task so timer ticks never block.
//! A missed tick is not replayed: at most one execution per intended
//! fire, zero when gated.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cronhook_core::error::{Error, Result};
use cronhook_core::model::{CronJob, ExecutionLog, ExecutionStatus, JobRuntimeUpdate};
use cronhook_core::schedule::Schedule;
use cronhook_database::{JobRepository, LogRepository};

use crate::invoker::HttpInvoker;
use crate::recorder::ExecutionRecorder;

/// Observable run state of a registered job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobRunState {
    Idle,
    Running,
    Error,
}

/// Per-job registry entry. The `running` counter is the gating point:
/// the dispatch decision must be atomic per job id, which the
/// compare-and-set loop in `try_acquire` provides.
struct JobEntry {
    job: RwLock<CronJob>,
    schedule: RwLock<Schedule>,
    timer: Mutex<Option<AbortHandle>>,
    running: AtomicU32,
    max_running: AtomicU32,
    last_run: RwLock<Option<DateTime<Utc>>>,
    next_run: RwLock<Option<DateTime<Utc>>>,
    state: RwLock<JobRunState>,
}

impl JobEntry {
    fn new(job: CronJob, schedule: Schedule) -> Self {
        let max = job.effective_max_concurrent();
        Self {
            job: RwLock::new(job),
            schedule: RwLock::new(schedule),
            timer: Mutex::new(None),
            running: AtomicU32::new(0),
            max_running: AtomicU32::new(max),
            last_run: RwLock::new(None),
            next_run: RwLock::new(None),
            state: RwLock::new(JobRunState::Idle),
        }
    }

    /// Claim one execution slot; false when the job is saturated
    fn try_acquire(&self) -> bool {
        let max = self.max_running.load(Ordering::Relaxed);
        loop {
            let current = self.running.load(Ordering::Acquire);
            if current >= max {
                return false;
            }
            if self
                .running
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self) {
        // Saturating decrement; the counter can never go negative
        let mut current = self.running.load(Ordering::Acquire);
        while current > 0 {
            match self.running.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    fn refresh_snapshot(&self, job: CronJob) {
        self.max_running
            .store(job.effective_max_concurrent(), Ordering::Relaxed);
        *self.job.write() = job;
    }

    fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

/// Snapshot of a registry entry for the API layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusInfo {
    pub job_id: Uuid,
    pub name: String,
    pub state: JobRunState,
    pub running_count: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub schedule_description: String,
}

struct EngineInner {
    jobs: JobRepository,
    invoker: HttpInvoker,
    recorder: ExecutionRecorder,
    registry: DashMap<Uuid, Arc<JobEntry>>,
    timezone: Tz,
    shutting_down: AtomicBool,
    in_flight: AtomicUsize,
}

/// The scheduling engine. Cheap to clone; all clones share one
/// registry and all lifecycle calls go through it.
#[derive(Clone)]
pub struct SchedulerEngine {
    inner: Arc<EngineInner>,
}

impl SchedulerEngine {
    pub fn new(jobs: JobRepository, logs: LogRepository, timezone: Tz) -> Self {
        Self::with_invoker(jobs, logs, timezone, HttpInvoker::new())
    }

    pub fn with_invoker(
        jobs: JobRepository,
        logs: LogRepository,
        timezone: Tz,
        invoker: HttpInvoker,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                jobs,
                invoker,
                recorder: ExecutionRecorder::new(logs),
                registry: DashMap::new(),
                timezone,
                shutting_down: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Load every active job from the store and register it
    pub async fn bootstrap(&self) -> Result<usize> {
        let jobs = self.inner.jobs.list_active().await?;
        let mut registered = 0;
        for job in jobs {
            let id = job.id;
            match self.register(job) {
                Ok(_) => registered += 1,
                Err(err) => {
                    warn!(job_id = %id, error = %err, "Skipping job with invalid schedule");
                }
            }
        }
        info!(count = registered, "Scheduler bootstrapped");
        Ok(registered)
    }

    /// Install (or reinstall) the timer for a job. Registering an
    /// inactive job only clears any existing timer.
    pub fn register(&self, job: CronJob) -> Result<()> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ShutdownInProgress);
        }

        let schedule = Schedule::parse(&job.schedule, job.schedule_type)?;

        // Idempotent: drop any previous timer for this id
        if let Some((_, old)) = self.inner.registry.remove(&job.id) {
            old.stop_timer();
        }

        if !job.is_active {
            debug!(job_id = %job.id, "Not registering inactive job");
            return Ok(());
        }

        let id = job.id;
        let name = job.name.clone();
        let entry = Arc::new(JobEntry::new(job, schedule));
        let handle = self.spawn_timer(id, Arc::clone(&entry));
        *entry.timer.lock() = Some(handle);
        self.inner.registry.insert(id, entry);

        info!(job_id = %id, name = %name, "Job registered");
        Ok(())
    }

    /// Reload a job from the store and reinstall its timer
    pub async fn update(&self, id: Uuid) -> Result<()> {
        match self.inner.jobs.find(id).await? {
            Some(job) => self.register(job),
            None => {
                self.remove(id);
                Ok(())
            }
        }
    }

    /// Re-register after a job was switched on
    pub async fn enable(&self, id: Uuid) -> Result<()> {
        self.update(id).await
    }

    /// Stop the timer and forget the entry. In-flight executions finish
    /// on their own.
    pub fn disable(&self, id: Uuid) {
        self.remove(id);
    }

    /// Remove a job from the registry. Tolerates unknown ids.
    pub fn remove(&self, id: Uuid) {
        if let Some((_, entry)) = self.inner.registry.remove(&id) {
            entry.stop_timer();
            info!(job_id = %id, "Job unregistered");
        }
    }

    pub fn is_job_running(&self, id: Uuid) -> bool {
        self.inner
            .registry
            .get(&id)
            .map(|entry| entry.running.load(Ordering::Acquire) > 0)
            .unwrap_or(false)
    }

    pub fn job_status(&self, id: Uuid) -> Option<JobStatusInfo> {
        self.inner
            .registry
            .get(&id)
            .map(|entry| Self::status_of(&entry))
    }

    pub fn list_status(&self) -> Vec<JobStatusInfo> {
        self.inner
            .registry
            .iter()
            .map(|entry| Self::status_of(entry.value()))
            .collect()
    }

    pub fn registered_count(&self) -> usize {
        self.inner.registry.len()
    }

    fn status_of(entry: &JobEntry) -> JobStatusInfo {
        let job = entry.job.read();
        JobStatusInfo {
            job_id: job.id,
            name: job.name.clone(),
            state: *entry.state.read(),
            running_count: entry.running.load(Ordering::Acquire),
            last_run: *entry.last_run.read(),
            next_run: *entry.next_run.read(),
            schedule_description: entry.schedule.read().describe(),
        }
    }

    /// Out-of-band execution of one job. Runs the same dispatch steps
    /// as a timer fire, minus the timer, and waits for the outcome.
    /// Rate limiting is the API layer's concern, not this method's.
    pub async fn execute_job_manually(&self, id: Uuid) -> Result<ExecutionLog> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ShutdownInProgress);
        }

        let job = self
            .inner
            .jobs
            .find(id)
            .await?
            .ok_or_else(|| Error::not_found("CronJob", id))?;
        if !job.is_active {
            return Err(Error::Inactive { job_id: id });
        }

        let entry = match self.inner.registry.get(&id) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                // Active job that never got registered (e.g. another
                // instance owns the timers); gate on a transient entry.
                debug!(job_id = %id, "Manual trigger for unregistered job");
                let schedule = Schedule::parse(&job.schedule, job.schedule_type)?;
                Arc::new(JobEntry::new(job.clone(), schedule))
            }
        };

        entry.refresh_snapshot(job.clone());
        if !entry.try_acquire() {
            return Err(Error::AlreadyRunning { job_id: id });
        }

        self.persist_running(&job, &entry).await;
        let log = self.run_pipeline(job, entry, true).await;
        Ok(log)
    }

    /// Stop accepting fires, abort every timer, and wait for in-flight
    /// executions to drain (bounded by `timeout`).
    pub async fn shutdown(&self, timeout: Duration) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        for entry in self.inner.registry.iter() {
            entry.value().stop_timer();
        }
        info!("All job timers stopped");

        let started = std::time::Instant::now();
        loop {
            let active = self.inner.in_flight.load(Ordering::SeqCst);
            if active == 0 {
                info!("All in-flight executions drained");
                break;
            }
            if started.elapsed() > timeout {
                warn!(active, "Shutdown drain timeout reached");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn spawn_timer(&self, id: Uuid, entry: Arc<JobEntry>) -> AbortHandle {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                let next = {
                    let schedule = entry.schedule.read();
                    schedule.next_after(Utc::now(), engine.inner.timezone)
                };
                let Some(next) = next else {
                    warn!(job_id = %id, "Schedule has no future fire instants, stopping timer");
                    break;
                };
                *entry.next_run.write() = Some(next);

                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                if engine.inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                engine.dispatch(id).await;
            }
            debug!(job_id = %id, "Timer task exited");
        })
        .abort_handle()
    }

    /// Handle one fire event. Never panics out of the timer task.
    async fn dispatch(&self, id: Uuid) {
        let Some(entry) = self.inner.registry.get(&id).map(|e| Arc::clone(e.value())) else {
            debug!(job_id = %id, "Fire for unknown job, ignoring");
            return;
        };

        // Reload so the fire sees current settings
        let job = match self.inner.jobs.find(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %id, "Job vanished from store, unregistering");
                self.remove(id);
                return;
            }
            Err(err) => {
                warn!(job_id = %id, error = %err, "Store reload failed, skipping fire");
                return;
            }
        };
        if !job.is_active {
            info!(job_id = %id, "Job no longer active, unregistering");
            self.remove(id);
            return;
        }

        entry.refresh_snapshot(job.clone());
        if !entry.try_acquire() {
            warn!(
                job_id = %id,
                mode = job.execution_mode.as_str(),
                running = entry.running.load(Ordering::Acquire),
                "Fire skipped: job saturated"
            );
            return;
        }

        self.persist_running(&job, &entry).await;

        // Hand off so the timer tick is never blocked by I/O
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_pipeline(job, entry, false).await;
        });
    }

    /// Mark the entry running and persist the counter
    async fn persist_running(&self, job: &CronJob, entry: &Arc<JobEntry>) {
        *entry.state.write() = JobRunState::Running;
        *entry.last_run.write() = Some(Utc::now());

        let update = JobRuntimeUpdate {
            current_running: Some(entry.running.load(Ordering::Acquire)),
            ..JobRuntimeUpdate::default()
        };
        if let Err(err) = self.inner.jobs.update_runtime(job.id, update).await {
            warn!(job_id = %job.id, error = %err, "Failed to persist running counter");
        }
    }

    /// Invoke, record, finalize. The finalizer tolerates a registry
    /// entry that was removed mid-flight.
    async fn run_pipeline(
        &self,
        job: CronJob,
        entry: Arc<JobEntry>,
        triggered_manually: bool,
    ) -> ExecutionLog {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();

        let outcome = self.inner.invoker.execute(&job).await;
        match outcome.status {
            ExecutionStatus::Success => {
                info!(
                    job_id = %job.id,
                    code = ?outcome.response_code,
                    retries = outcome.retry_count,
                    "Execution succeeded"
                );
            }
            ExecutionStatus::Failed => {
                error!(
                    job_id = %job.id,
                    code = ?outcome.response_code,
                    error = outcome.error_message.as_deref().unwrap_or("unknown"),
                    "Execution failed"
                );
            }
        }

        let log = self
            .inner
            .recorder
            .record(job.id, started_at, &outcome, triggered_manually)
            .await;

        // Finalizer
        entry.release();
        *entry.state.write() = match outcome.status {
            ExecutionStatus::Success => JobRunState::Idle,
            ExecutionStatus::Failed => JobRunState::Error,
        };

        let update = JobRuntimeUpdate {
            current_running: Some(entry.running.load(Ordering::Acquire)),
            last_executed_at: Some(started_at),
            execution_count: Some(job.execution_count + 1),
        };
        if let Err(err) = self.inner.jobs.update_runtime(job.id, update).await {
            // Transient drift in the persisted counters is acceptable
            warn!(job_id = %job.id, error = %err, "Finalizer runtime update failed");
        }

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cronhook_core::model::{ExecutionMode, HttpMethod, ScheduleType};

    fn entry_for(mode: ExecutionMode, max_concurrent: u32) -> JobEntry {
        let job = CronJob {
            id: Uuid::new_v4(),
            name: "gate".into(),
            url: "https://api.example.com/x".into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            schedule: "5m".into(),
            schedule_type: ScheduleType::Repeat,
            is_active: true,
            request_timeout: None,
            execution_mode: mode,
            max_concurrent,
            current_running: 0,
            execution_count: 0,
            last_executed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let schedule = Schedule::parse("5m", ScheduleType::Repeat).unwrap();
        JobEntry::new(job, schedule)
    }

    #[test]
    fn sequential_gate_is_single_flight() {
        let entry = entry_for(ExecutionMode::Sequential, 10);
        assert!(entry.try_acquire());
        assert!(!entry.try_acquire());
        entry.release();
        assert!(entry.try_acquire());
    }

    #[test]
    fn parallel_gate_honors_max_concurrent() {
        let entry = entry_for(ExecutionMode::Parallel, 3);
        assert!(entry.try_acquire());
        assert!(entry.try_acquire());
        assert!(entry.try_acquire());
        assert!(!entry.try_acquire());
        entry.release();
        assert!(entry.try_acquire());
    }

    #[test]
    fn release_never_underflows() {
        let entry = entry_for(ExecutionMode::Sequential, 1);
        entry.release();
        assert_eq!(entry.running.load(Ordering::Acquire), 0);
        assert!(entry.try_acquire());
    }

    #[test]
    fn gate_holds_under_contention() {
        let entry = Arc::new(entry_for(ExecutionMode::Parallel, 4));
        let acquired = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let entry = Arc::clone(&entry);
                let acquired = Arc::clone(&acquired);
                std::thread::spawn(move || {
                    if entry.try_acquire() {
                        acquired.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(acquired.load(Ordering::SeqCst), 4);
        assert_eq!(entry.running.load(Ordering::Acquire), 4);
    }

    #[test]
    fn refresh_snapshot_updates_gate_bound() {
        let entry = entry_for(ExecutionMode::Parallel, 2);
        let mut job = entry.job.read().clone();
        assert!(entry.try_acquire());
        assert!(entry.try_acquire());
        assert!(!entry.try_acquire());

        job.max_concurrent = 3;
        entry.refresh_snapshot(job);
        assert!(entry.try_acquire());
        assert!(!entry.try_acquire());
    }
}
