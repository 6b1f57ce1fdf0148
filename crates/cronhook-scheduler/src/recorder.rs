//! Execution-log recorder.
//!
//! Writes exactly one log row per attempt sequence. The row carries the
//! sequence start time and the whole-sequence duration, backoffs
//! included. Insert failures must never take the engine down; they are
//! logged and swallowed.

use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use cronhook_core::model::ExecutionLog;
use cronhook_database::LogRepository;

use crate::invoker::ExecutionOutcome;

#[derive(Clone)]
pub struct ExecutionRecorder {
    logs: LogRepository,
}

impl ExecutionRecorder {
    pub fn new(logs: LogRepository) -> Self {
        Self { logs }
    }

    /// Persist the outcome of one attempt sequence. Returns the log that
    /// was (or would have been) written so callers can surface it.
    pub async fn record(
        &self,
        job_id: Uuid,
        started_at: DateTime<Utc>,
        outcome: &ExecutionOutcome,
        triggered_manually: bool,
    ) -> ExecutionLog {
        let execution_time = (Utc::now() - started_at).num_milliseconds().max(0) as u64;

        let log = ExecutionLog {
            id: Uuid::new_v4(),
            job_id,
            executed_at: started_at,
            status: outcome.status,
            response_code: outcome.response_code,
            execution_time,
            response_body: outcome.response_body.clone(),
            error_message: outcome.error_message.clone(),
            triggered_manually,
        };

        if let Err(err) = self.logs.insert(&log).await {
            error!(job_id = %job_id, error = %err, "Failed to persist execution log");
        }

        log
    }
}
