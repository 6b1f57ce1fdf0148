//! Retrying HTTP invoker.
//!
//! Executes one job's HTTP request as an attempt sequence: up to three
//! attempts with exponential backoff on transient failures, a per-job
//! request timeout, and a hard cap on captured response bodies. Retry
//! state lives on the stack; the outcome is always a value, never a
//! propagated error.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, warn};

use cronhook_core::model::{CronJob, ExecutionStatus, HttpMethod};

/// Maximum captured response size in bytes
pub const RESPONSE_BODY_CAP: usize = 10 * 1024;
/// Appended when a response body exceeds the cap
pub const TRUNCATION_SUFFIX: &str = "… [truncated]";
/// Body-snippet length used inside error messages
const ERROR_BODY_SNIPPET: usize = 200;

/// Invoker tuning knobs
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Attempts per sequence, including the first
    pub max_attempts: u32,
    /// Base backoff; attempt i waits base * 2^(i-1)
    pub backoff_base_ms: u64,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
        }
    }
}

/// Terminal outcome of one attempt sequence
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    /// Retries actually performed (attempts - 1)
    pub retry_count: u32,
}

impl ExecutionOutcome {
    fn success(code: StatusCode, body: String, retry_count: u32) -> Self {
        Self {
            status: ExecutionStatus::Success,
            response_code: Some(code.as_u16()),
            response_body: Some(body),
            error_message: None,
            retry_count,
        }
    }

    fn http_failure(code: StatusCode, body: String, retry_count: u32) -> Self {
        let reason = code.canonical_reason().unwrap_or("Unknown");
        let snippet = snippet(&body);
        let message = if snippet.is_empty() {
            format!("HTTP {}: {}", code.as_u16(), reason)
        } else {
            format!("HTTP {}: {} - {}", code.as_u16(), reason, snippet)
        };
        Self {
            status: ExecutionStatus::Failed,
            response_code: Some(code.as_u16()),
            response_body: Some(body),
            error_message: Some(message),
            retry_count,
        }
    }

    fn network_failure(code: &'static str, detail: String, retry_count: u32) -> Self {
        let message = if detail.is_empty() {
            format!("Network error: {code}")
        } else {
            format!("Network error: {code} - {detail}")
        };
        Self {
            status: ExecutionStatus::Failed,
            response_code: None,
            response_body: None,
            error_message: Some(message),
            retry_count,
        }
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_BODY_SNIPPET {
        return trimmed.to_string();
    }
    let mut end = ERROR_BODY_SNIPPET;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Executes job requests with retries
pub struct HttpInvoker {
    client: Client,
    config: InvokerConfig,
}

impl HttpInvoker {
    pub fn new() -> Self {
        Self::with_config(InvokerConfig::default())
    }

    pub fn with_config(config: InvokerConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("cronhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Run the attempt sequence for one job. Never returns an error;
    /// every path produces an outcome for the log recorder.
    pub async fn execute(&self, job: &CronJob) -> ExecutionOutcome {
        let headers = parse_headers(job);
        let timeout = Duration::from_millis(job.effective_timeout_ms());

        let mut attempt: u32 = 1;
        loop {
            let retries_done = attempt - 1;
            let request = self.build_request(job, headers.clone(), timeout);

            match request.send().await {
                Ok(response) => {
                    let code = response.status();
                    let body = read_capped_body(response).await;

                    if code.is_success() {
                        return ExecutionOutcome::success(code, body, retries_done);
                    }

                    let retryable = code.as_u16() >= 500 || code == StatusCode::TOO_MANY_REQUESTS;
                    if retryable && attempt < self.config.max_attempts {
                        debug!(
                            job_id = %job.id,
                            status = code.as_u16(),
                            attempt,
                            "Retryable HTTP status, backing off"
                        );
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }

                    return ExecutionOutcome::http_failure(code, body, retries_done);
                }
                Err(err) => {
                    let code = classify_transport_error(&err);
                    let retryable = !err.is_builder();
                    if retryable && attempt < self.config.max_attempts {
                        debug!(
                            job_id = %job.id,
                            error = %err,
                            attempt,
                            "Transport error, backing off"
                        );
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }

                    return ExecutionOutcome::network_failure(code, root_cause(&err), retries_done);
                }
            }
        }
    }

    fn build_request(
        &self,
        job: &CronJob,
        headers: HeaderMap,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let method = match job.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut request = self
            .client
            .request(method, &job.url)
            .headers(headers)
            .timeout(timeout);

        if job.method == HttpMethod::Post {
            if let Some(body) = &job.body {
                request = match serde_json::from_str::<serde_json::Value>(body) {
                    Ok(value) => request.json(&value),
                    Err(_) => request.body(body.clone()),
                };
            }
        }

        request
    }

    /// Sleep before attempt `attempt + 1` (1-indexed attempts)
    async fn backoff(&self, attempt: u32) {
        let delay = self.config.backoff_base_ms * 2u64.pow(attempt.saturating_sub(1));
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

impl Default for HttpInvoker {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a header map from the job's stored JSON object. A parse
/// failure is non-fatal: the request goes out with no extra headers.
fn parse_headers(job: &CronJob) -> HeaderMap {
    let mut map = HeaderMap::new();
    let Some(raw) = job.headers.as_deref() else {
        return map;
    };
    if raw.trim().is_empty() {
        return map;
    }

    let parsed: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(job_id = %job.id, error = %err, "Invalid headers JSON, sending without headers");
            return map;
        }
    };
    let Some(object) = parsed.as_object() else {
        warn!(job_id = %job.id, "Headers are not a JSON object, sending without headers");
        return map;
    };

    for (key, value) in object {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&text),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => {
                warn!(job_id = %job.id, header = %key, "Skipping invalid header");
            }
        }
    }
    map
}

/// Read at most `RESPONSE_BODY_CAP` bytes of the response body,
/// appending the truncation suffix when the payload was larger.
async fn read_capped_body(mut response: Response) -> String {
    let mut collected: Vec<u8> = Vec::new();
    let mut truncated = false;

    while let Ok(Some(chunk)) = response.chunk().await {
        if collected.len() + chunk.len() > RESPONSE_BODY_CAP {
            let room = RESPONSE_BODY_CAP - collected.len();
            collected.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        collected.extend_from_slice(&chunk);
    }

    let mut body = String::from_utf8_lossy(&collected).into_owned();
    if truncated {
        body.push_str(TRUNCATION_SUFFIX);
    }
    body
}

/// Map a reqwest error onto the stable OS-style code taxonomy
fn classify_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        return "ETIMEDOUT";
    }
    let chain = root_cause(err).to_lowercase();
    if chain.contains("dns") || chain.contains("name or service not known") {
        return "ENOTFOUND";
    }
    if chain.contains("reset") {
        return "ECONNRESET";
    }
    if err.is_connect() {
        return "ECONNREFUSED";
    }
    if err.is_builder() {
        return "EINVAL";
    }
    "ECONNABORTED"
}

/// Innermost error message in the source chain
fn root_cause(err: &reqwest::Error) -> String {
    let mut source: &dyn std::error::Error = err;
    while let Some(inner) = source.source() {
        source = inner;
    }
    source.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cronhook_core::model::{ExecutionMode, ScheduleType};
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job_for(url: String) -> CronJob {
        CronJob {
            id: Uuid::new_v4(),
            name: "invoke".into(),
            url,
            method: HttpMethod::Get,
            headers: None,
            body: None,
            schedule: "5m".into(),
            schedule_type: ScheduleType::Repeat,
            is_active: true,
            request_timeout: Some(2_000),
            execution_mode: ExecutionMode::Sequential,
            max_concurrent: 1,
            current_running: 0,
            execution_count: 0,
            last_executed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fast_invoker() -> HttpInvoker {
        HttpInvoker::with_config(InvokerConfig {
            max_attempts: 3,
            backoff_base_ms: 10,
        })
    }

    #[tokio::test]
    async fn success_captures_body_and_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .mount(&server)
            .await;

        let job = job_for(format!("{}/ping", server.uri()));
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.response_code, Some(200));
        assert_eq!(outcome.response_body.as_deref(), Some(r#"{"ok":true}"#));
        assert!(outcome.error_message.is_none());
        assert_eq!(outcome.retry_count, 0);
    }

    #[tokio::test]
    async fn retries_on_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let job = job_for(format!("{}/flaky", server.uri()));
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.response_code, Some(200));
        assert_eq!(outcome.retry_count, 2);
    }

    #[tokio::test]
    async fn exhausted_5xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let job = job_for(format!("{}/down", server.uri()));
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.response_code, Some(503));
        assert_eq!(outcome.retry_count, 2);
        let message = outcome.error_message.unwrap();
        assert!(message.starts_with("HTTP 503: Service Unavailable"));
        assert!(message.contains("maintenance"));
    }

    #[tokio::test]
    async fn status_404_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let job = job_for(format!("{}/missing", server.uri()));
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.response_code, Some(404));
        assert_eq!(outcome.retry_count, 0);
        assert!(outcome
            .error_message
            .unwrap()
            .starts_with("HTTP 404: "));
    }

    #[tokio::test]
    async fn status_429_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/throttled"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/throttled"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let job = job_for(format!("{}/throttled", server.uri()));
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.retry_count, 1);
    }

    #[tokio::test]
    async fn connection_refused_exhausts_retries() {
        // Port 1 is never listening
        let job = job_for("http://127.0.0.1:1/void".into());
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.response_code, None);
        assert_eq!(outcome.retry_count, 2);
        assert!(outcome
            .error_message
            .unwrap()
            .starts_with("Network error: ECONNREFUSED"));
    }

    #[tokio::test]
    async fn oversized_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(20 * 1024)))
            .mount(&server)
            .await;

        let job = job_for(format!("{}/big", server.uri()));
        let outcome = fast_invoker().execute(&job).await;

        let body = outcome.response_body.unwrap();
        assert!(body.ends_with(TRUNCATION_SUFFIX));
        assert!(body.len() <= RESPONSE_BODY_CAP + TRUNCATION_SUFFIX.len());
    }

    #[tokio::test]
    async fn invalid_headers_fall_back_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lenient"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut job = job_for(format!("{}/lenient", server.uri()));
        job.headers = Some("{not valid json".into());
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn post_sends_json_when_parsable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("x-api-key", "k1"))
            .and(body_json(serde_json::json!({"n": 1})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut job = job_for(format!("{}/ingest", server.uri()));
        job.method = HttpMethod::Post;
        job.headers = Some(r#"{"X-Api-Key": "k1"}"#.into());
        job.body = Some(r#"{"n": 1}"#.into());
        let outcome = fast_invoker().execute(&job).await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.response_code, Some(201));
    }
}
