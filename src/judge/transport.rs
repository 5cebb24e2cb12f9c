use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};

use crate::judge::{
    error::JudgeError,
    models::{ExecutionResult, SubmissionRequest, SubmissionResponse, SubmissionToken},
};

const RESULT_FIELDS: &str = "stdout,stderr,compile_output,status,time,memory";

/// One request/response exchange with the judge. Implementations hold no per-call state.
#[async_trait]
pub trait JudgeTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_submission(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionToken, JudgeError>;

    async fn fetch_submission(&self, token: &SubmissionToken)
    -> Result<ExecutionResult, JudgeError>;
}

#[derive(Debug, Clone)]
pub struct HttpJudgeTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpJudgeTransport {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(request_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| JudgeError::client(e.to_string(), None))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("X-Auth-Token", key),
            None => request,
        }
    }
}

#[async_trait]
impl JudgeTransport for HttpJudgeTransport {
    fn name(&self) -> &'static str {
        "judge0-http"
    }

    async fn create_submission(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionToken, JudgeError> {
        let url = format!("{}/submissions", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .query(&[("base64_encoded", "false"), ("wait", "false")])
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error("Failed to submit code", e))?;

        let response = ensure_success(response, "Failed to submit code")?;
        let body: SubmissionResponse = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to submit code", e))?;
        Ok(body.token)
    }

    async fn fetch_submission(
        &self,
        token: &SubmissionToken,
    ) -> Result<ExecutionResult, JudgeError> {
        let url = format!("{}/submissions/{}", self.base_url, token.as_str());
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("base64_encoded", "false"), ("fields", RESULT_FIELDS)])
            .send()
            .await
            .map_err(|e| transport_error("Failed to get result", e))?;

        let response = ensure_success(response, "Failed to get result")?;
        response
            .json()
            .await
            .map_err(|e| transport_error("Failed to get result", e))
    }
}

fn ensure_success(response: Response, context: &str) -> Result<Response, JudgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(JudgeError::client(
        format!(
            "{context}: {}",
            status.canonical_reason().unwrap_or("unexpected status")
        ),
        Some(status.as_u16()),
    ))
}

fn transport_error(context: &str, err: reqwest::Error) -> JudgeError {
    JudgeError::client(
        format!("{context}: {err}"),
        err.status().map(|s| s.as_u16()),
    )
}
