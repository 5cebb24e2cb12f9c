use std::{future::Future, sync::Arc, time::Duration};

use crate::judge::{
    error::JudgeError,
    models::{
        ExecuteOptions, ExecutionResult, OCTAVE_LANGUAGE_ID, StatusClass, SubmissionLimits,
        SubmissionRequest, SubmissionToken,
    },
    plot::{wrap_for_plot, wrap_for_plot_with_payload},
    transport::JudgeTransport,
    validator::validate,
};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub language_id: u32,
    pub limits: SubmissionLimits,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub emit_plot_payload: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            language_id: OCTAVE_LANGUAGE_ID,
            limits: SubmissionLimits::default(),
            poll_interval: Duration::from_millis(500),
            max_poll_attempts: 20,
            emit_plot_payload: true,
        }
    }
}

/// Drives a single submission from source text to a terminal judge result.
/// Every call owns its token and timers; the client itself is shared.
#[derive(Clone)]
pub struct ExecutionClient {
    transport: Arc<dyn JudgeTransport>,
    settings: ClientSettings,
}

impl ExecutionClient {
    pub fn new(transport: Arc<dyn JudgeTransport>, settings: ClientSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub async fn submit(&self, source: String) -> Result<SubmissionToken, JudgeError> {
        let request =
            SubmissionRequest::new(source, self.settings.language_id, &self.settings.limits);
        let token = self.transport.create_submission(&request).await?;
        tracing::info!(
            token = %token,
            transport = self.transport.name(),
            language_id = request.language_id(),
            source_len = request.source_code().len(),
            "submission created"
        );
        Ok(token)
    }

    /// Polls until the judge reports a terminal status or the attempt budget runs out.
    pub async fn poll(&self, token: &SubmissionToken) -> Result<ExecutionResult, JudgeError> {
        let max_attempts = self.settings.max_poll_attempts;

        for attempt in 1..=max_attempts {
            let result = self.transport.fetch_submission(token).await?;
            let class = result.status.classify();

            if class.is_terminal() {
                tracing::info!(
                    token = %token,
                    attempt,
                    status_id = result.status.id,
                    status = %result.status.description,
                    time = ?result.time,
                    memory_kb = ?result.memory,
                    "submission reached terminal status"
                );
                return Ok(result);
            }

            tracing::debug!(
                token = %token,
                attempt,
                queued = class == StatusClass::InQueue,
                "submission still pending"
            );

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        tracing::warn!(token = %token, attempts = max_attempts, "poll budget exhausted");
        Err(JudgeError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Validates, optionally wraps for plotting, submits and polls.
    ///
    /// Rejected code comes back as a terminal validation pseudo-result without any
    /// network traffic, so callers always see the same result shape.
    pub async fn execute_code(
        &self,
        code: &str,
        options: ExecuteOptions,
    ) -> Result<ExecutionResult, JudgeError> {
        if let Err(rejection) = validate(code) {
            tracing::info!(reason = %rejection, "code rejected before submission");
            return Ok(ExecutionResult::rejected(rejection.to_string()));
        }

        let source = if !options.requires_plot {
            code.to_string()
        } else if self.settings.emit_plot_payload {
            wrap_for_plot_with_payload(code)
        } else {
            wrap_for_plot(code)
        };

        let token = self.submit(source).await?;
        self.poll(&token).await
    }

    /// [`execute_code`](Self::execute_code) that gives up as soon as `cancel` resolves.
    /// No partial result is returned on cancellation.
    pub async fn execute_code_until<F>(
        &self,
        code: &str,
        options: ExecuteOptions,
        cancel: F,
    ) -> Result<ExecutionResult, JudgeError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.execute_code(code, options) => result,
            _ = cancel => {
                tracing::warn!("execution cancelled by caller");
                Err(JudgeError::Cancelled)
            }
        }
    }
}
