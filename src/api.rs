use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    diagnostics::friendly_error,
    error::{ApiError, ApiResult},
    grading::{ExerciseSpec, GradedAttempt, Grader},
    judge::{ExecuteOptions, ExecutionClient, ExecutionOutcome, validator::validate},
    metrics::MetricsRegistry,
    rate_limit::SubmissionQuota,
};

const RECENT_ATTEMPTS_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AppState {
    api_keys: Arc<HashMap<String, String>>,
    execution_deadline: Duration,
    client: ExecutionClient,
    grader: Grader,
    metrics: Arc<MetricsRegistry>,
    quota: SubmissionQuota,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        client: ExecutionClient,
        grader: Grader,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            api_keys: Arc::new(config.api_keys.clone()),
            execution_deadline: config.execution_deadline,
            client,
            grader,
            metrics,
            quota: SubmissionQuota::new(config.rate_limit_per_minute, config.rate_limit_burst),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    requires_plot: bool,
    #[serde(default)]
    exercise: Option<ExerciseSpec>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    #[serde(flatten)]
    outcome: ExecutionOutcome,
    friendly_error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt_id: Option<Uuid>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/execute", post(execute))
        .route("/v1/exercises/{id}/attempts", get(recent_attempts))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render_prometheus())
}

async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<Json<ExecuteResponse>> {
    let user_id = authenticate(&state.api_keys, &headers)?;

    let Json(request) =
        payload.map_err(|_| ApiError::InvalidRequest("Invalid request body".to_string()))?;
    let code = request
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("Code is required".to_string()))?;

    if validate(&code).is_ok() {
        state
            .quota
            .charge(&user_id)
            .map_err(|retry_after| ApiError::RateLimited { retry_after })?;
    }

    let options = ExecuteOptions {
        requires_plot: request.requires_plot
            || request.exercise.as_ref().is_some_and(|e| e.requires_plot),
    };

    state.metrics.started();
    let result = state
        .client
        .execute_code_until(&code, options, tokio::time::sleep(state.execution_deadline))
        .await;
    state.metrics.finished(result.as_ref());
    let outcome = ExecutionOutcome::from(result?);

    let attempt = match &request.exercise {
        Some(exercise) => {
            let attempt = state
                .grader
                .grade_and_record(&user_id, exercise, &code, &outcome)
                .await?;
            state.metrics.graded(attempt.correct);
            Some(attempt)
        }
        None => None,
    };

    let hint = outcome.result.stderr.as_deref().and_then(friendly_error);
    Ok(Json(ExecuteResponse {
        friendly_error: hint,
        correct: attempt.as_ref().map(|a| a.correct),
        attempt_id: attempt.as_ref().map(|a| a.id),
        outcome,
    }))
}

async fn recent_attempts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(exercise_id): Path<i64>,
) -> ApiResult<Json<Vec<GradedAttempt>>> {
    let user_id = authenticate(&state.api_keys, &headers)?;
    let attempts = state
        .grader
        .store()
        .recent(&user_id, exercise_id, RECENT_ATTEMPTS_LIMIT)
        .await?;
    Ok(Json(attempts))
}

fn authenticate(api_keys: &HashMap<String, String>, headers: &HeaderMap) -> ApiResult<String> {
    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    for (candidate_key, user_id) in api_keys {
        if constant_time_eq(key.as_bytes(), candidate_key.as_bytes()) {
            return Ok(user_id.clone());
        }
    }
    Err(ApiError::Unauthorized)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut out = 0u8;
    for (l, r) in a.iter().zip(b.iter()) {
        out |= l ^ r;
    }
    out == 0
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::JudgeConfig,
        grading::InMemoryAttemptStore,
        judge::{
            ExecutionResult, JudgeStatus,
            client::tests::{ScriptedTransport, fast_settings, result_with_status},
        },
    };

    fn config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            api_keys: HashMap::from([("k-alice".to_string(), "alice".to_string())]),
            rate_limit_per_minute: 60,
            rate_limit_burst: 10,
            persistence_path: None::<PathBuf>,
            execution_deadline: Duration::from_secs(5),
            judge: JudgeConfig {
                base_url: "http://judge.invalid".to_string(),
                api_key: None,
                request_timeout: Duration::from_secs(1),
                client: fast_settings(),
            },
        }
    }

    fn app(transport: Arc<ScriptedTransport>) -> (Router, Arc<MetricsRegistry>) {
        app_with(config(), transport)
    }

    fn app_with(
        config: AppConfig,
        transport: Arc<ScriptedTransport>,
    ) -> (Router, Arc<MetricsRegistry>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let state = AppState::new(
            &config,
            ExecutionClient::new(transport, config.judge.client.clone()),
            Grader::new(Arc::new(InMemoryAttemptStore::new(None))),
            metrics.clone(),
        );
        (routes(state), metrics)
    }

    fn post_execute(body: Value) -> Request<Body> {
        Request::post("/v1/execute")
            .header("content-type", "application/json")
            .header("x-api-key", "k-alice")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_api_key() {
        let (app, _) = app(Arc::new(ScriptedTransport::default()));
        let response = app
            .oneshot(
                Request::post("/v1/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"code":"disp(1)"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_code_is_bad_request() {
        let (app, _) = app(Arc::new(ScriptedTransport::default()));
        let response = app.oneshot(post_execute(json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Code is required");
    }

    #[tokio::test]
    async fn validation_failure_is_a_normal_response() {
        let transport = Arc::new(ScriptedTransport::default());
        let (app, _) = app(transport.clone());

        let response = app
            .oneshot(post_execute(json!({ "code": "unix('id')" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"]["id"], -1);
        assert_eq!(body["status"]["description"], "Validation Error");
        assert!(body["stderr"].as_str().unwrap().contains("forbidden"));
        assert!(transport.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn graded_plot_exercise_returns_image_and_verdict() {
        let mut finished = result_with_status(3);
        finished.stdout =
            Some("peak at 3\n__PLOT_BASE64_START__\nQUJD\n__PLOT_BASE64_END__\n".to_string());
        let transport = Arc::new(ScriptedTransport::with_responses([
            result_with_status(1),
            finished,
        ]));
        let (app, metrics) = app(transport.clone());

        let response = app
            .clone()
            .oneshot(post_execute(json!({
                "code": "plot([1 3 2])",
                "exercise": { "id": 12, "test_cases": [], "requires_plot": true }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["stdout"], "peak at 3");
        assert_eq!(body["plot_image"], "data:image/png;base64,QUJD");
        assert_eq!(body["correct"], true);
        assert!(body["attempt_id"].is_string());
        assert!(transport.submitted.lock().unwrap()[0].contains("figure(\"visible\", \"off\")"));

        let attempts = app
            .oneshot(
                Request::get("/v1/exercises/12/attempts")
                    .header("x-api-key", "k-alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let attempts = json_body(attempts).await;
        assert_eq!(attempts.as_array().unwrap().len(), 1);
        assert_eq!(attempts[0]["output"], "peak at 3");
        assert_eq!(attempts[0]["user_id"], "alice");

        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("attempts_correct_total 1\n"));
    }

    #[tokio::test]
    async fn runtime_error_gets_friendly_hint_and_fails_grading() {
        let transport = Arc::new(ScriptedTransport::with_responses([ExecutionResult {
            stdout: None,
            stderr: Some("error: 'y' undefined\n".to_string()),
            compile_output: None,
            status: JudgeStatus {
                id: 11,
                description: "Runtime Error (NZEC)".to_string(),
            },
            time: Some("0.01".to_string()),
            memory: Some(1024),
        }]));
        let (app, _) = app(transport);

        let response = app
            .oneshot(post_execute(json!({
                "code": "x = y + 1",
                "exercise": { "id": 3 }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["correct"], false);
        assert!(body["friendly_error"].as_str().unwrap().contains("doesn't exist"));
    }

    #[tokio::test]
    async fn judge_timeout_maps_to_gateway_timeout() {
        let transport = Arc::new(ScriptedTransport::default());
        let (app, metrics) = app(transport);

        let response = app
            .oneshot(post_execute(json!({ "code": "pause(100)" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("timed out"));
        assert!(metrics.render_prometheus().contains("execution_timed_out_total 1\n"));
    }

    #[tokio::test]
    async fn only_submissions_reaching_the_judge_use_quota() {
        let transport = Arc::new(ScriptedTransport::with_responses([result_with_status(3)]));
        let (app, _) = app_with(
            AppConfig {
                rate_limit_per_minute: 1,
                rate_limit_burst: 1,
                ..config()
            },
            transport.clone(),
        );

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(post_execute(json!({ "code": "system('ls')" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let accepted = app
            .clone()
            .oneshot(post_execute(json!({ "code": "disp(1)" })))
            .await
            .unwrap();
        assert_eq!(accepted.status(), StatusCode::OK);

        let limited = app
            .oneshot(post_execute(json!({ "code": "disp(2)" })))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()["retry-after"], "60");
        assert_eq!(transport.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn judge_client_error_maps_to_bad_gateway() {
        let transport = Arc::new(ScriptedTransport {
            submit_error: Some(503),
            ..ScriptedTransport::default()
        });
        let (app, _) = app(transport);

        let response = app
            .oneshot(post_execute(json!({ "code": "disp(1)" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
