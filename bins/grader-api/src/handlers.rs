// HTTP route handlers for the Grader API

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use grader_common::types::{GradeResponse, Verdict};
use grader_engine::executor::grade_payload;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::metrics;
use crate::AppState;

/// POST /grade - Grade a submission synchronously
///
/// The raw body is decoded by the engine so that a malformed request still gets
/// an ERROR verdict instead of a 4xx.
pub async fn grade(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let _guard = state.grading.lock().await;
    let config = state.config.clone();
    let start = Instant::now();

    let response = match tokio::task::spawn_blocking(move || grade_payload(&body, &config)).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Grading task failed");
            let response: GradeResponse = Verdict::error(format!("Grading task failed: {}", e)).into();
            metrics::observe_run(response.status, start.elapsed());
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response();
        }
    };

    metrics::observe_run(response.status, start.elapsed());
    info!(
        status = %response.status,
        failed_case = response.failed_case_no,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Grade request served"
    );

    (StatusCode::OK, Json(response)).into_response()
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics() -> Response {
    match metrics::render() {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_engine::config::GraderConfig;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    fn make_state() -> Arc<AppState> {
        Arc::new(AppState {
            config: Arc::new(GraderConfig::default()),
            grading: Mutex::new(()),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_grade_passes() {
        let request = json!({
            "functionName": "add",
            "functionArgs": ["a", "b"],
            "functionBody": "a + b",
            "testCases": [{"input": [2, 3], "output": 5}]
        });

        let response = grade(State(make_state()), Bytes::from(request.to_string())).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["STATUS"], "PASSED");
        assert_eq!(body["failedCaseNo"], -1);
        assert_eq!(body["results"][0]["output"], 5);
    }

    #[tokio::test]
    async fn test_malformed_body_is_error_verdict() {
        let response = grade(State(make_state()), Bytes::from_static(b"[1, 2")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["STATUS"], "ERROR");
        assert_eq!(body["results"], json!([]));
        assert!(body["message"].as_str().unwrap().starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_metrics_count_runs() {
        let request = json!({
            "functionName": "f",
            "functionArgs": [],
            "functionBody": "1",
            "testCases": [{"input": [], "output": 2}]
        });
        grade(State(make_state()), Bytes::from(request.to_string())).await;

        let response = metrics().await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("grader_runs_total{status=\"FAILED\"}"), "{}", text);
        assert!(text.contains("grader_run_duration_seconds"));
    }
}
