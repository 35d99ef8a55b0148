use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use compliance_core::{
    CompletionBackend, CompletionClient, GuidanceSource, InMemorySessionStore, Report,
    ReportStatus, SessionStore, WeaviateRetriever, WebhookPayload, flatten_transcript,
    report::generate_report,
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use uuid::Uuid;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<dyn SessionStore<Report>>,
    pub completion: Arc<dyn CompletionBackend>,
    pub retrieval: Arc<dyn GuidanceSource>,
}

pub fn create_app() -> anyhow::Result<Router> {
    let completion = CompletionClient::from_env()?;
    let retrieval = WeaviateRetriever::from_env()?;
    let state = AppState {
        reports: Arc::new(InMemorySessionStore::new()),
        completion: Arc::new(completion),
        retrieval: Arc::new(retrieval),
    };
    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/intake", post(intake))
        .route("/report/{session_id}", get(get_report))
        .layer(from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    request.headers_mut().insert(
        "x-correlation-id",
        HeaderValue::from_str(&correlation_id).unwrap(),
    );

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn intake(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Value> {
    let transcript_text = flatten_transcript(&payload.data.transcript);

    let session_id = match state.reports.create(Report::processing()).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "failed to create report session");
            return Err(internal_error(
                "failed to create report session",
                &e.to_string(),
            ));
        }
    };

    info!(
        session_id = %session_id,
        event = %payload.event,
        conversation_id = %payload.data.id,
        "intake accepted, starting background analysis"
    );

    tokio::spawn(run_analysis(
        state.clone(),
        session_id.clone(),
        transcript_text,
    ));

    Ok(Json(json!({ "session_id": session_id })))
}

/// Background fan-out for one session. The finished report, or its failure,
/// is recorded with a single store update, so readers only ever observe
/// `processing` or a finished state.
async fn run_analysis(state: AppState, session_id: String, transcript: String) {
    let report = match generate_report(
        state.completion.as_ref(),
        state.retrieval.as_ref(),
        &transcript,
    )
    .await
    {
        Ok(report) => report,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "report generation failed");
            Report::failed(e.to_string())
        }
    };

    if let Err(e) = state.reports.put(&session_id, report).await {
        error!(session_id = %session_id, error = %e, "failed to store finished report");
    }
}

async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    match state.reports.get(&session_id).await {
        Ok(Some(report)) => {
            if report.status == ReportStatus::Processing {
                return Ok(Json(json!({ "status": "processing" })));
            }
            match serde_json::to_value(&report) {
                Ok(value) => Ok(Json(value)),
                Err(e) => Err(internal_error("failed to serialize report", &e.to_string())),
            }
        }
        Ok(None) => {
            info!(session_id = %session_id, "session not found");
            Err(not_found_error("Session not found", &session_id))
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "failed to load report");
            Err(internal_error("failed to load report", &e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use compliance_core::{
        ANNEX_TOPICS, ComplianceError, ConversationData, PromptRequest, Result as CoreResult,
        TranscriptMessage,
    };
    use std::time::Duration;

    struct StubCompletion;

    #[async_trait]
    impl CompletionBackend for StubCompletion {
        async fn complete(&self, request: &PromptRequest) -> CoreResult<String> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if request.response_format.is_some() {
                Ok(r#"{"risk_level": "medium", "justification": "limited scope"}"#.to_string())
            } else {
                Ok("stub summary".to_string())
            }
        }
    }

    struct StubGuidance;

    #[async_trait]
    impl GuidanceSource for StubGuidance {
        async fn guidance(&self, topic: &str, _transcript: &str) -> CoreResult<String> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(format!("guidance on {topic}"))
        }
    }

    struct FailingGuidance;

    #[async_trait]
    impl GuidanceSource for FailingGuidance {
        async fn guidance(&self, _topic: &str, _transcript: &str) -> CoreResult<String> {
            Err(ComplianceError::UpstreamTransport(
                "vector search unreachable".to_string(),
            ))
        }
    }

    fn test_state(retrieval: Arc<dyn GuidanceSource>) -> AppState {
        AppState {
            reports: Arc::new(InMemorySessionStore::new()),
            completion: Arc::new(StubCompletion),
            retrieval,
        }
    }

    fn payload() -> WebhookPayload {
        WebhookPayload {
            event: "conversation.completed".to_string(),
            data: ConversationData {
                id: "conv-1".to_string(),
                agent_id: "agent-1".to_string(),
                transcript: vec![TranscriptMessage {
                    role: "user".to_string(),
                    content: "we screen resumes with ML".to_string(),
                }],
            },
        }
    }

    async fn poll_until_finished(state: &AppState, session_id: &str) -> Value {
        for _ in 0..100 {
            let Json(body) = get_report(State(state.clone()), Path(session_id.to_string()))
                .await
                .unwrap();
            if body["status"] != "processing" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("report for {session_id} never finished");
    }

    #[tokio::test]
    async fn report_is_processing_until_fanout_completes() {
        let state = test_state(Arc::new(StubGuidance));

        let Json(created) = intake(State(state.clone()), Json(payload())).await.unwrap();
        let session_id = created["session_id"].as_str().unwrap().to_string();

        // the fan-out has not had a chance to finish yet
        let Json(early) = get_report(State(state.clone()), Path(session_id.clone()))
            .await
            .unwrap();
        assert_eq!(early, json!({"status": "processing"}));

        let finished = poll_until_finished(&state, &session_id).await;
        assert_eq!(finished["status"], "complete");
        assert_eq!(finished["summary"], "stub summary");
        assert_eq!(finished["risk_assessment"]["risk_level"], "medium");
        assert_eq!(
            finished["annex_reports"].as_object().unwrap().len(),
            ANNEX_TOPICS.len()
        );
    }

    #[tokio::test]
    async fn failed_fanout_is_reported_as_failed() {
        let state = test_state(Arc::new(FailingGuidance));

        let Json(created) = intake(State(state.clone()), Json(payload())).await.unwrap();
        let session_id = created["session_id"].as_str().unwrap().to_string();

        let finished = poll_until_finished(&state, &session_id).await;
        assert_eq!(finished["status"], "failed");
        assert!(finished["error"].as_str().unwrap().contains("vector search"));
        assert!(finished.get("summary").is_none());
        assert!(finished.get("annex_reports").is_none());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = test_state(Arc::new(StubGuidance));

        let err = get_report(State(state), Path("missing".to_string()))
            .await
            .err()
            .unwrap();

        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
