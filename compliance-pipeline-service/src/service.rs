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
    CompletionClient, InMemorySessionStore, SessionStore, WebhookPayload, flatten_transcript,
    prompts,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::relay;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

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
    pub transcripts: Arc<dyn SessionStore<String>>,
    pub completion: Arc<CompletionClient>,
}

#[derive(Debug, Deserialize)]
pub struct RiskRequest {
    pub legal_assessment: String,
}

pub fn create_app() -> anyhow::Result<Router> {
    let completion = CompletionClient::from_env()?;
    let state = AppState {
        transcripts: Arc::new(InMemorySessionStore::new()),
        completion: Arc::new(completion),
    };
    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/intake", post(intake))
        .route("/stream_summary/{session_id}", post(stream_summary))
        .route(
            "/stream_legal_assessment/{session_id}",
            post(stream_legal_assessment),
        )
        .route(
            "/stream_risk_assessment/{session_id}",
            post(stream_risk_assessment),
        )
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

    let session_id = match state.transcripts.create(transcript_text).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "failed to store transcript");
            return Err(internal_error("failed to store transcript", &e.to_string()));
        }
    };

    info!(
        session_id = %session_id,
        event = %payload.event,
        conversation_id = %payload.data.id,
        messages = payload.data.transcript.len(),
        "intake stored transcript"
    );

    Ok(Json(json!({
        "session_id": session_id,
        "redirect_url": format!("/report/{session_id}")
    })))
}

async fn lookup_transcript(state: &AppState, session_id: &str) -> Result<String, ApiError> {
    match state.transcripts.get(session_id).await {
        Ok(Some(transcript)) => Ok(transcript),
        Ok(None) => {
            info!(session_id = %session_id, "session not found");
            Err(not_found_error("Session not found", session_id))
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "failed to load session");
            Err(internal_error("failed to load session", &e.to_string()))
        }
    }
}

async fn stream_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let transcript = lookup_transcript(&state, &session_id).await?;
    info!(session_id = %session_id, "streaming summary");

    let request = prompts::summary_prompt(&transcript);
    Ok(relay::plain_response(state.completion.stream(request)))
}

async fn stream_legal_assessment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let transcript = lookup_transcript(&state, &session_id).await?;
    info!(session_id = %session_id, "streaming legal assessment");

    let request = prompts::legal_assessment_prompt(&transcript);
    Ok(relay::event_stream_response(state.completion.stream(request)))
}

/// Stage input is supplied by the caller rather than read back from the
/// store; every invocation is a fresh upstream call with no deduplication.
async fn stream_risk_assessment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<RiskRequest>,
) -> Result<Response, ApiError> {
    if request.legal_assessment.trim().is_empty() {
        return Err(bad_request_error("Legal assessment text cannot be empty."));
    }
    info!(session_id = %session_id, "streaming risk assessment");

    let prompt = prompts::risk_assessment_prompt(&request.legal_assessment);
    Ok(relay::event_stream_response(state.completion.stream(prompt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_core::{ConversationData, TranscriptMessage};

    fn test_state() -> AppState {
        let completion = CompletionClient::new(
            "http://127.0.0.1:9/v1".to_string(),
            "test-key".to_string(),
            "test-model".to_string(),
        )
        .unwrap();

        AppState {
            transcripts: Arc::new(InMemorySessionStore::new()),
            completion: Arc::new(completion),
        }
    }

    fn payload() -> WebhookPayload {
        WebhookPayload {
            event: "conversation.completed".to_string(),
            data: ConversationData {
                id: "conv-1".to_string(),
                agent_id: "agent-1".to_string(),
                transcript: vec![
                    TranscriptMessage {
                        role: "user".to_string(),
                        content: "hi".to_string(),
                    },
                    TranscriptMessage {
                        role: "agent".to_string(),
                        content: "hello".to_string(),
                    },
                ],
            },
        }
    }

    #[tokio::test]
    async fn intake_stores_flattened_transcript() {
        let state = test_state();

        let Json(body) = intake(State(state.clone()), Json(payload())).await.unwrap();
        let session_id = body["session_id"].as_str().unwrap().to_string();
        assert_eq!(
            body["redirect_url"],
            format!("/report/{session_id}")
        );

        let stored = state.transcripts.get(&session_id).await.unwrap();
        assert_eq!(stored.as_deref(), Some("user: hi\nagent: hello"));
    }

    #[tokio::test]
    async fn intake_issues_fresh_session_ids() {
        let state = test_state();

        let Json(first) = intake(State(state.clone()), Json(payload())).await.unwrap();
        let Json(second) = intake(State(state), Json(payload())).await.unwrap();

        assert_ne!(first["session_id"], second["session_id"]);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = test_state();

        let err = stream_summary(State(state), Path("missing".to_string()))
            .await
            .err()
            .unwrap();

        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_legal_assessment_is_bad_request() {
        let state = test_state();

        let err = stream_risk_assessment(
            State(state),
            Path("any".to_string()),
            Json(RiskRequest {
                legal_assessment: "   ".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();

        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
