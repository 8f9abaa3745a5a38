//! REST API handlers for suite control and operational endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chatprobe_core::config::SuiteDefaults;
use chatprobe_core::types::{Persona, ScenarioCategory, TestSuiteConfig};
use chatprobe_core::ProbeError;
use chatprobe_orchestrator::{SuiteService, TestState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SuiteService>,
    pub defaults: SuiteDefaults,
    pub node_id: String,
    pub start_time: Instant,
}

/// Body of `POST /v1/tests`. Omitted turn and delay settings fall back to
/// the configured suite defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub number_of_conversations: u32,
    #[serde(default)]
    pub max_turns_per_conversation: Option<u32>,
    #[serde(default)]
    pub delay_between_turns_ms: Option<u64>,
    #[serde(default)]
    pub delay_between_conversations_ms: Option<u64>,
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub categories: Vec<ScenarioCategory>,
    #[serde(default)]
    pub seed_prompt: Option<String>,
}

impl StartTestRequest {
    pub fn into_config(self, defaults: &SuiteDefaults) -> TestSuiteConfig {
        TestSuiteConfig {
            name: self.name,
            number_of_conversations: self.number_of_conversations,
            max_turns_per_conversation: self
                .max_turns_per_conversation
                .unwrap_or(defaults.max_turns_per_conversation),
            delay_between_turns_ms: self
                .delay_between_turns_ms
                .unwrap_or(defaults.delay_between_turns_ms),
            delay_between_conversations_ms: self
                .delay_between_conversations_ms
                .unwrap_or(defaults.delay_between_conversations_ms),
            personas: self.personas,
            categories: self.categories,
            seed_prompt: self.seed_prompt,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestResponse {
    pub test_id: Uuid,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

fn internal_error(e: ProbeError) -> ApiError {
    error!(error = %e, "Suite registry operation failed");
    metrics::counter!("api.errors").increment(1);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal processing error",
    )
}

fn not_found(test_id: Uuid) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        "test_not_found",
        format!("no active test with id {test_id}"),
    )
}

/// POST /v1/tests: start a suite in the background.
pub async fn start_test(
    State(state): State<AppState>,
    Json(request): Json<StartTestRequest>,
) -> Result<(StatusCode, Json<StartTestResponse>), ApiError> {
    let config = request.into_config(&state.defaults);

    match state.service.start(config).await {
        Ok(test_id) => Ok((StatusCode::ACCEPTED, Json(StartTestResponse { test_id }))),
        Err(ProbeError::Configuration(msg)) => {
            warn!(error = %msg, "Suite configuration rejected");
            metrics::counter!("api.validation_errors").increment(1);
            Err(api_error(StatusCode::BAD_REQUEST, "invalid_configuration", msg))
        }
        Err(e) => Err(internal_error(e)),
    }
}

/// GET /v1/tests/:id: current state of a tracked suite.
pub async fn get_status(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> Result<Json<TestState>, ApiError> {
    match state.service.status(test_id).await {
        Ok(Some(test_state)) => Ok(Json(test_state)),
        Ok(None) => Err(not_found(test_id)),
        Err(e) => Err(internal_error(e)),
    }
}

/// DELETE /v1/tests/:id: cancel a suite and stop tracking it.
pub async fn stop_test(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    match state.service.stop(test_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(not_found(test_id)),
        Err(e) => Err(internal_error(e)),
    }
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /live: Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
