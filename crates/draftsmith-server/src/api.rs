//! HTTP routes and error mapping.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use draftsmith_core::{
    ExecutionPlan, ExecutionPlanner, Intent, IntentResolver, PlanConstraints, ResolveError,
    StageContext, StageInput, StageName, StageOutcome, StageResult, TaskStore,
};
use draftsmith_runtime::StageRegistry;
use draftsmith_stores::{TaskEvent, TaskNotifier};

/// Inputs shorter than this are rejected before classification.
const MIN_INPUT_LEN: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<IntentResolver>,
    pub planner: ExecutionPlanner,
    pub store: Arc<dyn TaskStore>,
    pub notifier: Arc<dyn TaskNotifier>,
    pub registry: Arc<StageRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks/intent", post(resolve_intent))
        .route("/tasks/confirm", post(confirm_task))
        .route("/tasks/{id}", get(get_task))
        .route("/subtasks/{stage_name}", post(run_subtask))
        .with_state(state)
}

/// API errors, mapped to status codes with a JSON `{code, message}` body.
#[derive(Debug)]
pub enum ApiError {
    InvalidArgument(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::InvalidArgument(m) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_argument", m)
            }
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", m),
        };
        (
            status,
            Json(ErrorBody {
                code: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<draftsmith_core::StoreError> for ApiError {
    fn from(err: draftsmith_core::StoreError) -> Self {
        use draftsmith_core::StoreError;
        match err {
            StoreError::NotFound(id) => ApiError::NotFound(format!("task not found: {id}")),
            StoreError::IllegalTransition { .. } | StoreError::Terminal(_) => {
                ApiError::Conflict(err.to_string())
            }
            StoreError::Internal(m) => ApiError::Internal(m),
        }
    }
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct IntentRequest {
    user_input: String,
    #[serde(default)]
    constraints: PlanConstraints,
    #[serde(default)]
    context: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
struct IntentResponse {
    intent: Intent,
    execution_plan: ExecutionPlan,
    ready_to_execute: bool,
}

async fn resolve_intent(
    State(state): State<AppState>,
    Json(payload): Json<IntentRequest>,
) -> Result<Json<IntentResponse>, ApiError> {
    if payload.user_input.trim().len() < MIN_INPUT_LEN {
        return Err(ApiError::InvalidArgument(format!(
            "user_input must be at least {MIN_INPUT_LEN} characters"
        )));
    }

    let intent = state
        .resolver
        .resolve(&payload.user_input, &payload.context)
        .await
        .map_err(|e: ResolveError| ApiError::InvalidArgument(e.to_string()))?;
    let execution_plan = state.planner.plan(&intent, &payload.constraints);
    let ready_to_execute = !intent.requires_confirmation;

    Ok(Json(IntentResponse {
        intent,
        execution_plan,
        ready_to_execute,
    }))
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    intent: Intent,
    execution_plan: ExecutionPlan,
    #[serde(default)]
    user_confirmed: bool,
}

#[derive(Debug, Serialize)]
struct ConfirmResponse {
    task_id: String,
    status: String,
}

async fn confirm_task(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<ConfirmResponse>), ApiError> {
    if !payload.user_confirmed {
        return Err(ApiError::Conflict(
            "task was not confirmed by the user".to_string(),
        ));
    }
    payload
        .execution_plan
        .validate()
        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?;

    let task_id = state
        .store
        .create(payload.intent, payload.execution_plan)
        .await?;
    state
        .notifier
        .publish(TaskEvent::created(task_id.as_str()))
        .await?;
    info!(task_id = %task_id, "task accepted");

    Ok((
        StatusCode::CREATED,
        Json(ConfirmResponse {
            task_id,
            status: "pending".to_string(),
        }),
    ))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<draftsmith_core::Task>, ApiError> {
    match state.store.get(&id).await? {
        Some(task) => Ok(Json(task)),
        None => Err(ApiError::NotFound(format!("task not found: {id}"))),
    }
}

#[derive(Debug, Deserialize)]
struct SubtaskRequest {
    #[serde(default)]
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct SubtaskResponse {
    id: String,
    #[serde(flatten)]
    result: StageResult,
}

async fn run_subtask(
    State(state): State<AppState>,
    Path(stage_name): Path<String>,
    Json(payload): Json<SubtaskRequest>,
) -> Result<Json<SubtaskResponse>, ApiError> {
    let stage: StageName = stage_name
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown stage: {stage_name}")))?;
    let runner = state
        .registry
        .get(stage)
        .ok_or_else(|| ApiError::NotFound(format!("no runner registered for stage {stage}")))?;

    let subtask_id = format!("sub-{}", uuid::Uuid::new_v4());
    let input = StageInput::new(payload.parameters);
    let started = Instant::now();
    let outcome = runner.run(input, StageContext::new(subtask_id.clone())).await;
    let elapsed = started.elapsed().as_millis() as u64;

    let result = match outcome {
        StageOutcome::Success {
            output,
            tokens_used,
            model_used,
        } => StageResult::completed(stage, output, elapsed).with_usage(tokens_used, model_used),
        StageOutcome::Retryable { message, .. } | StageOutcome::Fatal { message } => {
            StageResult::failed(stage, message, elapsed)
        }
    };
    info!(subtask_id = %subtask_id, stage = %stage, status = ?result.status, "subtask finished");
    Ok(Json(SubtaskResponse {
        id: subtask_id,
        result,
    }))
}
