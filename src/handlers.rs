use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::connectivity::ConnectivityMonitor;
use crate::errors::AppError;
use crate::execution::ActionExecutionService;
use crate::models::{
    BoardFilters, ExecuteActionRequest, QuickActionRequest, StageChangeRequest, SuggestionRequest,
};
use crate::offline_queue::{GatewayReplayer, OfflineQueueService};
use crate::pipeline::PipelineBoard;
use crate::suggestions;

/// Shared application state.
pub struct AppState {
    pub board: PipelineBoard,
    pub execution: ActionExecutionService<GatewayReplayer>,
    pub queue: Arc<OfflineQueueService<GatewayReplayer>>,
    pub connectivity: Arc<ConnectivityMonitor>,
}

/// API routes. Middleware (rate limit, body limit, tracing, CORS) is layered
/// on in `main`; the plain router is reused by the integration tests.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/pipeline/board", get(get_board))
        .route(
            "/api/v1/pipeline/opportunities/:id/stage",
            post(change_stage),
        )
        .route(
            "/api/v1/pipeline/opportunities/:id/quick-action",
            post(quick_action),
        )
        .route("/api/v1/contacts/suggestions", post(suggest_actions))
        .route("/api/v1/contacts/swipe-actions", post(swipe_actions))
        .route("/api/v1/contacts/actions/execute", post(execute_action))
        .route("/api/v1/offline-queue", get(get_offline_queue))
        .route("/api/v1/offline-queue/process", post(process_offline_queue))
        .with_state(state)
}

/// Health check endpoint; also reports CRM connectivity.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "crm_online": state.connectivity.is_online(),
    }))
}

/// `GET /api/v1/pipeline/board` with `search`, `assignee`, `status`, `limit`.
///
/// Served from the validated response cache when fresh.
async fn get_board(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<BoardFilters>,
) -> Result<Response, AppError> {
    let body = state.board.board_json(&filters).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// `POST /api/v1/pipeline/opportunities/:id/stage` — drag transition.
async fn change_stage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<StageChangeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.board.apply_stage_change(id, request.to_stage).await?;
    Ok(Json(response))
}

/// `POST /api/v1/pipeline/opportunities/:id/quick-action` — won / lost /
/// reactivate.
async fn quick_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<QuickActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.board.apply_quick_action(id, request.action).await?;
    Ok(Json(response))
}

/// `POST /api/v1/contacts/suggestions` — ranked quick actions for a contact.
async fn suggest_actions(Json(request): Json<SuggestionRequest>) -> impl IntoResponse {
    let intelligence = request.intelligence.unwrap_or_default();
    Json(suggestions::suggested_actions(&request.contact, &intelligence))
}

/// `POST /api/v1/contacts/swipe-actions` — left/right gesture bindings.
async fn swipe_actions(Json(request): Json<SuggestionRequest>) -> impl IntoResponse {
    let intelligence = request.intelligence.unwrap_or_default();
    Json(suggestions::swipe_actions(&request.contact, &intelligence))
}

/// `POST /api/v1/contacts/actions/execute`.
///
/// Execution failures come back as `success: false` with HTTP 200; only
/// storage faults surface as errors.
async fn execute_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .execution
        .execute(&request.action, &request.contact)
        .await?;
    Ok(Json(result))
}

/// `GET /api/v1/offline-queue` — pending queued actions, oldest first.
async fn get_offline_queue(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.queue.queue()?))
}

/// `POST /api/v1/offline-queue/process` — manual drain trigger.
async fn process_offline_queue(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.queue.process().await?;
    Ok(Json(report))
}
