// HTTP handlers for the dispatcher API
// Thin translation layer: parse the request, hand it to the dispatcher,
// shape the RouteResult back into the frontend's envelope.

use axum::{
    extract::{Query as QueryParams, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Query, QueryContext};
use crate::router::QueryDispatcher;
use crate::DispatchError;

/// Shared application state.
#[derive(Clone)]
pub struct DispatcherState {
    pub dispatcher: Arc<QueryDispatcher>,
}

/// Inbound query request, as the assistant frontend sends it.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub user_id: i64,
    pub role: String,
    pub conversation_id: Option<Uuid>,
}

impl QueryRequest {
    fn into_query(self) -> crate::Result<Query> {
        let mut context = QueryContext::new(self.user_id, self.role);
        if let Some(id) = self.conversation_id {
            context = context.with_conversation(id);
        }
        Query::new(self.query, context)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

fn bad_request(message: String) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            success: false,
            message,
        }),
    )
}

/// POST /api/ai/query
pub async fn dispatch_query(
    State(state): State<DispatcherState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let query = match request.into_query() {
        Ok(query) => query,
        Err(DispatchError::InvalidInput(message)) => return bad_request(message).into_response(),
        Err(e) => return bad_request(e.to_string()).into_response(),
    };
    let result = state.dispatcher.route_query(query).await;
    Json(result).into_response()
}

/// POST /api/ai/route-test
///
/// Dry run: reports where a query would be routed without executing anything.
pub async fn route_test(
    State(state): State<DispatcherState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let query = match request.into_query() {
        Ok(query) => query,
        Err(e) => return bad_request(e.to_string()).into_response(),
    };
    Json(state.dispatcher.explain(&query)).into_response()
}

/// GET /api/ai/templates
pub async fn list_templates(State(state): State<DispatcherState>) -> impl IntoResponse {
    Json(state.dispatcher.templates().to_vec())
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub q: String,
}

/// GET /api/ai/suggestions?q=学生
pub async fn suggestions(
    State(state): State<DispatcherState>,
    QueryParams(params): QueryParams<SuggestionParams>,
) -> impl IntoResponse {
    Json(state.dispatcher.suggestions(&params.q))
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
    #[serde(flatten)]
    pub stats: crate::stats::StatsSnapshot,
    pub cache_entries: usize,
}

/// GET /api/ai/stats
pub async fn stats(State(state): State<DispatcherState>) -> impl IntoResponse {
    Json(StatsBody {
        stats: state.dispatcher.stats(),
        cache_entries: state.dispatcher.cache_len(),
    })
}

#[derive(Debug, Deserialize, Default)]
pub struct CleanupRequest {
    #[serde(default)]
    pub clear_all: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
    pub remaining: usize,
}

/// POST /api/ai/cache/cleanup
pub async fn cleanup_cache(
    State(state): State<DispatcherState>,
    Json(request): Json<CleanupRequest>,
) -> impl IntoResponse {
    let removed = state.dispatcher.cleanup_cache(request.clear_all);
    Json(CleanupResponse {
        removed,
        remaining: state.dispatcher.cache_len(),
    })
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "kinderquery",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            message: "not found".to_string(),
        }),
    )
}
