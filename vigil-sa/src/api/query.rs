//! Query API handlers
//!
//! POST /query, GET /query/suggestions

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use vigil_common::types::QueryAnswer;

use crate::error::{ApiError, ApiResult};
use crate::query::QueryEngine;
use crate::AppState;

/// Longest accepted question, in characters
const MAX_QUESTION_CHARS: usize = 2000;

/// POST /query request
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// GET /query/suggestions response
#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub questions: Vec<String>,
}

/// POST /query
///
/// Answer a question from the current snapshot. Always 200 with an
/// answer body; an ungrounded answer signals that no snapshot exists.
pub async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryAnswer>> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("Question must not be empty".to_string()));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Question exceeds {} characters",
            MAX_QUESTION_CHARS
        )));
    }

    let engine = state.query_engine()?;
    let snapshot = state.orchestrator()?.snapshot().await;

    let answer = engine.answer(question, snapshot.as_deref()).await;
    Ok(Json(answer))
}

/// GET /query/suggestions
///
/// Suggested questions, tailored to the current snapshot when one
/// exists. Available even before the first run.
pub async fn query_suggestions(
    State(state): State<AppState>,
) -> ApiResult<Json<SuggestionsResponse>> {
    let snapshot = match state.orchestrator() {
        Ok(orchestrator) => orchestrator.snapshot().await,
        Err(_) => None,
    };

    Ok(Json(SuggestionsResponse {
        questions: QueryEngine::suggested_questions(snapshot.as_deref()),
    }))
}

/// Build query routes
pub fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/query", post(submit_query))
        .route("/query/suggestions", get(query_suggestions))
}
