//! HTTP request handlers

use super::error::{ApiError, ApiResult};
use super::server::AppState;
use crate::comment::{decode_value, Comment};
use crate::pipeline::{CancelSummary, PipelineStatus, SubmitOutcome};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "chatcast-responder".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<PipelineStatus> {
    Json(state.controller.status())
}

/// Direct submission body
#[derive(Debug, Deserialize)]
pub struct CommentSubmission {
    pub text: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmittedComment {
    pub comment_id: String,
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub comments: Vec<SubmittedComment>,
}

/// POST /comments
///
/// Accepts `{text, author_name?, id?}` or an aggregator message. Comments in
/// one aggregator message are submitted in their listed order.
pub async fn post_comments(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<SubmitResponse>> {
    let comments = if body.get("text").is_some() {
        let submission: CommentSubmission = serde_json::from_value(body)
            .map_err(|e| ApiError::BadRequest(format!("invalid comment: {}", e)))?;
        let author = submission
            .author_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| state.default_author.clone());

        let mut comment = Comment::new(submission.text, author);
        if let Some(id) = submission.id.filter(|id| !id.is_empty()) {
            comment = comment.with_id(id);
        }
        vec![comment]
    } else {
        decode_value(body, &state.default_author)?
    };
    debug!(count = comments.len(), "Comments submitted over HTTP");

    let mut submitted = Vec::with_capacity(comments.len());
    for comment in comments {
        let comment_id = comment.id.clone();
        let outcome = state.controller.submit(comment);
        if outcome == SubmitOutcome::ShutDown {
            return Err(ApiError::Unavailable("pipeline is shutting down".to_string()));
        }
        submitted.push(SubmittedComment { comment_id, outcome });
    }

    Ok(Json(SubmitResponse { comments: submitted }))
}

/// POST /cancel/requests
pub async fn cancel_requests(State(state): State<AppState>) -> Json<CancelSummary> {
    info!("Request scope cancel via API");
    Json(CancelSummary {
        requests_discarded: state.controller.cancel_requests(),
        playback_discarded: 0,
    })
}

/// POST /cancel/playback
pub async fn cancel_playback(State(state): State<AppState>) -> Json<CancelSummary> {
    info!("Playback scope cancel via API");
    Json(CancelSummary {
        requests_discarded: 0,
        playback_discarded: state.controller.cancel_playback(),
    })
}

/// POST /cancel/all
pub async fn cancel_all(State(state): State<AppState>) -> Json<CancelSummary> {
    info!("Full pipeline cancel via API");
    Json(state.controller.cancel_all())
}

#[derive(Debug, Serialize)]
pub struct BackendTestResponse {
    pub endpoint: String,
    pub reachable: bool,
}

/// GET /backend/test
pub async fn backend_test(State(state): State<AppState>) -> Json<BackendTestResponse> {
    let reachable = state.controller.test_connection().await;
    info!(reachable, "Backend connection test");
    Json(BackendTestResponse {
        endpoint: state.controller.backend_endpoint().to_string(),
        reachable,
    })
}
