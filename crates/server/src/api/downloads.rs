//! Download API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use zenload_core::{
    ChatId, DownloadRequest, ExtractError, FormatDescriptor, Language, Localizer, ManagerStatus,
    RejectReason, SubmitOutcome, TaskId, TaskState, TaskSummary,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a download
#[derive(Debug, Deserialize)]
pub struct SubmitDownloadBody {
    pub user_id: i64,
    /// Chat to deliver into; defaults to the user's private chat
    pub chat_id: Option<i64>,
    pub url: String,
    pub format_id: Option<String>,
}

/// Response for an accepted submission
#[derive(Debug, Serialize)]
pub struct SubmitDownloadResponse {
    pub task_id: TaskId,
    pub user_id: i64,
    pub state: TaskState,
}

/// Request body for listing formats
#[derive(Debug, Deserialize)]
pub struct ListFormatsBody {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ListFormatsResponse {
    pub url: String,
    pub formats: Vec<FormatDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct UserTasksResponse {
    pub user_id: i64,
    pub tasks: Vec<TaskSummary>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct DownloadErrorResponse {
    pub error: String,
    /// Machine readable cause
    pub reason: String,
    /// Text a front-end can show to the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DownloadErrorResponse {
    fn new(error: impl ToString, reason: &str) -> Self {
        Self {
            error: error.to_string(),
            reason: reason.to_string(),
            message: None,
        }
    }
}

fn rejection_status(reason: &RejectReason) -> StatusCode {
    match reason {
        RejectReason::TooManyDownloads { .. } => StatusCode::TOO_MANY_REQUESTS,
        RejectReason::QueueFull { .. } | RejectReason::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RejectReason::UnsupportedUrl { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a download
pub async fn submit_download(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitDownloadBody>,
) -> Result<(StatusCode, Json<SubmitDownloadResponse>), impl IntoResponse> {
    let mut request = DownloadRequest::new(body.user_id, body.url);
    if let Some(chat_id) = body.chat_id {
        request = request.in_chat(ChatId(chat_id));
    }
    if let Some(format_id) = body.format_id {
        request = request.with_format(format_id);
    }

    match state.manager().submit(request) {
        SubmitOutcome::Accepted(handle) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitDownloadResponse {
                task_id: handle.id(),
                user_id: handle.user_id(),
                state: handle.state(),
            }),
        )),
        SubmitOutcome::Rejected(reason) => {
            let localizer = Localizer::new(Language::En);
            let body = DownloadErrorResponse {
                message: Some(localizer.get(reason.message_key()).to_string()),
                ..DownloadErrorResponse::new(&reason, reason.kind())
            };
            Err((rejection_status(&reason), Json(body)))
        }
    }
}

/// Get manager status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ManagerStatus> {
    Json(state.manager().status())
}

/// List a user's live tasks
pub async fn list_user_tasks(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Json<UserTasksResponse> {
    Json(UserTasksResponse {
        user_id,
        tasks: state.manager().user_tasks(user_id),
    })
}

/// Cancel one task
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<CancelResponse>, impl IntoResponse> {
    if state.manager().cancel(task_id) {
        Ok(Json(CancelResponse { cancelled: 1 }))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(DownloadErrorResponse::new(
                format!("No live task with id {}", task_id),
                "not_found",
            )),
        ))
    }
}

/// Cancel every live task of a user
pub async fn cancel_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.manager().cancel_user(user_id),
    })
}

/// List the formats available for a URL
pub async fn list_formats(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ListFormatsBody>,
) -> Result<Json<ListFormatsResponse>, impl IntoResponse> {
    match state.manager().formats(&body.url).await {
        Ok(formats) => Ok(Json(ListFormatsResponse {
            url: body.url,
            formats,
        })),
        Err(e) => {
            let (status, reason) = match &e {
                ExtractError::UnsupportedUrl { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_url")
                }
                ExtractError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
                ExtractError::AuthRequired { .. } => (StatusCode::FORBIDDEN, "auth_required"),
                ExtractError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                ExtractError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
                _ => (StatusCode::BAD_GATEWAY, "extraction_failed"),
            };
            warn!(url = %body.url, error = %e, "Format listing failed");
            Err((status, Json(DownloadErrorResponse::new(&e, reason))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(
            rejection_status(&RejectReason::TooManyDownloads { limit: 2 }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            rejection_status(&RejectReason::QueueFull { capacity: 1 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            rejection_status(&RejectReason::ShuttingDown),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            rejection_status(&RejectReason::UnsupportedUrl { url: "x".into() }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_error_response_omits_empty_message() {
        let json =
            serde_json::to_value(DownloadErrorResponse::new("boom", "not_found")).unwrap();
        assert_eq!(json["reason"], "not_found");
        assert!(json.get("message").is_none());
    }
}
