use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::CsrfAdmin;
use crate::server::AppState;
use crate::server::dto::AnnouncementRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::sanitize::sanitize_html;
use crate::server::validation::normalize_text;
use crate::types::Announcement;

pub async fn create_announcement(
    CsrfAdmin(session): CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    Json(req): Json<AnnouncementRequest>,
) -> impl IntoResponse {
    let title = normalize_text(&req.title, "Title")?;
    let content = sanitize_html(req.content.trim());
    if content.is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }

    let course = state
        .store
        .get_course(&course_id)
        .api_err("Failed to get course")?
        .or_not_found("Course not found")?;

    let announcement = Announcement {
        id: Uuid::new_v4().to_string(),
        course_id: course.id,
        title,
        content,
        created_by: session.account.id.clone(),
        created_at: Utc::now(),
    };

    state
        .store
        .create_announcement(&announcement)
        .api_err("Failed to create announcement")?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(announcement))))
}

pub async fn delete_announcement(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path((course_id, announcement_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let announcement = state
        .store
        .get_announcement(&announcement_id)
        .api_err("Failed to get announcement")?
        .or_not_found("Announcement not found")?;

    if announcement.course_id != course_id {
        return Err(ApiError::bad_request(
            "Announcement does not belong to this course",
        ));
    }

    state
        .store
        .delete_announcement(&announcement.id)
        .api_err("Failed to delete announcement")?;

    Ok(Json(ApiResponse::message("Announcement deleted")))
}
