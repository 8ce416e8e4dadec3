use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;

use crate::auth::{CsrfStudent, RequireStudent};
use crate::server::AppState;
use crate::server::dto::{StudentResponse, UpdateProfileRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

pub async fn get_profile(
    RequireStudent(session): RequireStudent,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let profile = state
        .store
        .get_student_profile(&session.account.id)
        .api_err("Failed to load profile")?
        .or_not_found("Profile not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StudentResponse {
        account: session.account,
        profile,
    })))
}

pub async fn update_profile(
    CsrfStudent(session): CsrfStudent,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let mut profile = state
        .store
        .get_student_profile(&session.account.id)
        .api_err("Failed to load profile")?
        .or_not_found("Profile not found")?;

    if let Some(first_name) = req.first_name.as_deref() {
        profile.first_name = crate::server::validation::normalize_optional(Some(first_name));
    }
    if let Some(last_name) = req.last_name.as_deref() {
        profile.last_name = crate::server::validation::normalize_optional(Some(last_name));
    }
    if let Some(phone) = req.phone.as_deref() {
        profile.phone = crate::server::validation::normalize_optional(Some(phone));
    }
    if let Some(address) = req.address.as_deref() {
        profile.address = crate::server::validation::normalize_optional(Some(address));
    }
    profile.updated_at = Utc::now();

    state
        .store
        .upsert_student_profile(&profile)
        .api_err("Failed to update profile")?;

    Ok::<_, ApiError>(Json(ApiResponse::with_message(
        StudentResponse {
            account: session.account,
            profile,
        },
        "Profile updated",
    )))
}
