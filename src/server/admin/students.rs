use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::{CsrfAdmin, RequireAdmin};
use crate::server::AppState;
use crate::server::dto::{StudentListParams, StudentResponse, StudentStatusRequest};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::types::{Account, Role, StudentProfile};

pub async fn list_students(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<StudentListParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let accounts = state
        .store
        .list_students(params.search.as_deref(), None, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list students")?;

    let (accounts, next_cursor, has_more) =
        paginate(accounts, DEFAULT_PAGE_SIZE as usize, |a| a.id.clone());

    let mut students = Vec::with_capacity(accounts.len());
    for account in accounts {
        let profile = load_profile(&state, &account)?;
        students.push(StudentResponse { account, profile });
    }

    Ok::<_, ApiError>(Json(PaginatedResponse::new(students, next_cursor, has_more)))
}

pub async fn get_student(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let account = load_student(&state, &id)?;
    let profile = load_profile(&state, &account)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StudentResponse {
        account,
        profile,
    })))
}

pub async fn set_student_status(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StudentStatusRequest>,
) -> impl IntoResponse {
    let mut account = load_student(&state, &id)?;

    account.is_active = req.is_active;
    account.updated_at = Utc::now();

    state
        .store
        .update_account(&account)
        .api_err("Failed to update student")?;

    let message = if req.is_active {
        "Student activated"
    } else {
        "Student deactivated"
    };
    Ok::<_, ApiError>(Json(ApiResponse::with_message(account, message)))
}

pub async fn delete_student(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let account = load_student(&state, &id)?;

    state
        .store
        .delete_account(&account.id)
        .api_err("Failed to delete student")?;

    Ok::<_, ApiError>(Json(ApiResponse::message("Student deleted")))
}

fn load_student(state: &Arc<AppState>, id: &str) -> Result<Account, ApiError> {
    let account = state
        .store
        .get_account(id)
        .api_err("Failed to get student")?
        .or_not_found("Student not found")?;

    // Admin accounts are not managed through these routes.
    if account.role != Role::Student {
        return Err(ApiError::not_found("Student not found"));
    }

    Ok(account)
}

fn load_profile(state: &Arc<AppState>, account: &Account) -> Result<StudentProfile, ApiError> {
    let profile = state
        .store
        .get_student_profile(&account.id)
        .api_err("Failed to load profile")?;

    // Accounts created before profiles became mandatory may not have one.
    Ok(profile.unwrap_or_else(|| StudentProfile {
        account_id: account.id.clone(),
        first_name: None,
        last_name: None,
        phone: None,
        address: None,
        created_at: account.created_at,
        updated_at: account.updated_at,
    }))
}
