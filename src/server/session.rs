use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum::Router;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{CsrfAuth, RequireAuth, TokenGenerator, issue_csrf_token};
use crate::server::AppState;
use crate::server::dto::{
    ChangePasswordRequest, CsrfResponse, LoginRequest, LoginResponse, RegisterRequest,
    StudentResponse,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{normalize_email, normalize_optional, normalize_text, validate_password};
use crate::types::{Account, Role, StudentProfile, Token};

const SESSION_TTL_DAYS: i64 = 30;

pub fn session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/csrf", get(csrf))
        .route("/auth/password", put(change_password))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;
    let first_name = normalize_text(&req.first_name, "First name")?;
    let last_name = normalize_text(&req.last_name, "Last name")?;

    let generator = TokenGenerator::new();
    let password_hash = generator
        .hash(&req.password)
        .map_err(|_| ApiError::internal("Failed to process registration"))?;

    let now = Utc::now();
    let account = Account {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash,
        role: Role::Student,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    match state.store.create_account(&account) {
        Ok(()) => {}
        Err(crate::error::Error::AlreadyExists) => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        Err(e) => {
            tracing::error!("Failed to create account: {e}");
            return Err(ApiError::internal("Failed to create account"));
        }
    }

    let profile = StudentProfile {
        account_id: account.id.clone(),
        first_name: Some(first_name),
        last_name: Some(last_name),
        phone: normalize_optional(req.phone.as_deref()),
        address: normalize_optional(req.address.as_deref()),
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .upsert_student_profile(&profile)
        .api_err("Failed to create profile")?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            StudentResponse { account, profile },
            "Registration complete, you can now log in",
        )),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let email = normalize_email(&req.email).map_err(|_| invalid_credentials())?;

    let account = state
        .store
        .get_account_by_email(&email)
        .api_err("Failed to look up account")?
        .ok_or_else(invalid_credentials)?;

    let generator = TokenGenerator::new();
    let ok = generator
        .verify(&req.password, &account.password_hash)
        .map_err(|_| ApiError::internal("Failed to verify credentials"))?;
    if !ok {
        return Err(invalid_credentials());
    }

    if !account.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    const MAX_RETRIES: u32 = 3;
    for _ in 0..MAX_RETRIES {
        let (raw_token, lookup, hash) = generator
            .generate()
            .map_err(|_| ApiError::internal("Failed to create session"))?;

        let now = Utc::now();
        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            account_id: account.id.clone(),
            created_at: now,
            expires_at: Some(now + Duration::days(SESSION_TTL_DAYS)),
            last_used_at: None,
        };

        match state.store.create_token(&token) {
            Ok(()) => {
                return Ok(Json(ApiResponse::success(LoginResponse {
                    token: raw_token,
                    account,
                })));
            }
            Err(crate::error::Error::TokenLookupCollision) => continue,
            Err(e) => {
                tracing::error!("Failed to create session token: {e}");
                return Err(ApiError::internal("Failed to create session"));
            }
        }
    }

    Err(ApiError::internal("Failed to create session after retries"))
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("Invalid email or password")
}

async fn logout(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state
        .store
        .delete_token(&session.token.id)
        .api_err("Failed to end session")?;

    Ok::<_, ApiError>(Json(ApiResponse::message("Logged out")))
}

async fn csrf(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let csrf_token = issue_csrf_token(&state.csrf_key, &session.token.id);
    Json(ApiResponse::success(CsrfResponse { csrf_token }))
}

async fn change_password(
    CsrfAuth(session): CsrfAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChangePasswordRequest>,
) -> impl IntoResponse {
    validate_password(&req.new_password)?;

    let generator = TokenGenerator::new();
    let ok = generator
        .verify(&req.current_password, &session.account.password_hash)
        .map_err(|_| ApiError::internal("Failed to verify credentials"))?;
    if !ok {
        return Err(ApiError::forbidden("Current password is incorrect"));
    }

    let password_hash = generator
        .hash(&req.new_password)
        .map_err(|_| ApiError::internal("Failed to update password"))?;

    let mut account = state
        .store
        .get_account(&session.account.id)
        .api_err("Failed to look up account")?
        .or_not_found("Account not found")?;

    account.password_hash = password_hash;
    account.updated_at = Utc::now();

    state
        .store
        .update_account(&account)
        .api_err("Failed to update password")?;

    Ok(Json(ApiResponse::message("Password updated")))
}
