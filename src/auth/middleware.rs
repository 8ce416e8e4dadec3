use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use super::csrf::{CSRF_HEADER, verify_csrf_token};
use super::token::{TokenGenerator, parse_token};
use crate::server::AppState;
use crate::types::{Account, Role, Token};

/// An authenticated session: the bearer token row and the account behind it.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: Token,
    pub account: Account,
}

/// Extractor that requires any valid authentication
pub struct RequireAuth(pub Session);

/// Extractor that requires an admin session
pub struct RequireAdmin(pub Session);

/// Extractor that requires a student session
pub struct RequireStudent(pub Session);

/// Admin session plus a valid `X-CSRF-Token` header. Used on state-changing
/// admin routes; checked before the handler body runs.
pub struct CsrfAdmin(pub Session);

/// Student session plus a valid `X-CSRF-Token` header.
pub struct CsrfStudent(pub Session);

/// Any authenticated session plus a valid `X-CSRF-Token` header.
pub struct CsrfAuth(pub Session);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    AccountDisabled,
    NotAdmin,
    NotStudent,
    CsrfRejected,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::AccountDisabled => (StatusCode::FORBIDDEN, "Account is disabled"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::NotStudent => (StatusCode::FORBIDDEN, "Student access required"),
            AuthError::CsrfRejected => (StatusCode::FORBIDDEN, "Security error"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "success": false, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"coursedesk\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = authenticate(parts, state)?;
        Ok(RequireAuth(session))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = authenticate(parts, state)?;

        if session.account.role != Role::Admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(session))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireStudent {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = authenticate(parts, state)?;

        if session.account.role != Role::Student {
            return Err(AuthError::NotStudent);
        }

        Ok(RequireStudent(session))
    }
}

impl FromRequestParts<Arc<AppState>> for CsrfAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireAdmin(session) = RequireAdmin::from_request_parts(parts, state).await?;
        check_csrf(parts, state, &session)?;
        Ok(CsrfAdmin(session))
    }
}

impl FromRequestParts<Arc<AppState>> for CsrfStudent {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireStudent(session) = RequireStudent::from_request_parts(parts, state).await?;
        check_csrf(parts, state, &session)?;
        Ok(CsrfStudent(session))
    }
}

impl FromRequestParts<Arc<AppState>> for CsrfAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(session) = RequireAuth::from_request_parts(parts, state).await?;
        check_csrf(parts, state, &session)?;
        Ok(CsrfAuth(session))
    }
}

fn check_csrf(parts: &Parts, state: &Arc<AppState>, session: &Session) -> Result<(), AuthError> {
    let presented = parts
        .headers
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::CsrfRejected)?;

    if !verify_csrf_token(&state.csrf_key, &session.token.id, presented) {
        return Err(AuthError::CsrfRejected);
    }

    Ok(())
}

/// Validates the bearer token in the Authorization header and loads the
/// account it belongs to.
pub fn authenticate(parts: &Parts, state: &Arc<AppState>) -> Result<Session, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            header.strip_prefix("Bearer ").unwrap().to_string()
        }
        Some(_) => return Err(AuthError::InvalidScheme),
        None => return Err(AuthError::MissingAuth),
    };

    validate_session(state, &raw_token)
}

/// Validates a raw token string against the store and resolves the session.
pub fn validate_session(state: &Arc<AppState>, raw_token: &str) -> Result<Session, AuthError> {
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| AuthError::InvalidToken)?;

    let token = state
        .store
        .get_token_by_lookup(&lookup)
        .map_err(|_| AuthError::InternalError)?
        .ok_or(AuthError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| AuthError::InternalError)?
    {
        return Err(AuthError::InvalidToken);
    }

    if let Some(expires_at) = &token.expires_at {
        if expires_at < &Utc::now() {
            return Err(AuthError::TokenExpired);
        }
    }

    let account = state
        .store
        .get_account(&token.account_id)
        .map_err(|_| AuthError::InternalError)?
        .ok_or(AuthError::InvalidToken)?;

    if !account.is_active {
        return Err(AuthError::AccountDisabled);
    }

    if let Err(e) = state.store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(Session { token, account })
}
