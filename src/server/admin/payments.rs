use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auth::{CSRF_HEADER, CsrfAdmin, RequireAdmin, verify_csrf_token};
use crate::error::Error;
use crate::ledger::{import, reconcile};
use crate::server::AppState;
use crate::server::dto::{
    AssignResponse, BulkDeleteResponse, CreatePaymentRequest, ImportRequest, ImportResponse,
    PaymentIdsRequest, PaymentListParams, PendingPaymentsResponse,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::{normalize_text, validate_amount};
use crate::store::PaymentFilter;
use crate::types::Payment;

pub async fn list_payments(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaymentListParams>,
) -> impl IntoResponse {
    let today = Utc::now().date_naive();
    let (since, on) = match params.filter.as_deref() {
        None | Some("") => (None, None),
        Some("today") => (None, Some(today)),
        Some("week") => (Some(today - Duration::days(7)), None),
        Some("month") => (Some(today - Duration::days(30)), None),
        Some(other) => {
            return Err(ApiError::bad_request(format!("Unknown filter: {other}")));
        }
    };

    let filter = PaymentFilter {
        search: params.search.clone(),
        since,
        on,
        cursor: params.cursor.clone().unwrap_or_default(),
        limit: DEFAULT_PAGE_SIZE + 1,
    };

    let payments = state
        .store
        .list_payments(&filter)
        .api_err("Failed to list payments")?;

    let (payments, next_cursor, has_more) =
        paginate(payments, DEFAULT_PAGE_SIZE as usize, |p| p.id.clone());

    Ok(Json(PaginatedResponse::new(payments, next_cursor, has_more)))
}

pub async fn create_payment(
    CsrfAdmin(session): CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePaymentRequest>,
) -> impl IntoResponse {
    let description = normalize_text(&req.description, "Description")?;
    let amount = validate_amount(req.amount)?;

    if let Some(student_id) = req.student_id.as_deref() {
        state
            .store
            .get_account(student_id)
            .api_err("Failed to look up student")?
            .or_not_found("Student not found")?;
    }

    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        transaction_date: req.transaction_date,
        description,
        amount,
        reference_no: req.reference_no.clone(),
        payment_type: req.payment_type.clone(),
        student_id: req.student_id.clone(),
        created_by: session.account.id.clone(),
        created_at: Utc::now(),
        is_active: true,
    };

    state
        .store
        .create_payment(&payment)
        .api_err("Failed to record payment")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}

pub async fn delete_payment(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_payments(std::slice::from_ref(&id))
        .api_err("Failed to delete payment")?;

    if deleted == 0 {
        return Err(ApiError::not_found("Payment not found"));
    }

    Ok(Json(ApiResponse::message("Payment deleted")))
}

pub async fn bulk_delete_payments(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentIdsRequest>,
) -> impl IntoResponse {
    if req.payment_ids.is_empty() {
        return Err(ApiError::bad_request("No payments selected"));
    }

    let deleted = state
        .store
        .delete_payments(&req.payment_ids)
        .api_err("Failed to delete payments")?;

    Ok(Json(ApiResponse::success(BulkDeleteResponse { deleted })))
}

const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// POST /payments/upload - statement preview. The CSRF token may arrive as a
/// header or as a `csrf_token` form field; either way it is checked before
/// the statement is parsed.
pub async fn upload_statement(
    RequireAdmin(session): RequireAdmin,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut file: Option<(Vec<u8>, String)> = None;
    let mut min_amount_raw: Option<String> = None;
    let mut csrf_field: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
                if data.len() > MAX_UPLOAD_SIZE {
                    return Err(ApiError::bad_request("File is too large"));
                }
                file = Some((data.to_vec(), filename));
            }
            Some("min_amount") => {
                min_amount_raw = Some(
                    field.text().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read min_amount: {e}"))
                    })?,
                );
            }
            Some("csrf_token") => {
                csrf_field = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read csrf_token: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let presented = headers
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or(csrf_field);
    let csrf_ok = presented
        .as_deref()
        .is_some_and(|t| verify_csrf_token(&state.csrf_key, &session.token.id, t));
    if !csrf_ok {
        return Err(ApiError::forbidden("Security error"));
    }

    let (bytes, filename) = file.ok_or_else(|| ApiError::bad_request("File field is required"))?;

    let min_amount = match min_amount_raw.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            Decimal::from_str(&raw.replace(',', "."))
                .map_err(|_| ApiError::bad_request("Minimum amount must be a number"))?,
        ),
    };

    let rows = import::preview_statement(state.store.as_ref(), &bytes, &filename, min_amount)
        .map_err(|e| match e {
            Error::Import(msg) => ApiError::bad_request(msg),
            e => {
                tracing::error!("Failed to preview statement: {e}");
                ApiError::internal("Failed to read statement")
            }
        })?;

    Ok(Json(ApiResponse::success(rows)))
}

pub async fn import_rows(
    CsrfAdmin(session): CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> impl IntoResponse {
    if req.payments.is_empty() {
        return Err(ApiError::bad_request("No rows selected"));
    }

    let inserted = import::commit_rows(state.store.as_ref(), &req.payments, &session.account.id)
        .map_err(|e| match e {
            Error::Import(msg) => ApiError::bad_request(msg),
            e => {
                tracing::error!("Failed to import payments: {e}");
                ApiError::internal("Failed to import payments")
            }
        })?;

    Ok(Json(ApiResponse::success(ImportResponse { inserted })))
}

pub async fn pending_payments(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_course(&course_id)
        .api_err("Failed to get course")?
        .or_not_found("Course not found")?;

    let payments = state
        .store
        .list_unassigned_payments()
        .api_err("Failed to list unassigned payments")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(PendingPaymentsResponse {
        payments,
    })))
}

pub async fn assign_payments(
    CsrfAdmin(session): CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path((course_id, student_id)): Path<(String, String)>,
    Json(req): Json<PaymentIdsRequest>,
) -> impl IntoResponse {
    if req.payment_ids.is_empty() {
        return Err(ApiError::bad_request("No payments selected"));
    }

    let enrollment = state
        .store
        .get_active_enrollment(&course_id, &student_id)
        .api_err("Failed to check enrollment")?
        .or_not_found("Enrollment not found")?;

    let assigned = reconcile::assign_payments(
        state.store.as_ref(),
        &enrollment,
        &req.payment_ids,
        &session.account.id,
    )
    .map_err(|e| {
        tracing::error!("Failed to assign payments: {e}");
        ApiError::internal("Failed to assign payments")
    })?;

    Ok(Json(ApiResponse::success(AssignResponse { assigned })))
}

pub async fn delete_allocation(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path((course_id, allocation_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match reconcile::delete_course_allocation(state.store.as_ref(), &course_id, &allocation_id) {
        Ok(()) => Ok(Json(ApiResponse::message("Allocation deleted"))),
        Err(Error::NotFound) => Err(ApiError::not_found("Allocation not found")),
        Err(Error::BadRequest(msg)) => Err(ApiError::bad_request(msg)),
        Err(e) => {
            tracing::error!("Failed to delete allocation: {e}");
            Err(ApiError::internal("Failed to delete allocation"))
        }
    }
}
