use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{CsrfAdmin, RequireAdmin};
use crate::ledger::export::{RosterRow, roster_workbook};
use crate::ledger::reconcile;
use crate::server::AppState;
use crate::server::dto::{
    CourseDetailResponse, CourseRequest, CourseResponse, EnrollRequest, EnrollResponse,
    EnrolledStudent, StudentResponse,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{normalize_text, validate_amount, validate_schedule};
use crate::types::{Course, Enrollment, Role, ScheduleSlot, StudentProfile};

pub async fn create_course(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CourseRequest>,
) -> impl IntoResponse {
    let (name, instructor_name, price) = validate_course_request(&req)?;

    let now = Utc::now();
    let course = Course {
        id: Uuid::new_v4().to_string(),
        name,
        instructor_name,
        price,
        description: req.description.clone(),
        is_active: req.is_active,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .create_course(&course)
        .api_err("Failed to create course")?;

    let schedule = save_schedule(&state, &course.id, &req)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(CourseResponse { course, schedule })),
    ))
}

pub async fn update_course(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CourseRequest>,
) -> impl IntoResponse {
    let (name, instructor_name, price) = validate_course_request(&req)?;

    let mut course = state
        .store
        .get_course(&id)
        .api_err("Failed to get course")?
        .or_not_found("Course not found")?;

    course.name = name;
    course.instructor_name = instructor_name;
    course.price = price;
    course.description = req.description.clone();
    course.is_active = req.is_active;
    course.updated_at = Utc::now();

    state
        .store
        .update_course(&course)
        .api_err("Failed to update course")?;

    let schedule = save_schedule(&state, &course.id, &req)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(CourseResponse {
        course,
        schedule,
    })))
}

pub async fn list_courses(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let courses = state
        .store
        .list_courses()
        .api_err("Failed to list courses")?;

    let mut responses = Vec::with_capacity(courses.len());
    for course in courses {
        let schedule = state
            .store
            .list_course_schedules(&course.id)
            .api_err("Failed to load schedule")?;
        responses.push(CourseResponse { course, schedule });
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(responses)))
}

pub async fn get_course(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let course = state
        .store
        .get_course(&id)
        .api_err("Failed to get course")?
        .or_not_found("Course not found")?;

    let schedule = state
        .store
        .list_course_schedules(&course.id)
        .api_err("Failed to load schedule")?;

    let balance = reconcile::course_balance(state.store.as_ref(), &course).map_err(|e| {
        tracing::error!("Failed to compute course balance: {e}");
        ApiError::internal("Failed to compute course balance")
    })?;

    let enrollments = state
        .store
        .list_course_enrollments(&course.id, true)
        .api_err("Failed to list enrollments")?;

    let mut enrolled = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        let Some(account) = state
            .store
            .get_account(&enrollment.student_id)
            .api_err("Failed to load student")?
        else {
            continue;
        };

        let profile = state
            .store
            .get_student_profile(&account.id)
            .api_err("Failed to load profile")?
            .unwrap_or_else(|| empty_profile(&account.id, enrollment.enrolled_at));

        let balance =
            reconcile::enrollment_balance(state.store.as_ref(), course.price, &enrollment.id)
                .map_err(|e| {
                    tracing::error!("Failed to compute enrollment balance: {e}");
                    ApiError::internal("Failed to compute enrollment balance")
                })?;

        enrolled.push(EnrolledStudent {
            enrollment,
            student: StudentResponse { account, profile },
            balance,
        });
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(CourseDetailResponse {
        course,
        schedule,
        balance,
        enrollments: enrolled,
    })))
}

pub async fn delete_course(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_course(&id)
        .api_err("Failed to delete course")?;

    if !deleted {
        return Err(ApiError::not_found("Course not found"));
    }

    Ok(Json(ApiResponse::message("Course deleted")))
}

pub async fn export_roster(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let course = state
        .store
        .get_course(&id)
        .api_err("Failed to get course")?
        .or_not_found("Course not found")?;

    let enrollments = state
        .store
        .list_course_enrollments(&course.id, true)
        .api_err("Failed to list enrollments")?;

    let mut rows = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        let Some(account) = state
            .store
            .get_account(&enrollment.student_id)
            .api_err("Failed to load student")?
        else {
            continue;
        };
        let profile = state
            .store
            .get_student_profile(&account.id)
            .api_err("Failed to load profile")?
            .unwrap_or_else(|| empty_profile(&account.id, enrollment.enrolled_at));

        rows.push(RosterRow {
            first_name: profile.first_name.unwrap_or_default(),
            last_name: profile.last_name.unwrap_or_default(),
            phone: profile.phone.unwrap_or_default(),
            address: profile.address.unwrap_or_default(),
            email: account.email,
        });
    }

    let bytes = roster_workbook(&course.name, &rows).map_err(|e| {
        tracing::error!("Failed to build roster export: {e}");
        ApiError::internal("Failed to build roster export")
    })?;

    let filename = format!("{}-roster.xlsx", course.name.replace(' ', "_"));
    let headers = [
        (
            header::CONTENT_TYPE,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];

    Ok::<_, ApiError>((headers, bytes))
}

pub async fn enroll_students(
    CsrfAdmin(session): CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<EnrollRequest>,
) -> impl IntoResponse {
    let course = state
        .store
        .get_course(&id)
        .api_err("Failed to get course")?
        .or_not_found("Course not found")?;

    if req.student_ids.is_empty() {
        return Err(ApiError::bad_request("No students selected"));
    }

    let mut enrolled = 0;
    let mut skipped = 0;
    for student_id in &req.student_ids {
        let account = state
            .store
            .get_account(student_id)
            .api_err("Failed to load student")?;

        let valid = matches!(&account, Some(a) if a.role == Role::Student && a.is_active);
        if !valid {
            skipped += 1;
            continue;
        }

        let existing = state
            .store
            .get_active_enrollment(&course.id, student_id)
            .api_err("Failed to check enrollment")?;
        if existing.is_some() {
            skipped += 1;
            continue;
        }

        let enrollment = Enrollment {
            id: Uuid::new_v4().to_string(),
            course_id: course.id.clone(),
            student_id: student_id.clone(),
            enrolled_by: session.account.id.clone(),
            enrolled_at: Utc::now(),
            is_active: true,
        };
        state
            .store
            .create_enrollment(&enrollment)
            .api_err("Failed to enroll student")?;
        enrolled += 1;
    }

    Ok(Json(ApiResponse::success(EnrollResponse {
        enrolled,
        skipped,
    })))
}

pub async fn unenroll_student(
    _admin: CsrfAdmin,
    State(state): State<Arc<AppState>>,
    Path((id, student_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let enrollment = state
        .store
        .get_active_enrollment(&id, &student_id)
        .api_err("Failed to check enrollment")?
        .or_not_found("Enrollment not found")?;

    state
        .store
        .deactivate_enrollment(&enrollment.id)
        .api_err("Failed to unenroll student")?;

    Ok::<_, ApiError>(Json(ApiResponse::message("Student unenrolled")))
}

fn validate_course_request(req: &CourseRequest) -> Result<(String, String, rust_decimal::Decimal), ApiError> {
    let name = normalize_text(&req.name, "Course name")?;
    let instructor_name = normalize_text(&req.instructor_name, "Instructor name")?;
    let price = validate_amount(req.price)?;
    validate_schedule(&req.schedule)?;
    Ok((name, instructor_name, price))
}

fn save_schedule(
    state: &Arc<AppState>,
    course_id: &str,
    req: &CourseRequest,
) -> Result<Vec<ScheduleSlot>, ApiError> {
    let now = Utc::now();
    let slots: Vec<ScheduleSlot> = req
        .schedule
        .iter()
        .map(|s| ScheduleSlot {
            id: Uuid::new_v4().to_string(),
            course_id: course_id.to_string(),
            day_of_week: s.day_of_week.clone(),
            start_time: s.start_time.clone(),
            end_time: s.end_time.clone(),
            created_at: now,
        })
        .collect();

    state
        .store
        .replace_course_schedules(course_id, &slots)
        .api_err("Failed to save schedule")?;

    state
        .store
        .list_course_schedules(course_id)
        .api_err("Failed to load schedule")
}

fn empty_profile(account_id: &str, at: chrono::DateTime<Utc>) -> StudentProfile {
    StudentProfile {
        account_id: account_id.to_string(),
        first_name: None,
        last_name: None,
        phone: None,
        address: None,
        created_at: at,
        updated_at: at,
    }
}
