use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::{CsrfStudent, RequireStudent};
use crate::ledger::reconcile;
use crate::server::AppState;
use crate::server::dto::{
    AnnouncementResponse, MyCourseResponse, ReactionCount, ReactionRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_emoji;
use crate::types::Reaction;

pub async fn my_courses(
    RequireStudent(session): RequireStudent,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let enrollments = state
        .store
        .list_student_enrollments(&session.account.id, true)
        .api_err("Failed to list enrollments")?;

    let mut courses = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        let Some(course) = state
            .store
            .get_course(&enrollment.course_id)
            .api_err("Failed to load course")?
        else {
            continue;
        };

        let schedule = state
            .store
            .list_course_schedules(&course.id)
            .api_err("Failed to load schedule")?;

        let balance = reconcile::enrollment_balance(state.store.as_ref(), course.price, &enrollment.id)
            .map_err(|e| {
                tracing::error!("Failed to compute balance: {e}");
                ApiError::internal("Failed to compute balance")
            })?;

        courses.push(MyCourseResponse {
            course,
            schedule,
            enrolled_at: enrollment.enrolled_at,
            balance,
        });
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(courses)))
}

pub async fn course_announcements(
    RequireStudent(session): RequireStudent,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> impl IntoResponse {
    require_enrolled(&state, &course_id, &session.account.id)?;

    let announcements = state
        .store
        .list_course_announcements(&course_id)
        .api_err("Failed to list announcements")?;

    let mut responses = Vec::with_capacity(announcements.len());
    for announcement in announcements {
        let reactions = state
            .store
            .list_announcement_reactions(&announcement.id)
            .api_err("Failed to list reactions")?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut my_reaction = None;
        for reaction in &reactions {
            *counts.entry(reaction.emoji.clone()).or_default() += 1;
            if reaction.student_id == session.account.id {
                my_reaction = Some(reaction.emoji.clone());
            }
        }

        responses.push(AnnouncementResponse {
            announcement,
            reactions: counts
                .into_iter()
                .map(|(emoji, count)| ReactionCount { emoji, count })
                .collect(),
            my_reaction,
        });
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(responses)))
}

pub async fn set_reaction(
    CsrfStudent(session): CsrfStudent,
    State(state): State<Arc<AppState>>,
    Path(announcement_id): Path<String>,
    Json(req): Json<ReactionRequest>,
) -> impl IntoResponse {
    let emoji = validate_emoji(&req.emoji)?;

    let announcement = state
        .store
        .get_announcement(&announcement_id)
        .api_err("Failed to load announcement")?
        .or_not_found("Announcement not found")?;

    require_enrolled(&state, &announcement.course_id, &session.account.id)?;

    let now = Utc::now();
    let reaction = Reaction {
        announcement_id: announcement.id,
        student_id: session.account.id.clone(),
        emoji,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .upsert_reaction(&reaction)
        .api_err("Failed to save reaction")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(reaction)))
}

/// Students only see announcement streams for courses they are actively
/// enrolled in.
fn require_enrolled(
    state: &Arc<AppState>,
    course_id: &str,
    student_id: &str,
) -> Result<(), ApiError> {
    let enrollment = state
        .store
        .get_active_enrollment(course_id, student_id)
        .api_err("Failed to check enrollment")?;

    if enrollment.is_none() {
        return Err(ApiError::forbidden("Not enrolled in this course"));
    }

    Ok(())
}
