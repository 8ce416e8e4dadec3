mod courses;
mod profile;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
};

use crate::server::AppState;

pub fn student_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(profile::get_profile))
        .route("/profile", put(profile::update_profile))
        .route("/my/courses", get(courses::my_courses))
        .route(
            "/courses/{id}/announcements",
            get(courses::course_announcements),
        )
        .route(
            "/announcements/{id}/reaction",
            put(courses::set_reaction),
        )
}
