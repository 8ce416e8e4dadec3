mod announcements;
mod courses;
mod payments;
mod students;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // Student routes
        .route("/students", get(students::list_students))
        .route("/students/{id}", get(students::get_student))
        .route("/students/{id}/status", put(students::set_student_status))
        .route("/students/{id}", delete(students::delete_student))
        // Course routes
        .route("/courses", get(courses::list_courses))
        .route("/courses", post(courses::create_course))
        .route("/courses/{id}", get(courses::get_course))
        .route("/courses/{id}", put(courses::update_course))
        .route("/courses/{id}", delete(courses::delete_course))
        .route("/courses/{id}/roster", get(courses::export_roster))
        // Enrollment routes
        .route("/courses/{id}/enrollments", post(courses::enroll_students))
        .route(
            "/courses/{id}/enrollments/{student_id}",
            delete(courses::unenroll_student),
        )
        // Announcement routes
        .route(
            "/courses/{id}/announcements",
            post(announcements::create_announcement),
        )
        .route(
            "/courses/{id}/announcements/{announcement_id}",
            delete(announcements::delete_announcement),
        )
        // Reconciliation routes
        .route(
            "/courses/{id}/pending-payments",
            get(payments::pending_payments),
        )
        .route(
            "/courses/{id}/students/{student_id}/assign-payments",
            post(payments::assign_payments),
        )
        .route(
            "/courses/{id}/allocations/{allocation_id}",
            delete(payments::delete_allocation),
        )
        // Ledger routes
        .route("/payments", get(payments::list_payments))
        .route("/payments", post(payments::create_payment))
        .route("/payments/{id}", delete(payments::delete_payment))
        .route("/payments/bulk-delete", post(payments::bulk_delete_payments))
        .route("/payments/upload", post(payments::upload_statement))
        .route("/payments/import", post(payments::import_rows))
}
