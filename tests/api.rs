mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{setup, setup_with_policy};
use coursedesk::auth::RateLimitPolicy;

#[tokio::test]
async fn test_health() {
    let server = setup().await;
    let (status, _) = server.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_login_profile_flow() {
    let server = setup().await;

    let (_, token, csrf) = server.create_student("ada@example.com").await;

    // Duplicate registration is rejected
    let (status, body) = server
        .request(
            Method::POST,
            "/api/v1/auth/register",
            None,
            None,
            Some(json!({
                "email": "Ada@Example.com",
                "password": "another-password",
                "first_name": "Ada",
                "last_name": "Lovelace",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], json!(false));

    // Wrong password
    let (status, _) = server
        .request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            None,
            Some(json!({"email": "ada@example.com", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server.get("/api/v1/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile"]["first_name"], json!("Test"));

    // Profile update requires CSRF
    let (status, _) = server
        .request(
            Method::PUT,
            "/api/v1/profile",
            Some(&token),
            None,
            Some(json!({"phone": "555 123 4567"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server
        .request(
            Method::PUT,
            "/api/v1/profile",
            Some(&token),
            Some(&csrf),
            Some(json!({"phone": "  555  123 4567 "})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile"]["phone"], json!("555 123 4567"));
}

#[tokio::test]
async fn test_student_cannot_access_admin_routes() {
    let server = setup().await;
    let (_, token, csrf) = server.create_student("ada@example.com").await;

    let (status, _) = server.get("/api/v1/admin/students", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .request(
            Method::POST,
            "/api/v1/admin/courses",
            Some(&token),
            Some(&csrf),
            Some(json!({"name": "x", "instructor_name": "y", "price": 10.0})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_manages_students() {
    let server = setup().await;
    let (student_id, token, _) = server.create_student("ada@example.com").await;
    server.create_student("grace@example.com").await;

    let (status, body) = server.admin_get("/api/v1/admin/students").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = server
        .admin_get("/api/v1/admin/students?search=ada")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Deactivation locks the account out
    let (status, _) = server
        .admin_send(
            Method::PUT,
            &format!("/api/v1/admin/students/{student_id}/status"),
            Some(json!({"is_active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get("/api/v1/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            None,
            Some(json!({"email": "ada@example.com", "password": "student-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .admin_send(
            Method::DELETE,
            &format!("/api/v1/admin/students/{student_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server
        .admin_get(&format!("/api/v1/admin/students/{student_id}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_course_crud_and_validation() {
    let server = setup().await;

    // Invalid schedules are rejected up front
    for schedule in [
        json!([{"day_of_week": "funday", "start_time": "18:00", "end_time": "19:00"}]),
        json!([{"day_of_week": "monday", "start_time": "19:00", "end_time": "18:00"}]),
        json!([
            {"day_of_week": "monday", "start_time": "18:00", "end_time": "19:00"},
            {"day_of_week": "monday", "start_time": "20:00", "end_time": "21:00"}
        ]),
    ] {
        let (status, _) = server
            .admin_send(
                Method::POST,
                "/api/v1/admin/courses",
                Some(json!({
                    "name": "German A1",
                    "instructor_name": "Jane Doe",
                    "price": 1000.0,
                    "schedule": schedule,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let course_id = server.create_course("German A1", 1000.0).await;

    let (status, body) = server
        .admin_get(&format!("/api/v1/admin/courses/{course_id}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("German A1"));
    assert_eq!(body["data"]["balance"]["expected"].as_f64(), Some(0.0));
    assert_eq!(body["data"]["schedule"].as_array().unwrap().len(), 1);

    // Update replaces the schedule wholesale
    let (status, body) = server
        .admin_send(
            Method::PUT,
            &format!("/api/v1/admin/courses/{course_id}"),
            Some(json!({
                "name": "German A2",
                "instructor_name": "Jane Doe",
                "price": 1200.0,
                "schedule": [
                    {"day_of_week": "tuesday", "start_time": "18:00", "end_time": "19:30"},
                    {"day_of_week": "thursday", "start_time": "18:00", "end_time": "19:30"}
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("German A2"));
    assert_eq!(body["data"]["schedule"].as_array().unwrap().len(), 2);

    let (status, _) = server
        .admin_send(Method::DELETE, &format!("/api/v1/admin/courses/{course_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server
        .admin_get(&format!("/api/v1/admin/courses/{course_id}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_enrollment_lifecycle() {
    let server = setup().await;
    let (ada, ada_token, _) = server.create_student("ada@example.com").await;
    let (grace, _, _) = server.create_student("grace@example.com").await;
    let course_id = server.create_course("German A1", 1000.0).await;

    // One bogus id in the batch is skipped, not fatal
    let body = server
        .enroll(&course_id, &[&ada, &grace, "no-such-student"])
        .await;
    assert_eq!(body["data"]["enrolled"], json!(2));
    assert_eq!(body["data"]["skipped"], json!(1));

    // Enrolling again skips everyone
    let body = server.enroll(&course_id, &[&ada, &grace]).await;
    assert_eq!(body["data"]["enrolled"], json!(0));
    assert_eq!(body["data"]["skipped"], json!(2));

    let (status, body) = server.get("/api/v1/my/courses", Some(&ada_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["balance"]["remaining"].as_f64(), Some(1000.0));

    let (status, _) = server
        .admin_send(
            Method::DELETE,
            &format!("/api/v1/admin/courses/{course_id}/enrollments/{ada}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.get("/api/v1/my/courses", Some(&ada_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    // Unenrolling twice is a 404
    let (status, _) = server
        .admin_send(
            Method::DELETE,
            &format!("/api/v1/admin/courses/{course_id}/enrollments/{ada}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_announcements_and_reactions() {
    let server = setup().await;
    let (ada, ada_token, ada_csrf) = server.create_student("ada@example.com").await;
    let (_grace, grace_token, _) = server.create_student("grace@example.com").await;
    let course_id = server.create_course("German A1", 1000.0).await;
    server.enroll(&course_id, &[&ada]).await;

    let (status, body) = server
        .admin_send(
            Method::POST,
            &format!("/api/v1/admin/courses/{course_id}/announcements"),
            Some(json!({
                "title": "Exam next week",
                "content": "<p>Bring a <strong>pen</strong></p><script>alert(1)</script>",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let announcement_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(
        body["data"]["content"],
        json!("<p>Bring a <strong>pen</strong></p>alert(1)")
    );

    // Only enrolled students can read the stream
    let (status, _) = server
        .get(
            &format!("/api/v1/courses/{course_id}/announcements"),
            Some(&grace_token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // React twice: one row, second emoji wins
    for emoji in ["👍", "🎉"] {
        let (status, _) = server
            .request(
                Method::PUT,
                &format!("/api/v1/announcements/{announcement_id}/reaction"),
                Some(&ada_token),
                Some(&ada_csrf),
                Some(json!({"emoji": emoji})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = server
        .get(
            &format!("/api/v1/courses/{course_id}/announcements"),
            Some(&ada_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let announcement = &body["data"][0];
    assert_eq!(announcement["my_reaction"], json!("🎉"));
    let reactions = announcement["reactions"].as_array().unwrap();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0]["emoji"], json!("🎉"));
    assert_eq!(reactions[0]["count"], json!(1));

    let (status, _) = server
        .admin_send(
            Method::DELETE,
            &format!("/api/v1/admin/courses/{course_id}/announcements/{announcement_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_rejection_leaves_state_unchanged() {
    let server = setup().await;

    let (status, _) = server
        .request(
            Method::POST,
            "/api/v1/admin/courses",
            Some(&server.admin_token),
            None,
            Some(json!({
                "name": "German A1",
                "instructor_name": "Jane Doe",
                "price": 1000.0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A stale or forged token is also rejected
    let (status, _) = server
        .request(
            Method::POST,
            "/api/v1/admin/courses",
            Some(&server.admin_token),
            Some("0000000000000000000000000000000000000000000000000000000000000000"),
            Some(json!({
                "name": "German A1",
                "instructor_name": "Jane Doe",
                "price": 1000.0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.admin_get("/api/v1/admin/courses").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_rate_limit() {
    let server = setup_with_policy(RateLimitPolicy::default()).await;

    for _ in 0..30 {
        let (status, _) = server.admin_get("/api/v1/admin/courses").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = server.admin_get("/api/v1/admin/courses").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], json!(false));

    // Routes outside the admin group are unaffected
    let (status, _) = server.get("/api/v1/auth/csrf", Some(&server.admin_token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let server = setup().await;
    let (_, token, csrf) = server.create_student("ada@example.com").await;

    let (status, _) = server
        .request(Method::POST, "/api/v1/auth/logout", Some(&token), Some(&csrf), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get("/api/v1/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
