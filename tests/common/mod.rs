use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use coursedesk::auth::{
    CSRF_META_KEY, RateLimitPolicy, RateLimiter, TokenGenerator, generate_csrf_key,
};
use coursedesk::server::{AppState, create_router};
use coursedesk::store::{SqliteStore, Store};
use coursedesk::types::{Account, Role, Token};

pub struct TestServer {
    pub app: Router,
    pub state: Arc<AppState>,
    pub admin_token: String,
    pub admin_csrf: String,
    _tmp: tempfile::TempDir,
}

/// Spins up an in-process app over a temp database with one admin account.
/// The rate limiter is opened wide so multi-request tests don't trip it;
/// `setup_with_policy` exists for the tests that exercise the limiter itself.
pub async fn setup() -> TestServer {
    setup_with_policy(RateLimitPolicy {
        capacity: 10_000.0,
        refill_per_sec: 10_000.0,
    })
    .await
}

pub async fn setup_with_policy(policy: RateLimitPolicy) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(tmp.path().join("test.db")).unwrap();
    store.initialize().unwrap();

    let csrf_key = generate_csrf_key();
    store.set_meta(CSRF_META_KEY, &csrf_key).unwrap();

    let generator = TokenGenerator::new();
    let now = Utc::now();
    let admin = Account {
        id: Uuid::new_v4().to_string(),
        email: "admin@example.com".to_string(),
        password_hash: generator.hash("admin-password").unwrap(),
        role: Role::Admin,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.create_account(&admin).unwrap();

    let (raw_token, lookup, hash) = generator.generate().unwrap();
    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        account_id: admin.id.clone(),
        created_at: now,
        expires_at: None,
        last_used_at: None,
    };
    store.create_token(&token).unwrap();

    let state = Arc::new(AppState {
        store: Arc::new(store),
        csrf_key,
        rate_limiter: RateLimiter::new(policy),
    });
    let app = create_router(state.clone());

    let mut server = TestServer {
        app,
        state,
        admin_token: raw_token,
        admin_csrf: String::new(),
        _tmp: tmp,
    };
    let admin_token = server.admin_token.clone();
    let (status, body) = server.get("/api/v1/auth/csrf", Some(&admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    server.admin_csrf = body["data"]["csrf_token"].as_str().unwrap().to_string();
    server
}

impl TestServer {
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        csrf: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(csrf) = csrf {
            builder = builder.header("x-csrf-token", csrf);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, path, token, None, None).await
    }

    /// Raw request for non-JSON responses (file downloads).
    pub async fn get_bytes(&self, path: &str, token: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    pub async fn admin_get(&self, path: &str) -> (StatusCode, Value) {
        self.get(path, Some(&self.admin_token)).await
    }

    pub async fn admin_send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request(
            method,
            path,
            Some(&self.admin_token),
            Some(&self.admin_csrf),
            body,
        )
        .await
    }

    /// Registers and logs in a student through the public API.
    /// Returns (account_id, bearer_token, csrf_token).
    pub async fn create_student(&self, email: &str) -> (String, String, String) {
        let (status, _) = self
            .request(
                Method::POST,
                "/api/v1/auth/register",
                None,
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": "student-password",
                    "first_name": "Test",
                    "last_name": "Student",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": "student-password",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let account_id = body["data"]["account"]["id"].as_str().unwrap().to_string();
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let (status, body) = self.get("/api/v1/auth/csrf", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let csrf = body["data"]["csrf_token"].as_str().unwrap().to_string();

        (account_id, token, csrf)
    }

    /// Creates a course with a Monday slot and the given price.
    pub async fn create_course(&self, name: &str, price: f64) -> String {
        let (status, body) = self
            .admin_send(
                Method::POST,
                "/api/v1/admin/courses",
                Some(serde_json::json!({
                    "name": name,
                    "instructor_name": "Jane Doe",
                    "price": price,
                    "schedule": [
                        {"day_of_week": "monday", "start_time": "18:00", "end_time": "19:30"}
                    ],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create course failed: {body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn enroll(&self, course_id: &str, student_ids: &[&str]) -> Value {
        let (status, body) = self
            .admin_send(
                Method::POST,
                &format!("/api/v1/admin/courses/{course_id}/enrollments"),
                Some(serde_json::json!({ "student_ids": student_ids })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "enroll failed: {body}");
        body
    }
}
