//! End-to-end tests driving the router in-process.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use redress_common::config::Config;
use redress_common::{DbLocation, Role, Store, User};
use redressd::middleware::RateLimiter;
use redressd::{build_router, AppState, AppStateArc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: AppStateArc,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    async fn with_config(config: Config) -> Self {
        let store = Store::open(DbLocation::InMemory).await.unwrap();
        let limiter = RateLimiter::from_config(&config.rate_limit);
        let state = Arc::new(AppState::new(store, config));
        let router = build_router(state.clone(), limiter).unwrap();
        Self { router, state }
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Insert an account directly and return (id, token)
    async fn account(&self, name: &str, email: &str, role: Role) -> (String, String) {
        let hash = self.state.hasher.hash("Secret@123").unwrap();
        let user = User::new(
            name.to_string(),
            email.to_string(),
            hash,
            role,
            None,
            redress_common::now(),
        );
        let user = self.state.store.insert_user(user).await.unwrap();
        let token = self
            .state
            .signer
            .issue(&user.id, redress_common::now())
            .unwrap();
        (user.id, token)
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.database.path = ":memory:".to_string();
    config.auth.token_secret = "integration-secret".to_string();
    config.auth.hash_iterations = 10;
    config
}

fn complaint_body() -> Value {
    json!({
        "title": "Projector broken in hall B",
        "category": "Academic",
        "description": "The projector in lecture hall B shows no image at all",
        "priority": "high"
    })
}

#[tokio::test]
async fn test_public_endpoints() {
    let app = TestApp::new().await;

    let (status, body) = app.call("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Server is running");

    let (status, body) = app.call("GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["complaints"], "/api/complaints");

    let (status, body) = app.call("GET", "/api/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "name": " Alice Doe ",
                "email": "Alice@Example.com",
                "password": "hunter22",
                "role": "admin"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user"]["name"], "Alice Doe");
    assert_eq!(body["data"]["user"]["email"], "alice@example.com");
    // the role field of the payload is ignored
    assert_eq!(body["data"]["user"]["role"], "user");
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Alice Again", "email": "alice@example.com", "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User already exists with this email");

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "A", "email": "not-an-email", "password": "123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ALICE@example.com", "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app.call("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["email"], "alice@example.com");

    let (status, body) = app
        .call(
            "PUT",
            "/api/auth/profile",
            Some(&token),
            Some(json!({ "name": "Alice D.", "department": "Physics" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["department"], "Physics");

    let (status, _) = app
        .call(
            "PUT",
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "currentPassword": "nope-nope", "newPassword": "newpass1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "PUT",
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "currentPassword": "hunter22", "newPassword": "newpass1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "newpass1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_reject_bad_tokens() {
    let app = TestApp::new().await;

    let (status, body) = app.call("GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .call("GET", "/api/auth/me", Some("v1.garbage.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_complaint_lifecycle_over_http() {
    let app = TestApp::new().await;
    let (_, author) = app.account("John Doe", "john@example.com", Role::User).await;
    let (_, other) = app.account("Jane Smith", "jane@example.com", Role::User).await;
    let (staff_id, staff) = app.account("Sam Staff", "sam@example.com", Role::Staff).await;
    let (_, other_staff) = app.account("Olga Staff", "olga@example.com", Role::Staff).await;
    let (_, admin) = app.account("Ada Admin", "ada@example.com", Role::Admin).await;

    let (status, body) = app
        .call("POST", "/api/complaints", Some(&author), Some(complaint_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let complaint = &body["data"]["complaint"];
    assert_eq!(complaint["status"], "pending");
    assert_eq!(complaint["priority"], "high");
    assert_eq!(complaint["timeline"].as_array().unwrap().len(), 1);
    assert_eq!(complaint["author"]["email"], "john@example.com");
    let id = complaint["id"].as_str().unwrap().to_string();
    let uri = format!("/api/complaints/{}", id);

    // read access
    assert_eq!(app.call("GET", &uri, Some(&author), None).await.0, StatusCode::OK);
    assert_eq!(app.call("GET", &uri, Some(&other), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.call("GET", &uri, Some(&staff), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.call("GET", &uri, Some(&admin), None).await.0, StatusCode::OK);

    // only admins assign
    let assign_uri = format!("{}/assign", uri);
    let (status, _) = app
        .call("PUT", &assign_uri, Some(&staff), Some(json!({ "assignedTo": staff_id })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .call("PUT", &assign_uri, Some(&admin), Some(json!({ "assignedTo": staff_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["complaint"]["assignee"]["name"], "Sam Staff");
    // assignment alone does not touch the timeline
    assert_eq!(body["data"]["complaint"]["timeline"].as_array().unwrap().len(), 1);

    assert_eq!(app.call("GET", &uri, Some(&staff), None).await.0, StatusCode::OK);
    assert_eq!(
        app.call("GET", &uri, Some(&other_staff), None).await.0,
        StatusCode::FORBIDDEN
    );

    // status updates
    let status_uri = format!("{}/status", uri);
    let (status, _) = app
        .call("PUT", &status_uri, Some(&author), Some(json!({ "status": "resolved" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call("PUT", &status_uri, Some(&other_staff), Some(json!({ "status": "resolved" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .call("PUT", &status_uri, Some(&staff), Some(json!({ "status": "done" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "status");

    let (status, body) = app
        .call(
            "PUT",
            &status_uri,
            Some(&staff),
            Some(json!({ "status": "in-progress", "note": "Assigned" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let complaint = &body["data"]["complaint"];
    assert_eq!(complaint["timeline"].as_array().unwrap().len(), 2);
    assert!(complaint.get("resolvedAt").is_none());

    // same status again does not append
    let (_, body) = app
        .call(
            "PUT",
            &status_uri,
            Some(&staff),
            Some(json!({ "status": "in-progress", "note": "still on it" })),
        )
        .await;
    assert_eq!(body["data"]["complaint"]["timeline"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .call(
            "PUT",
            &status_uri,
            Some(&staff),
            Some(json!({ "status": "resolved", "note": "Fixed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let complaint = &body["data"]["complaint"];
    assert_eq!(complaint["timeline"].as_array().unwrap().len(), 3);
    assert_eq!(complaint["resolutionNote"], "Fixed");
    assert!(complaint["resolvedAt"].is_string());
    assert!(complaint["resolutionTime"].as_f64().unwrap() >= 0.0);

    // priority is admin only
    let priority_uri = format!("{}/priority", uri);
    let (status, _) = app
        .call("PUT", &priority_uri, Some(&staff), Some(json!({ "priority": "low" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .call("PUT", &priority_uri, Some(&admin), Some(json!({ "priority": "critical" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["complaint"]["priority"], "critical");

    // listings
    let (_, body) = app.call("GET", "/api/complaints/my", Some(&author), None).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    let (_, body) = app.call("GET", "/api/complaints/my", Some(&other), None).await;
    assert_eq!(body["data"]["pagination"]["total"], 0);

    let (status, _) = app.call("GET", "/api/complaints/all", Some(&author), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = app.call("GET", "/api/complaints/all", Some(&staff), None).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    let (_, body) = app
        .call("GET", "/api/complaints/all", Some(&other_staff), None)
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 0);
    let (_, body) = app
        .call("GET", "/api/complaints/all?status=resolved&search=PROJECTOR", Some(&admin), None)
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    let (status, _) = app
        .call("GET", "/api/complaints/all?category=Weather", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // deletion
    assert_eq!(
        app.call("DELETE", &uri, Some(&staff), None).await.0,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.call("DELETE", &uri, Some(&admin), None).await.0, StatusCode::OK);
    assert_eq!(
        app.call("GET", &uri, Some(&admin), None).await.0,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_complaint_validation() {
    let app = TestApp::new().await;
    let (_, author) = app.account("John Doe", "john@example.com", Role::User).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/complaints",
            Some(&author),
            Some(json!({ "title": "Hi", "category": "Weather", "description": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"category"));
    assert!(fields.contains(&"description"));

    let (status, body) = app
        .call(
            "POST",
            "/api/complaints",
            Some(&author),
            Some(json!({
                "title": "Projector broken in hall B",
                "category": "IT",
                "description": "The projector shows no image at all",
                "priority": "urgent"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "priority");
}

#[tokio::test]
async fn test_assignment_payload() {
    let app = TestApp::new().await;
    let (_, author) = app.account("John Doe", "john@example.com", Role::User).await;
    let (author_id, _) = app.account("Jane Smith", "jane@example.com", Role::User).await;
    let (staff_id, _) = app.account("Sam Staff", "sam@example.com", Role::Staff).await;
    let (_, admin) = app.account("Ada Admin", "ada@example.com", Role::Admin).await;

    let (_, body) = app
        .call("POST", "/api/complaints", Some(&author), Some(complaint_body()))
        .await;
    let assign_uri = format!(
        "/api/complaints/{}/assign",
        body["data"]["complaint"]["id"].as_str().unwrap()
    );

    let (status, body) = app
        .call("PUT", &assign_uri, Some(&admin), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Staff ID is required");
    assert_eq!(body["errors"][0]["field"], "assignedTo");

    let (status, body) = app
        .call("PUT", &assign_uri, Some(&admin), Some(json!({ "assignedTo": author_id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid staff member");

    let (status, body) = app
        .call("PUT", &assign_uri, Some(&admin), Some(json!({ "assignedTo": staff_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["complaint"]["assignedTo"], staff_id.as_str());

    // older clients send staffId
    let (status, body) = app
        .call("PUT", &assign_uri, Some(&admin), Some(json!({ "staffId": staff_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["complaint"]["assignee"]["email"], "sam@example.com");
}

#[tokio::test]
async fn test_admin_account_management() {
    let app = TestApp::new().await;
    let (admin_id, admin) = app.account("Ada Admin", "ada@example.com", Role::Admin).await;
    let (user_id, user) = app.account("John Doe", "john@example.com", Role::User).await;
    let (_, staff) = app.account("Sam Staff", "sam@example.com", Role::Staff).await;

    let (status, body) = app
        .call("POST", "/api/complaints", Some(&user), Some(complaint_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let complaint_uri = format!(
        "/api/complaints/{}",
        body["data"]["complaint"]["id"].as_str().unwrap()
    );

    // non-admins are kept out
    for uri in ["/api/admin/analytics", "/api/admin/users", "/api/admin/staff"] {
        assert_eq!(app.call("GET", uri, Some(&staff), None).await.0, StatusCode::FORBIDDEN);
        assert_eq!(app.call("GET", uri, Some(&user), None).await.0, StatusCode::FORBIDDEN);
    }

    let (status, body) = app.call("GET", "/api/admin/analytics", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["overview"]["totalComplaints"], 1);
    assert_eq!(data["overview"]["totalUsers"], 3);
    assert_eq!(data["overview"]["recentComplaints"], 1);
    assert_eq!(data["statusBreakdown"]["pending"], 1);
    assert_eq!(data["categoryBreakdown"][0]["name"], "Academic");
    assert_eq!(data["userRoleBreakdown"]["admin"], 1);
    assert_eq!(data["complaintsTrend"].as_array().unwrap().len(), 1);

    let (_, body) = app.call("GET", "/api/admin/staff", Some(&admin), None).await;
    assert_eq!(body["data"]["staff"].as_array().unwrap().len(), 2);

    let (_, body) = app
        .call("GET", "/api/admin/users?role=staff", Some(&admin), None)
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["users"][0]["email"], "sam@example.com");
    let (status, _) = app
        .call("GET", "/api/admin/users?role=wizard", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let user_uri = format!("/api/admin/users/{}", user_id);
    let (_, body) = app.call("GET", &user_uri, Some(&admin), None).await;
    assert_eq!(body["data"]["statistics"]["totalComplaints"], 1);
    assert_eq!(body["data"]["statistics"]["pendingComplaints"], 1);

    // self-protection
    let self_uri = format!("/api/admin/users/{}", admin_id);
    let (status, body) = app
        .call("PUT", &format!("{}/role", self_uri), Some(&admin), Some(json!({ "role": "user" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot change your own role");
    let (status, _) = app
        .call("PUT", &format!("{}/toggle-status", self_uri), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.call("DELETE", &self_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // role changes
    let (status, _) = app
        .call("PUT", &format!("{}/role", user_uri), Some(&admin), Some(json!({ "role": "boss" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app
        .call("PUT", &format!("{}/role", user_uri), Some(&admin), Some(json!({ "role": "staff" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["role"], "staff");

    // deactivation locks the account out
    let (status, body) = app
        .call("PUT", &format!("{}/toggle-status", user_uri), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deactivated successfully");
    assert_eq!(
        app.call("GET", "/api/auth/me", Some(&user), None).await.0,
        StatusCode::UNAUTHORIZED
    );
    let (_, body) = app
        .call("PUT", &format!("{}/toggle-status", user_uri), Some(&admin), None)
        .await;
    assert_eq!(body["message"], "User activated successfully");

    // deleting the author leaves the complaint in place
    let (status, _) = app.call("DELETE", &user_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.call("GET", &user_uri, Some(&admin), None).await.0,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.call("GET", "/api/auth/me", Some(&user), None).await.0,
        StatusCode::UNAUTHORIZED
    );
    let (status, body) = app.call("GET", &complaint_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["complaint"]["userId"], user_id.as_str());
    assert!(body["data"]["complaint"].get("author").is_none());
}

#[tokio::test]
async fn test_rate_limit_applies_to_api_only() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let app = TestApp::with_config(config).await;

    assert_eq!(app.call("GET", "/api/health", None, None).await.0, StatusCode::OK);
    assert_eq!(app.call("GET", "/api/health", None, None).await.0, StatusCode::OK);
    let (status, body) = app.call("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["message"],
        "Too many requests from this IP, please try again later."
    );

    assert_eq!(app.call("GET", "/", None, None).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = test_config();
    config.server.max_body_bytes = 64;
    let app = TestApp::with_config(config).await;

    let payload = serde_json::to_vec(&json!({ "name": "x".repeat(200) })).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_oversized_body_without_length_rejected() {
    let mut config = test_config();
    config.server.max_body_bytes = 64;
    let app = TestApp::with_config(config).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "name": "x".repeat(200),
                "email": "long@example.com",
                "password": "hunter22"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Request body too large");
}
