//! End-to-end checks of the shared web pieces mounted on a small router.

#![allow(clippy::unwrap_used)]

use axum::{
    Json, Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue, StatusCode, header},
    routing::get,
};
use axum_test::TestServer;
use eventhaiti_web::{
    AdminUser, AppError, AuthenticatedUser, CORRELATION_ID_HEADER, Identity, IdentityError,
    IdentityVerifier, correlation_id_layer, handlers::health_check,
};
use std::sync::Arc;

struct StaticVerifier;

impl IdentityVerifier for StaticVerifier {
    fn verify_id_token(&self, token: &str) -> Result<Identity, IdentityError> {
        match token {
            "organizer-token" => Ok(Identity { uid: "org_1".to_string(), is_admin: false }),
            "admin-token" => Ok(Identity { uid: "admin_1".to_string(), is_admin: true }),
            "stale-token" => Err(IdentityError::Expired),
            _ => Err(IdentityError::Invalid("unknown token".to_string())),
        }
    }

    fn verify_session_cookie(&self, cookie: &str) -> Result<Identity, IdentityError> {
        if cookie == "session-org_1" {
            Ok(Identity { uid: "org_1".to_string(), is_admin: false })
        } else {
            Err(IdentityError::Invalid("unknown cookie".to_string()))
        }
    }
}

#[derive(Clone)]
struct TestState {
    verifier: Arc<dyn IdentityVerifier>,
}

impl FromRef<TestState> for Arc<dyn IdentityVerifier> {
    fn from_ref(state: &TestState) -> Self {
        Arc::clone(&state.verifier)
    }
}

async fn whoami(AuthenticatedUser(identity): AuthenticatedUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "uid": identity.uid }))
}

async fn admin_only(AdminUser(identity): AdminUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "uid": identity.uid }))
}

async fn always_conflict() -> Result<Json<()>, AppError> {
    Err(AppError::conflict("Request already submitted"))
}

fn server() -> TestServer {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/whoami", get(whoami))
        .route("/api/admin", get(admin_only))
        .route("/api/conflict", get(always_conflict))
        .layer(correlation_id_layer())
        .with_state(TestState { verifier: Arc::new(StaticVerifier) });
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = server().get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
    assert!(response.headers().contains_key(HeaderName::from_static("x-correlation-id")));
    assert_eq!(CORRELATION_ID_HEADER.to_ascii_lowercase(), "x-correlation-id");
}

#[tokio::test]
async fn bearer_token_identifies_the_caller() {
    let response = server()
        .get("/api/whoami")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer organizer-token"))
        .await;
    response.assert_status_ok();
    response.assert_json(&serde_json::json!({ "uid": "org_1" }));
}

#[tokio::test]
async fn session_cookie_identifies_the_caller() {
    let response = server()
        .get("/api/whoami")
        .add_header(header::COOKIE, HeaderValue::from_static("__session=session-org_1"))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn expired_tokens_are_401_with_error_body() {
    let response = server()
        .get("/api/whoami")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer stale-token"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["error"], "Token expired");
}

#[tokio::test]
async fn admin_route_refuses_organizers() {
    let response = server()
        .get("/api/admin")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer organizer-token"))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    let admin = server()
        .get("/api/admin")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer admin-token"))
        .await;
    admin.assert_status_ok();
}

#[tokio::test]
async fn handler_errors_use_the_shared_body() {
    let response = server().get("/api/conflict").await;
    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Request already submitted");
}
