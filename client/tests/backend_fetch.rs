//! Auth and retry behavior of `BackendClient` against a mock backend.

#![allow(clippy::unwrap_used, clippy::panic)]

use eventhaiti_client::{BackendClient, ClientError, FilePart, StaticTokenSource, TokenFuture, TokenSource};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

fn verification_body() -> serde_json::Value {
    json!({
        "userId": "user_1",
        "status": "in_progress",
        "completionPercentage": 25,
        "missingRequiredSteps": ["governmentId", "selfie", "payoutSetup"],
        "steps": {},
        "files": {}
    })
}

struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization") && !request.headers.contains_key("x-firebase-token")
    }
}

/// Never resolves the auth state.
struct HangingTokens;

impl TokenSource for HangingTokens {
    fn current_user(&self) -> TokenFuture<'_, Option<String>> {
        Box::pin(std::future::pending())
    }

    fn id_token(&self, _force_refresh: bool) -> TokenFuture<'_, Result<String, ClientError>> {
        Box::pin(async { Err(ClientError::Token("unreachable".to_string())) })
    }
}

#[tokio::test]
async fn attaches_bearer_and_firebase_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/verification"))
        .and(header("authorization", "Bearer tok_1"))
        .and(header("x-firebase-token", "tok_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(verification_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(server.uri(), Arc::new(StaticTokenSource::signed_in("user_1", "tok_1")));
    let verification = client.get_verification().await.unwrap();

    assert_eq!(verification.status, "in_progress");
    assert_eq!(verification.completion_percentage, 25);
    assert_eq!(verification.missing_required_steps.len(), 3);
}

#[tokio::test]
async fn unauthorized_retries_once_with_a_refreshed_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/verification"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid token" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/verification"))
        .and(header("authorization", "Bearer fresh"))
        .and(header("x-firebase-token", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(verification_body()))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(StaticTokenSource::signed_in("user_1", "stale").with_refreshed("fresh"));
    let client = BackendClient::new(server.uri(), tokens.clone());

    client.get_verification().await.unwrap();
    assert_eq!(tokens.refresh_count(), 1);
    assert!(client.session_cookie().await.is_none());
}

#[tokio::test]
async fn second_unauthorized_falls_back_to_a_session_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/session"))
        .and(header("authorization", "Bearer tok_1"))
        .and(body_partial_json(json!({ "idToken": "tok_1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "__session=sess_abc; Path=/; HttpOnly; SameSite=Lax")
                .set_body_json(json!({ "status": "ok", "expiresIn": 432_000 })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/organizer/analytics"))
        .and(header("cookie", "__session=sess_abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "events": [], "totals": { "grossAmount": 0 } })),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/organizer/analytics"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(2)
        .expect(2)
        .mount(&server)
        .await;

    let tokens = Arc::new(StaticTokenSource::signed_in("user_1", "tok_1"));
    let client = BackendClient::new(server.uri(), tokens.clone());

    let analytics = client.analytics().await.unwrap();
    assert!(analytics.events.is_empty());
    assert_eq!(tokens.refresh_count(), 1);
    assert_eq!(client.session_cookie().await.as_deref(), Some("__session=sess_abc"));

    client.clear_session().await;
    assert!(client.session_cookie().await.is_none());
}

#[tokio::test]
async fn signed_out_unauthorized_is_returned_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/organizer/analytics"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "unauthorized",
            "error": "Missing authentication"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(StaticTokenSource::signed_out());
    let client = BackendClient::new(server.uri(), tokens.clone());

    let err = client.analytics().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(tokens.refresh_count(), 0);
}

#[tokio::test]
async fn unresolved_auth_state_sends_without_a_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reviews"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 0,
            "averageRating": null,
            "reviews": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(server.uri(), Arc::new(HangingTokens)).with_auth_wait(Duration::from_millis(20));
    let summary = client.event_reviews("evt_1").await.unwrap();

    assert_eq!(summary.count, 0);
    assert!(summary.average_rating.is_none());
}

#[tokio::test]
async fn error_bodies_become_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/staff/check-in"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "CONFLICT",
            "error": "Ticket already checked in",
            "details": { "checkedInAt": "2026-03-01T19:05:00Z" }
        })))
        .mount(&server)
        .await;

    let client = BackendClient::new(server.uri(), Arc::new(StaticTokenSource::signed_in("staff_1", "tok")));
    let err = client.check_in("evt_1", "tkt_1").await.unwrap_err();

    match err {
        ClientError::Api {
            status,
            code,
            message,
            details,
        } => {
            assert_eq!(status, 409);
            assert_eq!(code.as_deref(), Some("CONFLICT"));
            assert_eq!(message, "Ticket already checked in");
            assert_eq!(details.unwrap()["checkedInAt"], "2026-03-01T19:05:00Z");
        },
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn uploads_are_sent_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verification/files"))
        .and(body_string_contains("name=\"documentType\""))
        .and(body_string_contains("governmentIdFront"))
        .and(body_string_contains("filename=\"front.jpg\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(verification_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(server.uri(), Arc::new(StaticTokenSource::signed_in("user_1", "tok")));
    let file = FilePart {
        file_name: "front.jpg".to_string(),
        content_type: "image/jpeg".to_string(),
        bytes: vec![0xFF, 0xD8, 0xFF],
    };
    client
        .upload_verification_document("governmentIdFront", file)
        .await
        .unwrap();
}

#[tokio::test]
async fn unreachable_backend_carries_a_hint() {
    // Nothing listens on the discard port
    let client = BackendClient::new("http://127.0.0.1:9", Arc::new(StaticTokenSource::signed_out()));
    let err = client.event_reviews("evt_1").await.unwrap_err();

    match &err {
        ClientError::Network { hint, .. } => assert!(hint.is_some()),
        other => panic!("expected a network error, got {other:?}"),
    }
    assert!(err.to_string().contains("check your API URL"));
}
