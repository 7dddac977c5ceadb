// Integration tests for Smartflo Dialer
//
// These tests drive the full HTTP stack (routing, middleware, handlers,
// token management and persistence) against a mocked Smartflo API.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

use smartflo_dialer::{
    auth::ServiceIdentity,
    client::TokenManagedClient,
    config::Config,
    models::records::{CallLog, Lead, User},
    routes::{self, AppState},
    store::{Repository, SqliteRepository},
};

const API_KEY: &str = "integration-key";

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn test_config(base_url: &str, with_identity: bool) -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 4000,
        proxy_api_key: API_KEY.to_string(),
        smartflo_base_url: base_url.to_string(),
        smartflo_identity: with_identity.then(|| ServiceIdentity {
            email: "ops@example.com".to_string(),
            password: "hunter2".to_string(),
        }),
        default_caller_id: Some("08012345".to_string()),
        token_safety_margin: 300,
        login_timeout: 5,
        http_max_connections: 20,
        http_connect_timeout: 5,
        http_request_timeout: 5,
        database_file: PathBuf::from(":memory:"),
        cors_origins: vec![],
        log_level: "info".to_string(),
    }
}

struct TestApp {
    router: Router,
    repository: Arc<SqliteRepository>,
}

fn create_test_app(base_url: &str, with_identity: bool) -> TestApp {
    let config = test_config(base_url, with_identity);
    let repository = Arc::new(SqliteRepository::open_in_memory().expect("in-memory database"));

    let dialer = config.smartflo_identity.clone().map(|identity| {
        Arc::new(TokenManagedClient::new(
            reqwest::Client::new(),
            &config.client_settings(),
            identity,
        ))
    });

    let state = AppState {
        config: Arc::new(config),
        repository: repository.clone(),
        dialer,
    };

    TestApp {
        router: routes::build_router(state),
        repository,
    }
}

/// Lead with a phone number and an agent mapped to Smartflo
async fn seed_lead_and_agent(repository: &SqliteRepository) -> (Lead, User) {
    let lead = Lead::new(Some("9876543210".to_string()));
    repository.save_lead(&lead).await.unwrap();

    let user = User {
        id: "agent-1".to_string(),
        username: "asha".to_string(),
        email: Some("asha@example.com".to_string()),
        smartflo_enabled: true,
        smartflo_agent_number: Some("100".to_string()),
    };
    repository.save_user(&user).await.unwrap();

    (lead, user)
}

async fn mock_login(server: &mut ServerGuard, expected: usize) -> mockito::Mock {
    server
        .mock("POST", "/auth/login")
        .match_body(Matcher::Json(json!({
            "email": "ops@example.com",
            "password": "hunter2"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"live-token","expires_in":3600}"#)
        .expect(expected)
        .create_async()
        .await
}

fn click_to_call_request(lead_id: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/dialer/click-to-call")
        .header("x-api-key", API_KEY)
        .header("x-user-id", user_id)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "leadId": lead_id }).to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY))
        .header("x-user-id", "agent-1")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ==================================================================================================
// Health and Authentication
// ==================================================================================================

#[tokio::test]
async fn test_health_endpoints_need_no_auth() {
    let app = create_test_app("http://127.0.0.1:1", false);

    for uri in ["/", "/health"] {
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_dialer_routes_require_api_key() {
    let app = create_test_app("http://127.0.0.1:1", false);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api/dialer/call-logs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "unauthorized");
}

#[tokio::test]
async fn test_dialer_routes_require_user_id() {
    let app = create_test_app("http://127.0.0.1:1", false);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api/dialer/call-logs")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ==================================================================================================
// Click-to-call
// ==================================================================================================

#[tokio::test]
async fn test_click_to_call_without_identity_is_config_missing() {
    let app = create_test_app("http://127.0.0.1:1", false);
    let (lead, user) = seed_lead_and_agent(&app.repository).await;

    let response = app
        .router
        .oneshot(click_to_call_request(&lead.id, &user.id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "config_missing");
}

#[tokio::test]
async fn test_click_to_call_unknown_lead() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, 0).await;
    let app = create_test_app(&server.url(), true);
    seed_lead_and_agent(&app.repository).await;

    let response = app
        .router
        .oneshot(click_to_call_request("no-such-lead", "agent-1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    login.assert_async().await;
}

#[tokio::test]
async fn test_click_to_call_unmapped_agent() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, 0).await;
    let app = create_test_app(&server.url(), true);
    let (lead, mut user) = seed_lead_and_agent(&app.repository).await;
    user.smartflo_enabled = false;
    app.repository.save_user(&user).await.unwrap();

    let response = app
        .router
        .oneshot(click_to_call_request(&lead.id, &user.id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    login.assert_async().await;
}

#[tokio::test]
async fn test_click_to_call_success_logs_call() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, 1).await;
    let call = server
        .mock("POST", "/click_to_call")
        .match_header("authorization", "Bearer live-token")
        .match_body(Matcher::PartialJson(json!({
            "agent_number": "100",
            "destination_number": "9876543210",
            "caller_id": "08012345",
            "async": 1
        })))
        .with_status(200)
        .with_body(r#"{"success":true,"call_id":"sf-991"}"#)
        .create_async()
        .await;

    let app = create_test_app(&server.url(), true);
    let (lead, user) = seed_lead_and_agent(&app.repository).await;

    let response = app
        .router
        .oneshot(click_to_call_request(&lead.id, &user.id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["providerCallId"], "sf-991");
    let custom_identifier = body["customIdentifier"].as_str().unwrap();
    assert!(custom_identifier.starts_with(&format!("CRM_{}_", lead.id)));

    let history = app.repository.lead_call_history(&lead.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].call_status, "initiated");
    assert_eq!(history[0].provider_call_id.as_deref(), Some("sf-991"));
    assert_eq!(history[0].id, body["callLogId"].as_str().unwrap());

    let lead = app.repository.find_lead(&lead.id).await.unwrap().unwrap();
    assert_eq!(lead.total_calls_made, 1);
    assert_eq!(lead.last_call_status.as_deref(), Some("initiated"));

    login.assert_async().await;
    call.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_calls_share_one_login() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, 1).await;
    let call = server
        .mock("POST", "/click_to_call")
        .match_header("authorization", "Bearer live-token")
        .with_status(200)
        .with_body(r#"{"call_id":"sf-1"}"#)
        .expect(5)
        .create_async()
        .await;

    let app = create_test_app(&server.url(), true);
    let (lead, user) = seed_lead_and_agent(&app.repository).await;

    let requests = (0..5).map(|_| {
        app.router
            .clone()
            .oneshot(click_to_call_request(&lead.id, &user.id))
    });
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }

    let history = app.repository.lead_call_history(&lead.id, 10).await.unwrap();
    assert_eq!(history.len(), 5);

    login.assert_async().await;
    call.assert_async().await;
}

#[tokio::test]
async fn test_persistent_rejection_stops_after_one_retry() {
    let mut server = Server::new_async().await;
    // Initial login plus the one re-login after the first 401
    let login = mock_login(&mut server, 2).await;
    let call = server
        .mock("POST", "/click_to_call")
        .with_status(401)
        .with_body(r#"{"message":"token revoked"}"#)
        .expect(2)
        .create_async()
        .await;

    let app = create_test_app(&server.url(), true);
    let (lead, user) = seed_lead_and_agent(&app.repository).await;

    let response = app
        .router
        .oneshot(click_to_call_request(&lead.id, &user.id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "auth_persistently_rejected");

    // Nothing is logged for a call that never went out
    let history = app.repository.lead_call_history(&lead.id, 10).await.unwrap();
    assert!(history.is_empty());

    login.assert_async().await;
    call.assert_async().await;
}

#[tokio::test]
async fn test_login_rejection_surfaces_as_auth_failure() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/auth/login")
        .with_status(401)
        .with_body(r#"{"message":"Invalid credentials"}"#)
        .expect(1)
        .create_async()
        .await;
    let call = server
        .mock("POST", "/click_to_call")
        .expect(0)
        .create_async()
        .await;

    let app = create_test_app(&server.url(), true);
    let (lead, user) = seed_lead_and_agent(&app.repository).await;

    let response = app
        .router
        .oneshot(click_to_call_request(&lead.id, &user.id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "auth_acquisition_failed");
    assert!(!body.to_string().contains("hunter2"));

    login.assert_async().await;
    call.assert_async().await;
}

#[tokio::test]
async fn test_remote_error_keeps_status_and_payload() {
    let mut server = Server::new_async().await;
    let _login = mock_login(&mut server, 1).await;
    let _mock = server
        .mock("POST", "/click_to_call")
        .with_status(422)
        .with_body(r#"{"message":"agent busy","code":"AGENT_BUSY"}"#)
        .create_async()
        .await;

    let app = create_test_app(&server.url(), true);
    let (lead, user) = seed_lead_and_agent(&app.repository).await;

    let response = app
        .router
        .oneshot(click_to_call_request(&lead.id, &user.id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "remote_service_error");
    assert_eq!(body["providerError"]["code"], "AGENT_BUSY");
}

// ==================================================================================================
// Call logs
// ==================================================================================================

#[tokio::test]
async fn test_call_logs_pagination() {
    let app = create_test_app("http://127.0.0.1:1", false);
    let (lead, user) = seed_lead_and_agent(&app.repository).await;

    for _ in 0..3 {
        let log = CallLog::outbound(&lead.id, &user.id, "100", "completed");
        app.repository.save_call_log(&log).await.unwrap();
    }
    let other = CallLog::outbound("other-lead", &user.id, "100", "missed");
    app.repository.save_call_log(&other).await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get_request(&format!(
            "/api/dialer/call-logs?leadId={}&page=2&limit=2",
            lead.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({"total": 3, "page": 2, "limit": 2, "pages": 2})
    );

    let response = app
        .router
        .oneshot(get_request("/api/dialer/call-logs?status=missed"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["leadId"], "other-lead");
}

#[tokio::test]
async fn test_manual_log_then_history() {
    let app = create_test_app("http://127.0.0.1:1", false);
    let (lead, _) = seed_lead_and_agent(&app.repository).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/dialer/manual-log")
        .header("x-api-key", API_KEY)
        .header("x-user-id", "agent-1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "leadId": lead.id,
                "duration": 95,
                "disposition": "callback",
                "callStatus": "answered"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .oneshot(get_request(&format!("/api/dialer/call-logs/{}", lead.id)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["duration"], 95);
    assert_eq!(body["data"][0]["callStatus"], "answered");
    assert_eq!(body["data"][0]["agentNumber"], "100");
}

// ==================================================================================================
// Smartflo administration
// ==================================================================================================

#[tokio::test]
async fn test_connection_reports_failure_in_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/auth/login")
        .with_status(403)
        .with_body(r#"{"message":"Account locked"}"#)
        .create_async()
        .await;

    let app = create_test_app(&server.url(), true);
    let response = app
        .router
        .oneshot(get_request("/api/smartflo/test-connection"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("Account locked"));
}

#[tokio::test]
async fn test_campaign_status_update() {
    let mut server = Server::new_async().await;
    let _login = mock_login(&mut server, 1).await;
    let update = server
        .mock("PUT", "/campaign/77/status")
        .match_header("authorization", "Bearer live-token")
        .match_body(Matcher::Json(json!({"status": "stopped"})))
        .with_status(200)
        .with_body(r#"{"status":"stopped"}"#)
        .create_async()
        .await;

    let app = create_test_app(&server.url(), true);
    let request = Request::builder()
        .method("PUT")
        .uri("/api/smartflo/campaigns/77/status")
        .header("x-api-key", API_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"status":"stopped"}"#))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "stopped");
    update.assert_async().await;
}
