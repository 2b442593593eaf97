// Integration tests for the token lifecycle
//
// These exercise the full interceptor chain against a mock backend:
// proactive refresh, reactive 401 recovery, single-flight coordination,
// and the teardown cascade.

use base64::Engine;
use chrono::Utc;
use mockito::Matcher;

use flashdeck_api::auth::CredentialPair;
use flashdeck_api::config::AuthConfig;
use flashdeck_api::error::ApiError;
use flashdeck_api::http_client::{ApiClient, RequestContext};
use flashdeck_api::session::SessionEvent;

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Forge a decodable access token expiring at the given epoch second
fn forge_token(exp: i64) -> String {
    format!(
        "{}.{}.{}",
        b64(br#"{"alg":"HS256","typ":"JWT"}"#),
        b64(format!(r#"{{"sub":"user-1","exp":{}}}"#, exp).as_bytes()),
        b64(b"signature")
    )
}

/// Build a client against the mock server with an in-memory store
fn test_client(server: &mockito::Server) -> ApiClient {
    let mut config = AuthConfig::default();
    config.api_base_url = server.url();
    ApiClient::new(config).expect("Failed to create test client")
}

/// Seed the client with a credential pair and an active session
fn sign_in(client: &ApiClient, access_token: &str, refresh_token: &str) {
    client.store().replace(CredentialPair {
        access_token: access_token.to_string(),
        refresh_token: Some(refresh_token.to_string()),
    });
    client.session().mark_active();
}

fn refresh_body(access_token: &str) -> String {
    format!(
        r#"{{"access_token":"{}","refresh_token":"refresh-2"}}"#,
        access_token
    )
}

// ==================================================================================================
// Proactive refresh (request interceptor)
// ==================================================================================================

#[tokio::test]
async fn token_near_expiry_is_refreshed_before_send() {
    let mut server = mockito::Server::new_async().await;
    let stale = forge_token(Utc::now().timestamp() + 10); // inside the 30s buffer
    let fresh = forge_token(Utc::now().timestamp() + 3600);

    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .match_query(Matcher::UrlEncoded(
            "refresh_token".into(),
            "refresh-1".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(refresh_body(&fresh))
        .expect(1)
        .create_async()
        .await;

    let api_mock = server
        .mock("GET", "/decks")
        .match_header("authorization", format!("Bearer {}", fresh).as_str())
        .with_status(200)
        .with_body(r#"{"decks":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    sign_in(&client, &stale, "refresh-1");

    let request = client
        .request(reqwest::Method::GET, "/decks")
        .build()
        .unwrap();
    let response = client.execute(request, RequestContext::new()).await.unwrap();

    assert_eq!(response.status(), 200);
    refresh_mock.assert_async().await;
    api_mock.assert_async().await;

    // The store holds the replaced pair
    assert_eq!(client.store().access_token().as_deref(), Some(fresh.as_str()));
    assert_eq!(client.store().refresh_token().as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let mut server = mockito::Server::new_async().await;
    let expired = forge_token(Utc::now().timestamp() - 100);
    let fresh = forge_token(Utc::now().timestamp() + 3600);

    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(refresh_body(&fresh))
        .expect(1)
        .create_async()
        .await;

    let api_mock = server
        .mock("GET", "/decks")
        .match_header("authorization", format!("Bearer {}", fresh).as_str())
        .with_status(200)
        .with_body(r#"{"decks":[]}"#)
        .expect(3)
        .create_async()
        .await;

    let client = test_client(&server);
    sign_in(&client, &expired, "refresh-1");

    let build = || {
        client
            .request(reqwest::Method::GET, "/decks")
            .build()
            .unwrap()
    };
    let (a, b, c) = tokio::join!(
        client.execute(build(), RequestContext::new()),
        client.execute(build(), RequestContext::new()),
        client.execute(build(), RequestContext::new())
    );

    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);
    assert_eq!(c.unwrap().status(), 200);
    refresh_mock.assert_async().await;
    api_mock.assert_async().await;
}

#[tokio::test]
async fn unauthenticated_request_passes_through_without_header() {
    let mut server = mockito::Server::new_async().await;
    let api_mock = server
        .mock("GET", "/decks/public")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);

    let request = client
        .request(reqwest::Method::GET, "/decks/public")
        .build()
        .unwrap();
    let response = client.execute(request, RequestContext::new()).await.unwrap();

    assert_eq!(response.status(), 200);
    api_mock.assert_async().await;
}

// ==================================================================================================
// Reactive recovery (response interceptor)
// ==================================================================================================

#[tokio::test]
async fn rejected_request_is_retried_once_after_refresh() {
    let mut server = mockito::Server::new_async().await;
    // Valid by expiry, rejected by the server anyway
    let revoked = forge_token(Utc::now().timestamp() + 3600);
    let fresh = forge_token(Utc::now().timestamp() + 7200);

    let rejected_mock = server
        .mock("GET", "/decks")
        .match_header("authorization", format!("Bearer {}", revoked).as_str())
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let accepted_mock = server
        .mock("GET", "/decks")
        .match_header("authorization", format!("Bearer {}", fresh).as_str())
        .with_status(200)
        .with_body(r#"{"decks":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(refresh_body(&fresh))
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    sign_in(&client, &revoked, "refresh-1");

    let request = client
        .request(reqwest::Method::GET, "/decks")
        .build()
        .unwrap();
    let response = client.execute(request, RequestContext::new()).await.unwrap();

    // The caller sees one successful result and no trace of the recovery
    assert_eq!(response.status(), 200);
    rejected_mock.assert_async().await;
    accepted_mock.assert_async().await;
    refresh_mock.assert_async().await;
    assert!(client.session().is_active());
}

#[tokio::test]
async fn retry_is_capped_at_one_attempt() {
    let mut server = mockito::Server::new_async().await;
    let token = forge_token(Utc::now().timestamp() + 3600);
    let fresh = forge_token(Utc::now().timestamp() + 7200);

    // The server rejects the original and the retry alike
    let api_mock = server
        .mock("GET", "/decks")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(refresh_body(&fresh))
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    sign_in(&client, &token, "refresh-1");

    let request = client
        .request(reqwest::Method::GET, "/decks")
        .build()
        .unwrap();
    let response = client.execute(request, RequestContext::new()).await.unwrap();

    // The second 401 is terminal and surfaced unchanged
    assert_eq!(response.status(), 401);
    api_mock.assert_async().await;
    refresh_mock.assert_async().await;
}

#[tokio::test]
async fn auth_endpoints_never_trigger_recovery() {
    let mut server = mockito::Server::new_async().await;

    let login_mock = server
        .mock("POST", "/auth/login")
        .match_header("authorization", Matcher::Missing)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = test_client(&server);
    sign_in(&client, &forge_token(Utc::now().timestamp() + 3600), "refresh-1");

    let request = client
        .request(reqwest::Method::POST, "/auth/login")
        .build()
        .unwrap();
    let response = client
        .execute(request, RequestContext::for_auth_endpoint())
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    login_mock.assert_async().await;
    refresh_mock.assert_async().await;
}

// ==================================================================================================
// Teardown cascade
// ==================================================================================================

#[tokio::test]
async fn unrecoverable_refresh_tears_the_session_down() {
    let mut server = mockito::Server::new_async().await;
    let expired = forge_token(Utc::now().timestamp() - 100);

    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .expect(1)
        .create_async()
        .await;

    // The business request must never reach the network
    let api_mock = server
        .mock("GET", "/decks")
        .expect(0)
        .create_async()
        .await;

    let client = test_client(&server);
    sign_in(&client, &expired, "revoked-refresh");
    let mut events = client.session().subscribe();

    let request = client
        .request(reqwest::Method::GET, "/decks")
        .build()
        .unwrap();
    let result = client.execute(request, RequestContext::new()).await;

    assert!(matches!(result, Err(ApiError::Auth(_))));
    refresh_mock.assert_async().await;
    api_mock.assert_async().await;

    // Credentials are gone and "session ended" was signaled exactly once
    assert!(client.store().pair().is_none());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Ended {
            redirect_to: Some("/sign-in".to_string())
        }
    );
    assert!(events.try_recv().is_err());

    // A later explicit sign-out finds nothing left to do
    client.sign_out();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn sign_out_is_idempotent() {
    let server = mockito::Server::new_async().await;
    let client = test_client(&server);
    sign_in(&client, &forge_token(Utc::now().timestamp() + 3600), "refresh-1");
    let mut events = client.session().subscribe();

    client.sign_out();
    client.sign_out();

    assert!(client.store().pair().is_none());
    assert!(matches!(
        events.try_recv().unwrap(),
        SessionEvent::Ended { .. }
    ));
    assert!(events.try_recv().is_err());
}

// ==================================================================================================
// Login
// ==================================================================================================

#[tokio::test]
async fn login_stores_the_pair_and_activates_the_session() {
    let mut server = mockito::Server::new_async().await;
    let access = forge_token(Utc::now().timestamp() + 3600);

    let login_mock = server
        .mock("POST", "/auth/login")
        .match_body(Matcher::JsonString(
            r#"{"username":"ada","password":"hunter2"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token":"{}","refresh_token":"refresh-1"}}"#,
            access
        ))
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    client.login("ada", "hunter2").await.unwrap();

    login_mock.assert_async().await;
    assert_eq!(client.store().access_token().as_deref(), Some(access.as_str()));
    assert_eq!(client.store().refresh_token().as_deref(), Some("refresh-1"));
    assert!(client.session().is_active());
    assert_eq!(
        client.current_user().and_then(|c| c.sub),
        Some("user-1".to_string())
    );
}

#[tokio::test]
async fn failed_login_surfaces_an_auth_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/login")
        .with_status(401)
        .create_async()
        .await;

    let client = test_client(&server);
    let result = client.login("ada", "wrong").await;

    assert!(matches!(result, Err(ApiError::Auth(_))));
    assert!(client.store().pair().is_none());
}
