mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "ana", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], ana.id.to_string());
    assert_eq!(body["username"], "ana");
    assert!(body["token"].is_string());

    let (status, me) = app.get("/users/me", &ana).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ana@example.com");
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_unauthorized() {
    let app = TestApp::new().await;
    app.register("ana").await;

    for creds in [
        json!({ "username": "ana", "password": "wrong-password" }),
        json!({ "username": "nobody", "password": "password123" }),
    ] {
        let (status, body) = app.call(Method::POST, "/auth/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn duplicate_username_or_email_conflicts() {
    let app = TestApp::new().await;
    app.register("ana").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "ana", "email": "other@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("username"));

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "anna", "email": "ana@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn invalid_registration_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "al", "email": "al@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = TestApp::new().await;

    let (status, _) = app.call(Method::GET, "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/users/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_store() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["dbHealthy"], true);
}

#[tokio::test]
async fn profile_update_and_account_deletion() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    let bea = app.register("bea").await;

    let (status, me) = app
        .patch("/users/me", &ana, json!({ "displayName": "Ana", "bio": "hi" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["displayName"], "Ana");
    assert_eq!(me["bio"], "hi");

    // Other users see the profile without the email.
    let (status, seen) = app.get(&format!("/users/{}", ana.id), &bea).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["displayName"], "Ana");
    assert!(seen.get("email").is_none());

    let (status, _) = app.delete("/users/me", &ana).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&format!("/users/{}", ana.id), &bea).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
