#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use circle_api::storage::Storage;
use circle_api::{AppState, AppStateInner};
use circle_db::Database;
use circle_gateway::{Dispatcher, PresenceTracker};

pub const JWT_SECRET: &str = "test-secret";
pub const PUBLIC_BASE: &str = "http://localhost:3000/storage";

/// The production router over an in-memory store and a throwaway storage dir.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    storage_root: PathBuf,
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let presence = PresenceTracker::new(db.clone(), dispatcher.clone());
        let storage_root = std::env::temp_dir().join(format!("circle-api-test-{}", Uuid::new_v4()));
        let storage = Storage::new(storage_root.clone(), PUBLIC_BASE).await.unwrap();

        let state: AppState = Arc::new(AppStateInner {
            db,
            dispatcher,
            presence,
            storage,
            jwt_secret: JWT_SECRET.to_string(),
        });

        Self {
            router: circle_api::router(state.clone()),
            state,
            storage_root,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(&user.token), None).await
    }

    pub async fn post(&self, uri: &str, user: &TestUser, body: Option<Value>) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(&user.token), body).await
    }

    pub async fn patch(&self, uri: &str, user: &TestUser, body: Value) -> (StatusCode, Value) {
        self.call(Method::PATCH, uri, Some(&user.token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &TestUser) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(&user.token), None).await
    }

    pub async fn register(&self, username: &str) -> TestUser {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(serde_json::json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "password123",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");

        TestUser {
            id: body["userId"].as_str().unwrap().parse().unwrap(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    /// Register both users and make them friends.
    pub async fn friends(&self, a: &str, b: &str) -> (TestUser, TestUser) {
        let a = self.register(a).await;
        let b = self.register(b).await;
        let (status, _) = self.post(&format!("/friends/requests/{}", b.id), &a, None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = self.post(&format!("/friends/requests/{}/accept", a.id), &b, None).await;
        assert_eq!(status, StatusCode::OK);
        (a, b)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.storage_root);
    }
}
