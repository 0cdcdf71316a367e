mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn likes_and_comments_notify_the_author() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    let bea = app.register("bea").await;
    let (_, post) = app.post("/posts", &ana, Some(json!({ "content": "hello" }))).await;
    let post_id = post["id"].as_str().unwrap();

    app.post(&format!("/posts/{}/like", post_id), &bea, None).await;
    app.post(&format!("/posts/{}/comments", post_id), &bea, Some(json!({ "content": "nice" })))
        .await;

    let (status, list) = app.get("/notifications", &ana).await;
    assert_eq!(status, StatusCode::OK);
    let items = list["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(list["meta"]["unreadCount"], 2);

    let kinds: Vec<&str> = items.iter().map(|n| n["type"].as_str().unwrap()).collect();
    assert!(kinds.contains(&"LIKE"));
    assert!(kinds.contains(&"COMMENT"));
    assert!(items.iter().all(|n| n["actorUsername"] == "bea" && n["read"] == false));
}

#[tokio::test]
async fn acting_on_own_post_writes_nothing() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    let (_, post) = app.post("/posts", &ana, Some(json!({ "content": "hello" }))).await;
    let post_id = post["id"].as_str().unwrap();

    app.post(&format!("/posts/{}/like", post_id), &ana, None).await;
    app.post(&format!("/posts/{}/comments", post_id), &ana, Some(json!({ "content": "me" })))
        .await;

    let (_, list) = app.get("/notifications", &ana).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 0);
    assert_eq!(list["meta"]["unreadCount"], 0);
}

#[tokio::test]
async fn mark_read_and_read_all() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    let bea = app.register("bea").await;
    for text in ["one", "two", "three"] {
        let (_, post) = app.post("/posts", &ana, Some(json!({ "content": text }))).await;
        app.post(&format!("/posts/{}/like", post["id"].as_str().unwrap()), &bea, None)
            .await;
    }

    let (_, list) = app.get("/notifications", &ana).await;
    let first_id = list["data"][0]["id"].as_str().unwrap().to_string();

    // Someone else's notification is not found.
    let (status, _) = app.post(&format!("/notifications/{}/read", first_id), &bea, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.post(&format!("/notifications/{}/read", first_id), &ana, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = app.get("/notifications", &ana).await;
    assert_eq!(list["meta"]["unreadCount"], 2);

    let (status, body) = app.post("/notifications/read-all", &ana, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 2);

    let (_, list) = app.get("/notifications", &ana).await;
    assert_eq!(list["meta"]["unreadCount"], 0);
}
