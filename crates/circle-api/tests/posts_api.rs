mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn create_get_update_delete_post() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    let bea = app.register("bea").await;

    let (status, _) = app.post("/posts", &ana, Some(json!({ "content": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, post) = app.post("/posts", &ana, Some(json!({ "content": "hello" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["authorUsername"], "ana");
    assert_eq!(post["likesCount"], 0);
    let uri = format!("/posts/{}", post["id"].as_str().unwrap());

    let (status, _) = app.patch(&uri, &bea, json!({ "content": "hijacked" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, edited) = app.patch(&uri, &ana, json!({ "content": "hello again" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["content"], "hello again");

    let (status, _) = app.delete(&uri, &bea).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, &ana).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&uri, &ana).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn like_then_unlike_restores_count() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    let bea = app.register("bea").await;
    let (_, post) = app.post("/posts", &ana, Some(json!({ "content": "hello" }))).await;
    let like_uri = format!("/posts/{}/like", post["id"].as_str().unwrap());

    let (status, liked) = app.post(&like_uri, &bea, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked["liked"], true);
    assert_eq!(liked["likesCount"], 1);

    let (status, _) = app.post(&like_uri, &bea, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, seen) = app.get(&format!("/posts/{}", post["id"].as_str().unwrap()), &bea).await;
    assert_eq!(seen["likedByMe"], true);
    assert_eq!(seen["likesCount"], 1);

    let (status, unliked) = app.delete(&like_uri, &bea).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unliked["likesCount"], 0);

    let (status, _) = app.delete(&like_uri, &bea).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.post(&format!("/posts/{}/like", uuid::Uuid::new_v4()), &bea, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_update_counter_and_respect_author() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    let bea = app.register("bea").await;
    let (_, post) = app.post("/posts", &ana, Some(json!({ "content": "hello" }))).await;
    let post_uri = format!("/posts/{}", post["id"].as_str().unwrap());

    let (status, comment) = app
        .post(&format!("{}/comments", post_uri), &bea, Some(json!({ "content": "nice" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["authorUsername"], "bea");

    let (_, seen) = app.get(&post_uri, &ana).await;
    assert_eq!(seen["commentsCount"], 1);

    let (_, listed) = app.get(&format!("{}/comments", post_uri), &ana).await;
    assert_eq!(listed["data"][0]["content"], "nice");

    let comment_uri = format!("/comments/{}", comment["id"].as_str().unwrap());
    let (status, _) = app.delete(&comment_uri, &ana).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&comment_uri, &bea).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, seen) = app.get(&post_uri, &ana).await;
    assert_eq!(seen["commentsCount"], 0);
}

#[tokio::test]
async fn feed_shows_own_and_friends_posts() {
    let app = TestApp::new().await;
    let (ana, bea) = app.friends("ana", "bea").await;
    let cat = app.register("cat").await;

    app.post("/posts", &ana, Some(json!({ "content": "from ana" }))).await;
    app.post("/posts", &bea, Some(json!({ "content": "from bea" }))).await;
    app.post("/posts", &cat, Some(json!({ "content": "from cat" }))).await;

    let (_, feed) = app.get("/posts/feed", &ana).await;
    let authors: HashSet<&str> = feed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["authorUsername"].as_str().unwrap())
        .collect();
    assert_eq!(authors, HashSet::from(["ana", "bea"]));

    let (_, cats) = app.get(&format!("/users/{}/posts", cat.id), &ana).await;
    assert_eq!(cats["data"][0]["content"], "from cat");
}

#[tokio::test]
async fn feed_pages_do_not_overlap() {
    let app = TestApp::new().await;
    let ana = app.register("ana").await;
    for i in 0..5 {
        app.post("/posts", &ana, Some(json!({ "content": format!("post {}", i) }))).await;
    }

    let (_, first) = app.get("/posts/feed?limit=3", &ana).await;
    let cursor = first["meta"]["nextCursor"].as_str().unwrap().to_string();
    let (_, second) = app.get(&format!("/posts/feed?limit=3&lastCursor={}", cursor), &ana).await;

    let ids = |page: &serde_json::Value| -> Vec<String> {
        page["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap().to_string())
            .collect()
    };
    let first_ids = ids(&first);
    let second_ids = ids(&second);
    assert_eq!(first_ids.len(), 3);
    assert_eq!(second_ids.len(), 2);
    assert!(second_ids.iter().all(|id| !first_ids.contains(id)));
    assert!(second["meta"]["nextCursor"].is_null());
}
