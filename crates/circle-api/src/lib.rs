pub mod auth;
pub mod error;
pub mod friends;
pub mod gateway;
pub mod health;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod presence;
pub mod state;
pub mod storage;
pub mod users;
pub mod views;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};

/// The full HTTP surface: public auth/health/storage routes, bearer-protected
/// REST routes, and the WebSocket gateway.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health::health))
        .route("/storage/{bucket}/{path}", get(storage::serve_object))
        .route("/gateway", get(gateway::ws_upgrade));

    let upload_routes = Router::new()
        .route("/users/me/avatar", post(storage::upload_avatar))
        .route("/posts/images", post(storage::upload_post_image))
        .layer(DefaultBodyLimit::max(storage::MAX_UPLOAD_SIZE));

    let protected_routes = Router::new()
        // Users
        .route("/users/me", get(users::get_me).patch(users::update_me).delete(users::delete_me))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/posts", get(users::list_user_posts))
        // Friends
        .route("/friends", get(friends::list_friends))
        .route("/friends/counts", get(friends::counts))
        .route("/friends/suggestions", get(friends::suggestions))
        .route("/friends/status/{user_id}", get(friends::friendship_status))
        .route("/friends/requests/received", get(friends::list_received))
        .route("/friends/requests/sent", get(friends::list_sent))
        .route(
            "/friends/requests/{user_id}",
            post(friends::send_request).delete(friends::cancel_request),
        )
        .route("/friends/requests/{user_id}/accept", post(friends::accept_request))
        .route("/friends/requests/{user_id}/reject", post(friends::reject_request))
        .route("/friends/{user_id}", delete(friends::remove_friend))
        // Posts
        .route("/posts", post(posts::create_post))
        .route("/posts/feed", get(posts::feed))
        .route(
            "/posts/{id}",
            get(posts::get_post).patch(posts::update_post).delete(posts::delete_post),
        )
        .route("/posts/{id}/like", post(posts::like_post).delete(posts::unlike_post))
        .route(
            "/posts/{id}/comments",
            get(posts::list_comments).post(posts::create_comment),
        )
        .route("/comments/{id}", delete(posts::delete_comment))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        // Presence
        .route("/presence/online", post(presence::go_online))
        .route("/presence/offline", post(presence::go_offline))
        .route("/presence/{user_id}", get(presence::get_status))
        .merge(upload_routes)
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
