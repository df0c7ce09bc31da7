mod auth;
mod chats;
mod comments;
mod error;
mod posts;
mod users;
pub mod ws;

use axum::{Router, extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

use crate::auth::AuthService;
use crate::db::Database;
use crate::pagination::Paginator;

pub use error::ApiError;
pub use ws::{ChatRooms, WsState};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    auth: AuthService,
    paginator: Paginator,
    rooms: ChatRooms,
) -> Router {
    let posts_state = posts::PostsState {
        db: db.clone(),
        auth: auth.clone(),
        paginator: paginator.clone(),
    };

    let comments_state = comments::CommentsState {
        db: db.clone(),
        auth: auth.clone(),
        paginator: paginator.clone(),
    };

    let chats_state = chats::ChatsState {
        db: db.clone(),
        auth: auth.clone(),
        paginator,
    };

    let ws_state = ws::WsState {
        auth: auth.clone(),
        rooms,
    };

    let users_state = users::UsersState {
        db,
        auth: auth.clone(),
    };

    Router::new()
        .nest("/auth", auth::router(auth))
        .nest("/posts", posts::router(posts_state))
        .nest("/posts/{post_id}/comments", comments::router(comments_state))
        .nest("/chats", chats::router(chats_state))
        .nest("/users", users::router(users_state))
        .merge(ws::router(ws_state))
}

/// Log method, path, status and elapsed time of every request.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}
