//! Posts API.
//!
//! Reads are public. Writes need an access token, and updates or deletes
//! additionally need the caller to be the author (or an admin).

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use serde::Deserialize;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    AuthService, CurrentUser, Guard, OwnershipGuard, OwnershipGuardState, bearer_guard,
    ownership_guard,
};
use crate::db::Database;
use crate::pagination::{PageRequest, Paginator};

/// State for posts endpoints.
#[derive(Clone)]
pub struct PostsState {
    pub db: Database,
    pub auth: AuthService,
    pub paginator: Paginator,
}

pub fn router(state: PostsState) -> Router {
    let access = from_fn_with_state(Guard::access(state.auth.clone()), bearer_guard);
    let owner = from_fn_with_state(
        OwnershipGuardState {
            db: state.db.clone(),
            kind: OwnershipGuard::Post,
        },
        ownership_guard,
    );

    Router::new()
        .route("/", get(list_posts))
        .route("/", post(create_post).route_layer(access.clone()))
        .route("/{post_id}", get(get_post))
        .route(
            "/{post_id}",
            patch(update_post)
                .route_layer(owner.clone())
                .route_layer(access.clone()),
        )
        .route(
            "/{post_id}",
            delete(delete_post).route_layer(owner).route_layer(access),
        )
        .with_state(state)
}

// --- Request types ---

#[derive(Deserialize)]
struct CreatePostRequest {
    title: String,
    content: String,
    /// Storage paths of images uploaded beforehand
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Deserialize)]
struct UpdatePostRequest {
    title: Option<String>,
    content: Option<String>,
}

// --- Handlers ---

async fn list_posts(
    State(state): State<PostsState>,
    Query(request): Query<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    let page = state
        .paginator
        .paginate(&request, &state.db.posts(), "/posts")
        .await
        .db_err("Failed to list posts")?;

    Ok(Json(page))
}

async fn get_post(
    State(state): State<PostsState>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state
        .db
        .posts()
        .get(post_id)
        .await
        .db_err("Failed to get post")?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    Ok(Json(post))
}

async fn create_post(
    State(state): State<PostsState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }

    let posts = state.db.posts();
    let id = posts
        .create(user.id, &payload.title, &payload.content, &payload.images)
        .await
        .db_err("Failed to create post")?;

    let post = posts
        .get(id)
        .await
        .db_err("Failed to load created post")?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<PostsState>,
    Path(post_id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state.db.posts();
    let updated = posts
        .update(post_id, payload.title.as_deref(), payload.content.as_deref())
        .await
        .db_err("Failed to update post")?;

    if !updated {
        return Err(ApiError::not_found("Post not found"));
    }

    let post = posts
        .get(post_id)
        .await
        .db_err("Failed to load updated post")?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    Ok(Json(post))
}

async fn delete_post(
    State(state): State<PostsState>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .posts()
        .delete(post_id)
        .await
        .db_err("Failed to delete post")?;

    if !deleted {
        return Err(ApiError::not_found("Post not found"));
    }

    Ok(Json(serde_json::json!({ "id": post_id })))
}
