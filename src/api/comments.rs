//! Comments API, nested under `/posts/{post_id}/comments`.

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

#[derive(Clone)]
pub struct CommentsState {
    pub db: Database,
    pub auth: AuthService,
    pub paginator: Paginator,
}

pub fn router(state: CommentsState) -> Router {
    let access = from_fn_with_state(Guard::access(state.auth.clone()), bearer_guard);
    let owner = from_fn_with_state(
        OwnershipGuardState {
            db: state.db.clone(),
            kind: OwnershipGuard::Comment,
        },
        ownership_guard,
    );

    Router::new()
        .route("/", get(list_comments))
        .route("/", post(create_comment).route_layer(access.clone()))
        .route("/{comment_id}", get(get_comment))
        .route(
            "/{comment_id}",
            patch(update_comment)
                .route_layer(owner.clone())
                .route_layer(access.clone()),
        )
        .route(
            "/{comment_id}",
            delete(delete_comment).route_layer(owner).route_layer(access),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateCommentRequest {
    comment: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCommentRequest {
    comment: Option<String>,
    like_count: Option<i64>,
}

async fn require_post(db: &Database, post_id: i64) -> Result<(), ApiError> {
    if db.posts().exists(post_id).await.db_err("Failed to look up post")? {
        Ok(())
    } else {
        Err(ApiError::not_found("Post not found"))
    }
}

async fn list_comments(
    State(state): State<CommentsState>,
    Path(post_id): Path<i64>,
    Query(request): Query<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    require_post(&state.db, post_id).await?;

    let path = format!("/posts/{}/comments", post_id);
    let page = state
        .paginator
        .paginate(&request, &state.db.comments().for_post(post_id), &path)
        .await
        .db_err("Failed to list comments")?;

    Ok(Json(page))
}

async fn get_comment(
    State(state): State<CommentsState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .db
        .comments()
        .get(post_id, comment_id)
        .await
        .db_err("Failed to get comment")?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    Ok(Json(comment))
}

async fn create_comment(
    State(state): State<CommentsState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.comment.trim().is_empty() {
        return Err(ApiError::bad_request("Comment cannot be empty"));
    }
    require_post(&state.db, post_id).await?;

    let comments = state.db.comments();
    let id = comments
        .create(post_id, user.id, &payload.comment)
        .await
        .db_err("Failed to create comment")?;

    let comment = comments
        .get(post_id, id)
        .await
        .db_err("Failed to load created comment")?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    Ok((StatusCode::CREATED, Json(comment)))
}

async fn update_comment(
    State(state): State<CommentsState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = state.db.comments();
    let updated = comments
        .update(
            post_id,
            comment_id,
            payload.comment.as_deref(),
            payload.like_count,
        )
        .await
        .db_err("Failed to update comment")?;

    if !updated {
        return Err(ApiError::not_found("Comment not found"));
    }

    let comment = comments
        .get(post_id, comment_id)
        .await
        .db_err("Failed to load updated comment")?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<CommentsState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .comments()
        .delete(post_id, comment_id)
        .await
        .db_err("Failed to delete comment")?;

    if !deleted {
        return Err(ApiError::not_found("Comment not found"));
    }

    Ok(Json(serde_json::json!({ "id": comment_id })))
}
