use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;

use super::error::{ApiError, ResultExt};
use crate::auth::{AuthService, CurrentUser, Guard, RouteConfig, bearer_guard};
use crate::db::{Database, UserRole};

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub auth: AuthService,
}

pub fn router(state: UsersState) -> Router {
    let admin = from_fn_with_state(
        Guard::access(state.auth.clone()).with_route(RouteConfig::role(UserRole::Admin)),
        bearer_guard,
    );

    let follows = Router::new()
        .route("/follow/me", get(list_followers))
        .route("/follow/{user_id}", post(follow_user).delete(unfollow_user))
        .route("/follow/{user_id}/confirm", patch(confirm_follow))
        .route_layer(from_fn_with_state(
            Guard::access(state.auth.clone()),
            bearer_guard,
        ));

    Router::new()
        .route("/", get(list_users).route_layer(admin))
        .merge(follows)
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FollowersQuery {
    #[serde(default)]
    include_not_confirmed: bool,
}

async fn list_users(State(state): State<UsersState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.users().list_all().await.db_err("Failed to list users")?;
    Ok(Json(users))
}

async fn follow_user(
    State(state): State<UsersState>,
    CurrentUser(user): CurrentUser,
    Path(followee_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if followee_id == user.id {
        return Err(ApiError::bad_request("Cannot follow yourself"));
    }

    state
        .db
        .users()
        .get_by_id(followee_id)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    state
        .db
        .follows()
        .request(user.id, followee_id)
        .await
        .db_err("Failed to create follow request")?;

    Ok(StatusCode::CREATED)
}

/// Followers of the caller.
async fn list_followers(
    State(state): State<UsersState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<FollowersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let followers = state
        .db
        .follows()
        .followers_of(user.id, query.include_not_confirmed)
        .await
        .db_err("Failed to list followers")?;

    Ok(Json(followers))
}

/// Accept the follow request `user_id` sent to the caller.
async fn confirm_follow(
    State(state): State<UsersState>,
    CurrentUser(user): CurrentUser,
    Path(follower_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let confirmed = state
        .db
        .follows()
        .confirm_with_increment(follower_id, user.id)
        .await
        .db_err("Failed to confirm follow")?;

    if !confirmed {
        return Err(ApiError::not_found("No pending follow request"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Stop following `user_id`.
async fn unfollow_user(
    State(state): State<UsersState>,
    CurrentUser(user): CurrentUser,
    Path(followee_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .follows()
        .delete_with_decrement(user.id, followee_id)
        .await
        .db_err("Failed to delete follow")?;

    if !deleted {
        return Err(ApiError::not_found("Not following this user"));
    }

    Ok(StatusCode::NO_CONTENT)
}
