//! Chats and chat messages over HTTP. Live messaging is in [`super::ws`].

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use super::error::{ApiError, ResultExt};
use crate::auth::{AuthService, CurrentUser, Guard, bearer_guard};
use crate::db::Database;
use crate::pagination::{PageRequest, Paginator};

#[derive(Clone)]
pub struct ChatsState {
    pub db: Database,
    pub auth: AuthService,
    pub paginator: Paginator,
}

pub fn router(state: ChatsState) -> Router {
    Router::new()
        .route("/", get(list_chats))
        .route("/create", post(create_chat))
        .route("/{chat_id}/messages", get(list_messages))
        .route_layer(from_fn_with_state(
            Guard::access(state.auth.clone()),
            bearer_guard,
        ))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatRequest {
    user_ids: Vec<i64>,
}

async fn list_chats(
    State(state): State<ChatsState>,
    Query(request): Query<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    let page = state
        .paginator
        .paginate(&request, &state.db.chats(), "/chats")
        .await
        .db_err("Failed to list chats")?;

    Ok(Json(page))
}

/// Create a chat between the caller and `userIds`.
async fn create_chat(
    State(state): State<ChatsState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut members = payload.user_ids;
    members.push(user.id);

    if !state
        .db
        .users()
        .all_exist(&members)
        .await
        .db_err("Failed to check chat members")?
    {
        return Err(ApiError::bad_request("Unknown user in chat"));
    }

    let chats = state.db.chats();
    let id = chats.create(&members).await.db_err("Failed to create chat")?;
    let chat = chats
        .get(id)
        .await
        .db_err("Failed to load created chat")?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;

    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_messages(
    State(state): State<ChatsState>,
    Path(chat_id): Path<i64>,
    Query(request): Query<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    if !state
        .db
        .chats()
        .exists(chat_id)
        .await
        .db_err("Failed to look up chat")?
    {
        return Err(ApiError::not_found("Chat not found"));
    }

    let path = format!("/chats/{}/messages", chat_id);
    let page = state
        .paginator
        .paginate(&request, &state.db.messages().for_chat(chat_id), &path)
        .await
        .db_err("Failed to list messages")?;

    Ok(Json(page))
}
