//! Chat WebSocket with bearer authentication at the handshake.
//!
//! The token is taken from the upgrade request's `Authorization` header and
//! checked before any client frame is read. A rejected handshake gets an
//! `exception` event followed by a close frame.
//!
//! Frames are JSON objects `{"event": "...", "data": {...}}`.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, close_code, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{AuthErrorKind, AuthService, extract_token_from_header};
use crate::db::{Chat, ChatMessage, User};

/// State for the chat socket.
#[derive(Clone)]
pub struct WsState {
    pub auth: AuthService,
    pub rooms: ChatRooms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    NoToken,
    InvalidToken,
    NoUser,
}

/// Why a socket handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketRejection {
    pub code: RejectionCode,
    pub message: String,
}

impl SocketRejection {
    fn new(code: RejectionCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<RejectionCode>,
    pub message: String,
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Exception(ExceptionPayload),
    ChatCreated(Chat),
    ReceiveMessage(ChatMessage),
}

impl ServerEvent {
    fn exception(message: impl Into<String>) -> Self {
        ServerEvent::Exception(ExceptionPayload {
            code: None,
            message: message.into(),
        })
    }

    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                error!(error = %e, "Failed to serialize socket event");
                None
            }
        }
    }
}

/// Events sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    CreateChat(CreateChatData),
    EnterChat(EnterChatData),
    SendMessage(SendMessageData),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatData {
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterChatData {
    pub chat_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageData {
    pub chat_id: i64,
    pub message: String,
}

type Subscribers = HashMap<Uuid, mpsc::Sender<ServerEvent>>;

/// Live connections per chat room. The lock is never held across an await.
#[derive(Clone, Default)]
pub struct ChatRooms {
    rooms: Arc<Mutex<HashMap<i64, Subscribers>>>,
}

impl ChatRooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, chat_id: i64, connection: Uuid, sender: mpsc::Sender<ServerEvent>) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.entry(chat_id).or_default().insert(connection, sender);
    }

    pub fn leave_all(&self, connection: Uuid) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    /// Number of connections currently in a room.
    pub fn member_count(&self, chat_id: i64) -> usize {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.get(&chat_id).map_or(0, HashMap::len)
    }

    /// Queue `event` for every connection in the room except `sender`.
    /// Connections whose queue is full miss the event. Returns how many were reached.
    pub fn broadcast_except(&self, chat_id: i64, sender: Uuid, event: &ServerEvent) -> usize {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(members) = rooms.get(&chat_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (connection, tx) in members {
            if *connection == sender {
                continue;
            }
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(chat_id, connection = %connection, error = %e, "Dropped chat event"),
            }
        }
        delivered
    }
}

pub fn router(state: WsState) -> Router {
    Router::new()
        .route("/chats/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    State(state): State<WsState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Expected WebSocket upgrade").into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        run_session(state, headers, sink, stream).await;
    })
}

/// Resolve the connecting identity from the upgrade request headers.
pub async fn authenticate_handshake(
    auth: &AuthService,
    headers: &HeaderMap,
) -> Result<User, SocketRejection> {
    let Some(raw) = headers.get(header::AUTHORIZATION) else {
        return Err(SocketRejection::new(RejectionCode::NoToken, "Missing token"));
    };

    let invalid = || SocketRejection::new(RejectionCode::InvalidToken, "Invalid token");

    let raw = raw.to_str().map_err(|_| invalid())?;
    let token = extract_token_from_header(raw, true).map_err(|_| invalid())?;
    let claims = auth.verify_token(token).map_err(|_| invalid())?;

    match auth.identity_for(&claims).await {
        Ok(user) => Ok(user),
        Err(e) if e.kind == AuthErrorKind::IdentityNotFound => {
            Err(SocketRejection::new(RejectionCode::NoUser, "User not found"))
        }
        Err(_) => Err(invalid()),
    }
}

/// Drive one socket connection: authenticate, then serve client events until
/// either side closes.
pub async fn run_session<Tx, Rx>(state: WsState, headers: HeaderMap, mut sink: Tx, mut stream: Rx)
where
    Tx: Sink<Message> + Unpin + Send,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let user = match authenticate_handshake(&state.auth, &headers).await {
        Ok(user) => user,
        Err(rejection) => {
            debug!(code = ?rejection.code, "Socket handshake rejected");
            let event = ServerEvent::Exception(ExceptionPayload {
                code: Some(rejection.code),
                message: rejection.message,
            });
            if let Some(message) = event.to_message() {
                let _ = sink.send(message).await;
            }
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "Unauthorized".into(),
                })))
                .await;
            return;
        }
    };

    let connection = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(32);
    info!(user_id = user.id, connection = %connection, "Socket connected");

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(event) = outgoing else { break };
                if let Some(message) = event.to_message() {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
            }
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };

                let reply = handle_event(&state, &user, connection, &tx, text.as_str()).await;
                if let Some(message) = reply.as_ref().and_then(ServerEvent::to_message) {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    state.rooms.leave_all(connection);
    info!(user_id = user.id, connection = %connection, "Socket disconnected");
}

/// Handle one client frame. Returns an event for the sending connection, if any.
async fn handle_event(
    state: &WsState,
    user: &User,
    connection: Uuid,
    tx: &mpsc::Sender<ServerEvent>,
    text: &str,
) -> Option<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Unrecognized socket event");
            return Some(ServerEvent::exception("Unrecognized event"));
        }
    };

    let db = state.auth.db();
    let result = match event {
        ClientEvent::CreateChat(data) => {
            let mut members = data.user_ids;
            members.push(user.id);

            match db.users().all_exist(&members).await {
                Ok(false) => return Some(ServerEvent::exception("Unknown user in chat")),
                Ok(true) => {}
                Err(e) => return Some(internal_error("check chat members", e)),
            }

            match db.chats().create(&members).await {
                Ok(chat_id) => db
                    .chats()
                    .get(chat_id)
                    .await
                    .map(|chat| chat.map(ServerEvent::ChatCreated)),
                Err(e) => Err(e),
            }
        }
        ClientEvent::EnterChat(data) => {
            for chat_id in &data.chat_ids {
                if let Some(rejection) = check_membership(state, *chat_id, user.id).await {
                    return Some(rejection);
                }
            }
            for chat_id in data.chat_ids {
                state.rooms.join(chat_id, connection, tx.clone());
            }
            Ok(None)
        }
        ClientEvent::SendMessage(data) => {
            if let Some(rejection) = check_membership(state, data.chat_id, user.id).await {
                return Some(rejection);
            }

            db.messages()
                .create(data.chat_id, user.id, &data.message)
                .await
                .map(|message| {
                    let event = ServerEvent::ReceiveMessage(message);
                    state.rooms.broadcast_except(data.chat_id, connection, &event);
                    None
                })
        }
    };

    result.unwrap_or_else(|e| Some(internal_error("handle socket event", e)))
}

/// An exception event unless `user_id` belongs to an existing chat `chat_id`.
async fn check_membership(state: &WsState, chat_id: i64, user_id: i64) -> Option<ServerEvent> {
    let chats = state.auth.db().chats();
    match chats.exists(chat_id).await {
        Ok(true) => {}
        Ok(false) => {
            return Some(ServerEvent::exception(format!(
                "Chat {} does not exist",
                chat_id
            )));
        }
        Err(e) => return Some(internal_error("look up chat", e)),
    }
    match chats.is_member(chat_id, user_id).await {
        Ok(true) => None,
        Ok(false) => {
            debug!(chat_id, user_id, "Socket event for a chat the user is not in");
            Some(ServerEvent::exception(format!("Not a member of chat {}", chat_id)))
        }
        Err(e) => Some(internal_error("check chat membership", e)),
    }
}

fn internal_error(context: &str, e: sqlx::Error) -> ServerEvent {
    error!(error = %e, "Failed to {}", context);
    ServerEvent::exception("Internal error")
}
