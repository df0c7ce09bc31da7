//! Registration, login and token rotation.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::post,
};
use serde_json::json;

use crate::auth::{AuthContext, AuthError, AuthService, Guard, RegisterUser, basic_guard, bearer_guard};

pub fn router(auth: AuthService) -> Router {
    let refresh_only = from_fn_with_state(Guard::refresh(auth.clone()), bearer_guard);

    Router::new()
        .route("/register/email", post(register))
        .route(
            "/login/email",
            post(login).route_layer(from_fn_with_state(auth.clone(), basic_guard)),
        )
        .route(
            "/token/access",
            post(rotate_access).route_layer(refresh_only.clone()),
        )
        .route(
            "/token/refresh",
            post(rotate_refresh).route_layer(refresh_only),
        )
        .with_state(auth)
}

async fn register(
    State(auth): State<AuthService>,
    Json(payload): Json<RegisterUser>,
) -> Result<impl IntoResponse, AuthError> {
    let pair = auth.register_with_email(payload).await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

/// Identity was attached by the Basic guard.
async fn login(
    State(auth): State<AuthService>,
    context: AuthContext,
) -> Result<impl IntoResponse, AuthError> {
    let pair = auth.login_user(&context.user)?;
    Ok((StatusCode::CREATED, Json(pair)))
}

async fn rotate_access(
    State(auth): State<AuthService>,
    context: AuthContext,
) -> Result<impl IntoResponse, AuthError> {
    let token = auth.rotate_token(&context.token, false)?;
    Ok((StatusCode::CREATED, Json(json!({ "accessToken": token }))))
}

async fn rotate_refresh(
    State(auth): State<AuthService>,
    context: AuthContext,
) -> Result<impl IntoResponse, AuthError> {
    let token = auth.rotate_token(&context.token, true)?;
    Ok((StatusCode::CREATED, Json(json!({ "refreshToken": token }))))
}
