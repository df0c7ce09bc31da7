//! Tests for registration, login and token rotation.

mod common;

use axum::http::{Method, StatusCode};
use common::*;
use rookery::jwt::{Claims, JwtConfig, TokenType};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

fn claims_of(jwt: &JwtConfig, token: &serde_json::Value) -> Claims {
    jwt.verify(token.as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_register_returns_token_pair() {
    let (app, _db, jwt) = create_test_app().await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/register/email",
            None,
            Some(json!({"nickname": "alice", "email": "alice@example.com", "password": "pw123"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let access = claims_of(&jwt, &body["accessToken"]);
    let refresh = claims_of(&jwt, &body["refreshToken"]);
    assert_eq!(access.token_type, TokenType::Access);
    assert_eq!(refresh.token_type, TokenType::Refresh);
    assert_eq!(access.sub, "alice@example.com");
    assert_eq!(refresh.sub, "alice@example.com");
}

#[tokio::test]
async fn test_register_rejects_duplicate_email() {
    let (app, db, jwt) = create_test_app().await;
    create_user(&db, &jwt, "alice").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/register/email",
            None,
            Some(json!({"nickname": "other", "email": "alice@example.com", "password": "pw123"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email already registered");
}

#[tokio::test]
async fn test_register_rejects_long_password() {
    let (app, _db, _jwt) = create_test_app().await;

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/auth/register/email",
            None,
            Some(json!({"nickname": "bob", "email": "bob@example.com", "password": "123456789"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_with_basic_credentials() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user_with_password(&db, &jwt, "alice").await;

    let auth = basic(&user.email, TEST_PASSWORD);
    let (status, body) = send(
        &app,
        request(Method::POST, "/auth/login/email", Some(&auth), None),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(claims_of(&jwt, &body["accessToken"]).sub, user.email);
    assert_eq!(
        claims_of(&jwt, &body["refreshToken"]).token_type,
        TokenType::Refresh
    );
}

#[tokio::test]
async fn test_login_wrong_password() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user_with_password(&db, &jwt, "alice").await;

    let auth = basic(&user.email, "nope");
    let (status, _) = send(
        &app,
        request(Method::POST, "/auth/login/email", Some(&auth), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_malformed_basic_header() {
    let (app, _db, _jwt) = create_test_app().await;

    for header in ["Basic", "Basic !!!notbase64", "Bearer abc", "Basic a b"] {
        let (status, _) = send(
            &app,
            request(Method::POST, "/auth/login/email", Some(header), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", header);
    }
}

#[tokio::test]
async fn test_rotate_access_with_refresh_token() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user(&db, &jwt, "alice").await;

    let auth = bearer(&user.refresh);
    let (status, body) = send(
        &app,
        request(Method::POST, "/auth/token/access", Some(&auth), None),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let claims = claims_of(&jwt, &body["accessToken"]);
    assert_eq!(claims.token_type, TokenType::Access);
    assert_eq!(claims.sub, user.email);
}

#[tokio::test]
async fn test_rotate_refresh_with_refresh_token() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user(&db, &jwt, "alice").await;

    let auth = bearer(&user.refresh);
    let (status, body) = send(
        &app,
        request(Method::POST, "/auth/token/refresh", Some(&auth), None),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let claims = claims_of(&jwt, &body["refreshToken"]);
    assert_eq!(claims.token_type, TokenType::Refresh);
    assert_eq!(claims.sub, user.email);
}

#[tokio::test]
async fn test_rotation_rejects_access_token() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user(&db, &jwt, "alice").await;

    let auth = bearer(&user.access);
    for uri in ["/auth/token/access", "/auth/token/refresh"] {
        let (status, body) = send(&app, request(Method::POST, uri, Some(&auth), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Wrong token type");
    }
}

#[tokio::test]
async fn test_refresh_token_rejected_on_access_route() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user(&db, &jwt, "alice").await;

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/posts",
            Some(&bearer(&user.refresh)),
            Some(json!({"title": "t", "content": "c"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_and_malformed_bearer() {
    let (app, _db, _jwt) = create_test_app().await;

    let (status, body) = send(&app, request(Method::POST, "/auth/token/access", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing token");

    let (status, _) = send(
        &app,
        request(Method::POST, "/auth/token/access", Some("Bearer"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user(&db, &jwt, "alice").await;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = Claims {
        sub: user.email.clone(),
        token_type: TokenType::Refresh,
        iat: now - 100,
        exp: now - 10,
    };
    let expired = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap();

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/token/access",
            Some(&bearer(&expired)),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn test_token_for_deleted_user_rejected() {
    let (app, db, jwt) = create_test_app().await;
    let user = create_user(&db, &jwt, "alice").await;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user.id)
        .execute(db.pool())
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/token/access",
            Some(&bearer(&user.refresh)),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "User not found");
}
