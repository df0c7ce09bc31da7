#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::Engine;
use rookery::{
    ServerConfig, create_app,
    db::{Database, UserRole},
    jwt::{JwtConfig, TokenLifetimes, TokenType},
    password::hash_password,
};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const TEST_PASSWORD: &str = "pw123";
pub const PUBLIC_URL: &str = "http://localhost:3000";

/// Create a test app and return (app, db, jwt_config).
pub async fn create_test_app() -> (Router, Database, JwtConfig) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: TEST_SECRET.to_vec(),
        public_url: Url::parse(PUBLIC_URL).expect("Invalid URL"),
        token_lifetimes: TokenLifetimes::default(),
    };
    (create_app(&config), db, JwtConfig::new(TEST_SECRET))
}

pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub access: String,
    pub refresh: String,
}

/// Create a user and sign a token pair for them. The stored password hash is a
/// placeholder, so Basic login fails; use [`create_user_with_password`] for that.
pub async fn create_user(db: &Database, jwt: &JwtConfig, nickname: &str) -> TestUser {
    insert_user(db, jwt, nickname, "unusable-hash").await
}

/// Create a user whose password is [`TEST_PASSWORD`].
pub async fn create_user_with_password(db: &Database, jwt: &JwtConfig, nickname: &str) -> TestUser {
    let hash = hash_password(TEST_PASSWORD).unwrap();
    insert_user(db, jwt, nickname, &hash).await
}

async fn insert_user(db: &Database, jwt: &JwtConfig, nickname: &str, hash: &str) -> TestUser {
    let email = format!("{}@example.com", nickname);
    let id = db.users().create(&email, nickname, hash).await.unwrap();

    TestUser {
        id,
        access: jwt.issue(&email, TokenType::Access).unwrap(),
        refresh: jwt.issue(&email, TokenType::Refresh).unwrap(),
        email,
    }
}

pub async fn create_admin(db: &Database, jwt: &JwtConfig, nickname: &str) -> TestUser {
    let user = create_user(db, jwt, nickname).await;
    db.users().set_role(user.id, UserRole::Admin).await.unwrap();
    user
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub fn basic(email: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", email, password));
    format!("Basic {}", encoded)
}

/// Build a request with an optional Authorization header and JSON body.
pub fn request(method: Method, uri: &str, authorization: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request and return the status and JSON body (Null when empty).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let authorization = token.map(bearer);
    send(app, request(Method::GET, uri, authorization.as_deref(), None)).await
}

/// Ids of the `data` array of a page.
pub fn ids(page: &Value) -> Vec<i64> {
    page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

/// Turn an absolute `next` link back into a path + query for `oneshot`.
pub fn next_path(page: &Value) -> Option<String> {
    let next = page["next"].as_str()?;
    let url = Url::parse(next).unwrap();
    Some(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}
