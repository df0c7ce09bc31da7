pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod pagination;
pub mod password;

use api::{ChatRooms, create_api_router, log_requests};
use auth::AuthService;
use axum::{Router, middleware};
use db::Database;
use jwt::{JwtConfig, TokenLifetimes};
use pagination::Paginator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Public base URL; pagination `next` links are built on it
    pub public_url: Url,
    pub token_lifetimes: TokenLifetimes,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_lifetimes(
        &config.jwt_secret,
        config.token_lifetimes,
    ));
    let auth = AuthService::new(config.db.clone(), jwt);
    let paginator = Paginator::new(config.public_url.clone());

    create_api_router(config.db.clone(), auth, paginator, ChatRooms::new())
        .layer(middleware::from_fn(log_requests))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
