//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::{Database, UserRole};
use crate::jwt::{DEFAULT_ACCESS_TOKEN_SECS, DEFAULT_REFRESH_TOKEN_SECS, TokenLifetimes};
use clap::Parser;
use tracing::{error, info};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rookery",
    about = "Social network backend with token auth and paginated feeds"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long, default_value = "rookery.db")]
    pub database: String,

    /// Public base URL used to build pagination links
    #[arg(long, env = "ROOKERY_PUBLIC_URL", default_value = "http://localhost:3000")]
    pub public_url: String,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_ACCESS_TOKEN_SECS)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_TOKEN_SECS)]
    pub refresh_token_ttl: u64,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Grant the ADMIN role to the user with this email on startup
    #[arg(long, value_name = "EMAIL")]
    pub make_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: called once during startup before any other thread reads the environment.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public base URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %public_url, "Public URL must use http or https");
        return None;
    }

    if url.cannot_be_a_base() || url.host_str().is_none() {
        error!(url = %public_url, "Public URL must have a host");
        return None;
    }

    Some(url)
}

/// Validate token lifetimes, logging an error if they are out of range.
pub fn validate_lifetimes(access: u64, refresh: u64) -> Option<TokenLifetimes> {
    match TokenLifetimes::new(access, refresh) {
        Ok(lifetimes) => Some(lifetimes),
        Err(e) => {
            error!(error = %e, "Invalid token lifetimes");
            None
        }
    }
}

/// Handle the --make-admin flag. Exits the process if the user can't be promoted.
pub async fn handle_make_admin(db: &Database, email: &str) {
    let user = match db.users().get_by_email(email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            error!(email = %email, "No user with this email");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Failed to look up user");
            std::process::exit(1);
        }
    };

    if let Err(e) = db.users().set_role(user.id, UserRole::Admin).await {
        error!(error = %e, "Failed to grant admin role");
        std::process::exit(1);
    }

    info!(user_id = user.id, email = %email, "Granted admin role");
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    jwt_secret: String,
    public_url: Url,
    token_lifetimes: TokenLifetimes,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        public_url,
        token_lifetimes,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_public_url() {
        assert!(validate_public_url("http://localhost:3000").is_some());
        assert!(validate_public_url("https://example.com/api").is_some());
        assert!(validate_public_url("ftp://example.com").is_none());
        assert!(validate_public_url("not a url").is_none());
    }

    #[test]
    fn test_validate_lifetimes() {
        assert!(validate_lifetimes(300, 3600).is_some());
        assert!(validate_lifetimes(3600, 300).is_none());
        assert!(validate_lifetimes(300, u64::MAX).is_none());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["rookery"]);
        assert_eq!(args.port, 3000);
        assert_eq!(args.database, "rookery.db");
        assert_eq!(args.access_token_ttl, 300);
        assert_eq!(args.refresh_token_ttl, 3600);
        assert!(args.make_admin.is_none());
    }
}
