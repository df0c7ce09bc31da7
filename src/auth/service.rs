//! Token service: credential checks, token issuance and rotation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::errors::{AuthError, AuthErrorKind};
use crate::db::{Database, User};
use crate::jwt::{Claims, JwtConfig, JwtError, TokenType};
use crate::password::{hash_password, verify_password};

pub const NICKNAME_MAX_CHARS: usize = 20;
pub const PASSWORD_MIN_CHARS: usize = 3;
pub const PASSWORD_MAX_CHARS: usize = 8;

/// Access and refresh token issued together at login or registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub nickname: String,
    pub email: String,
    pub password: String,
}

impl RegisterUser {
    fn validate(&self) -> Result<(), AuthError> {
        let nickname_len = self.nickname.chars().count();
        if nickname_len == 0 || nickname_len > NICKNAME_MAX_CHARS {
            return Err(AuthErrorKind::InvalidRegistration(
                "Nickname must be between 1 and 20 characters",
            )
            .into());
        }

        if !is_email(&self.email) {
            return Err(AuthErrorKind::InvalidRegistration("Invalid email address").into());
        }

        let password_len = self.password.chars().count();
        if !(PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&password_len) {
            return Err(AuthErrorKind::InvalidRegistration(
                "Password must be between 3 and 8 characters",
            )
            .into());
        }

        Ok(())
    }
}

/// `local@domain.tld`, no whitespace, one `@`.
fn is_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Stateless token service over the user store.
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt: Arc<JwtConfig>,
}

impl AuthService {
    pub fn new(db: Database, jwt: Arc<JwtConfig>) -> Self {
        Self { db, jwt }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Issue a fresh access + refresh pair for `user`.
    pub fn login_user(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(&user.email, TokenType::Access)?,
            refresh_token: self.issue(&user.email, TokenType::Refresh)?,
        })
    }

    /// Verify `token` and mint a new token for the same subject.
    ///
    /// The input token's type is not checked here; routes exposing rotation
    /// put the refresh-only guard in front of this call.
    pub fn rotate_token(&self, token: &str, issue_refresh: bool) -> Result<String, AuthError> {
        let claims = self.verify_token(token)?;
        let token_type = if issue_refresh {
            TokenType::Refresh
        } else {
            TokenType::Access
        };
        self.issue(&claims.sub, token_type)
    }

    /// Check signature and expiry. The token type is returned, not enforced.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.jwt
            .verify(token)
            .map_err(|_| AuthError::new(AuthErrorKind::InvalidToken))
    }

    /// Look up the user a verified token refers to.
    pub async fn identity_for(&self, claims: &Claims) -> Result<User, AuthError> {
        self.db
            .users()
            .get_by_email(&claims.sub)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up token subject");
                AuthError::new(AuthErrorKind::DatabaseError)
            })?
            .ok_or(AuthError::new(AuthErrorKind::IdentityNotFound))
    }

    /// Validate, reject duplicates, hash the password, persist and log the new user in.
    ///
    /// The existence checks give the usual answer; a concurrent sign-up that
    /// slips past them is caught by the UNIQUE constraints on insert.
    pub async fn register_with_email(&self, input: RegisterUser) -> Result<TokenPair, AuthError> {
        input.validate()?;

        let users = self.db.users();
        if users.nickname_exists(&input.nickname).await.map_err(db_error)? {
            return Err(AuthErrorKind::DuplicateNickname.into());
        }
        if users.email_exists(&input.email).await.map_err(db_error)? {
            return Err(AuthErrorKind::DuplicateEmail.into());
        }

        let hash = hash_blocking(input.password).await?;

        let id = users
            .create(&input.email, &input.nickname, &hash)
            .await
            .map_err(|e| match registration_conflict(&e) {
                Some(kind) => AuthError::new(kind),
                None => db_error(e),
            })?;
        let user = users
            .get_by_id(id)
            .await
            .map_err(db_error)?
            .ok_or(AuthError::new(AuthErrorKind::DatabaseError))?;

        info!(user_id = id, nickname = %user.nickname, "User registered");
        self.login_user(&user)
    }

    /// Check an email/password pair. Unknown email and wrong password look the same.
    pub async fn signin(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .db
            .users()
            .get_by_email(email)
            .await
            .map_err(db_error)?
            .ok_or(AuthError::new(AuthErrorKind::WrongCredentials))?;

        let password = password.to_string();
        let stored = user.password.clone();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(|e| {
                error!(error = %e, "Password verification task failed");
                AuthError::new(AuthErrorKind::Internal)
            })?;

        match verified {
            Ok(true) => Ok(user),
            Ok(false) => Err(AuthErrorKind::WrongCredentials.into()),
            Err(e) => {
                error!(user_id = user.id, error = %e, "Stored password hash unusable");
                Err(AuthErrorKind::WrongCredentials.into())
            }
        }
    }

    fn issue(&self, subject: &str, token_type: TokenType) -> Result<String, AuthError> {
        self.jwt.issue(subject, token_type).map_err(|e: JwtError| {
            error!(error = %e, "Failed to sign token");
            AuthError::new(AuthErrorKind::Internal)
        })
    }
}

/// Argon2 is CPU-bound; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            error!(error = %e, "Password hashing task failed");
            AuthError::new(AuthErrorKind::Internal)
        })?
        .map_err(|e| {
            error!(error = %e, "Failed to hash password");
            AuthError::new(AuthErrorKind::Internal)
        })
}

/// The duplicate a UNIQUE violation on `users` stands for, if it is one.
fn registration_conflict(e: &sqlx::Error) -> Option<AuthErrorKind> {
    let db_err = e.as_database_error()?;
    if db_err.kind() != sqlx::error::ErrorKind::UniqueViolation {
        return None;
    }
    if db_err.message().contains("users.nickname") {
        Some(AuthErrorKind::DuplicateNickname)
    } else {
        Some(AuthErrorKind::DuplicateEmail)
    }
}

fn db_error(e: sqlx::Error) -> AuthError {
    error!(error = %e, "Database error during authentication");
    AuthError::new(AuthErrorKind::DatabaseError)
}
