//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Why a request was refused by the token service or a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Authorization header or Basic payload is not in the expected shape
    BadCredentialsFormat,
    MissingToken,
    /// Bad signature, malformed or expired token
    InvalidToken,
    /// Token subject has no matching user
    IdentityNotFound,
    WrongTokenType,
    WrongCredentials,
    InsufficientRole,
    NotOwner,
    MissingPathParameter,
    DuplicateNickname,
    DuplicateEmail,
    InvalidRegistration(&'static str),
    DatabaseError,
    /// Password hashing or token signing failed
    Internal,
}

/// Authentication error with a JSON response body.
#[derive(Debug)]
pub struct AuthError {
    pub kind: AuthErrorKind,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::BadCredentialsFormat
            | AuthErrorKind::MissingToken
            | AuthErrorKind::InvalidToken
            | AuthErrorKind::IdentityNotFound
            | AuthErrorKind::WrongTokenType
            | AuthErrorKind::WrongCredentials => StatusCode::UNAUTHORIZED,
            AuthErrorKind::InsufficientRole | AuthErrorKind::NotOwner => StatusCode::FORBIDDEN,
            AuthErrorKind::MissingPathParameter
            | AuthErrorKind::DuplicateNickname
            | AuthErrorKind::DuplicateEmail
            | AuthErrorKind::InvalidRegistration(_) => StatusCode::BAD_REQUEST,
            AuthErrorKind::DatabaseError | AuthErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::BadCredentialsFormat => "Malformed credentials",
            AuthErrorKind::MissingToken => "Missing token",
            AuthErrorKind::InvalidToken => "Invalid or expired token",
            AuthErrorKind::IdentityNotFound => "User not found",
            AuthErrorKind::WrongTokenType => "Wrong token type",
            AuthErrorKind::WrongCredentials => "Wrong email or password",
            AuthErrorKind::InsufficientRole => "Insufficient permissions",
            AuthErrorKind::NotOwner => "Not the owner of this resource",
            AuthErrorKind::MissingPathParameter => "Missing or invalid resource id",
            AuthErrorKind::DuplicateNickname => "Nickname already taken",
            AuthErrorKind::DuplicateEmail => "Email already registered",
            AuthErrorKind::InvalidRegistration(msg) => msg,
            AuthErrorKind::DatabaseError => "Database error",
            AuthErrorKind::Internal => "Internal error",
        }
    }
}

impl From<AuthErrorKind> for AuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        if self.status_code().is_server_error() {
            tracing::error!(kind = ?self.kind, "Authentication failed");
        } else {
            tracing::debug!(kind = ?self.kind, "Request rejected");
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::new(AuthErrorKind::WrongTokenType).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::new(AuthErrorKind::NotOwner).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::new(AuthErrorKind::DuplicateEmail).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::new(AuthErrorKind::InvalidRegistration("bad")).message(),
            "bad"
        );
    }

    #[test]
    fn test_internal_failure_is_not_reported_as_database_error() {
        let err = AuthError::new(AuthErrorKind::Internal);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Internal error");
    }
}
