//! JWT token signing and verification.
//!
//! Tokens are stateless bearer credentials carrying only the subject (the
//! user's email), the token type and the issue/expiry timestamps. There is no
//! revocation list: a token is valid until it expires.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived token authorizing ordinary API calls
    Access,
    /// Long-lived token usable only to mint new tokens
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,
    /// Token type
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token lifetime: 5 minutes
pub const DEFAULT_ACCESS_TOKEN_SECS: u64 = 5 * 60;

/// Default refresh token lifetime: 1 hour
pub const DEFAULT_REFRESH_TOKEN_SECS: u64 = 60 * 60;

/// Upper bound for either lifetime: 10 years
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Token lifetimes in seconds. Construction fails unless
/// `0 < access < refresh <= MAX_TOKEN_LIFETIME_SECS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    access: u64,
    refresh: u64,
}

impl TokenLifetimes {
    pub fn new(access: u64, refresh: u64) -> Result<Self, JwtError> {
        if access == 0 || access >= refresh {
            return Err(JwtError::InvalidLifetimes { access, refresh });
        }
        if refresh > MAX_TOKEN_LIFETIME_SECS {
            return Err(JwtError::LifetimeTooLong(refresh));
        }
        Ok(Self { access, refresh })
    }

    pub fn access(&self) -> u64 {
        self.access
    }

    pub fn refresh(&self) -> u64 {
        self.refresh
    }

    /// Lifetime for tokens of the given type.
    pub fn for_type(&self, token_type: TokenType) -> u64 {
        match token_type {
            TokenType::Access => self.access,
            TokenType::Refresh => self.refresh,
        }
    }
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_TOKEN_SECS,
            refresh: DEFAULT_REFRESH_TOKEN_SECS,
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetimes: TokenLifetimes,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and default lifetimes.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetimes(secret, TokenLifetimes::default())
    }

    pub fn with_lifetimes(secret: &[u8], lifetimes: TokenLifetimes) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Sign a token for `subject` that expires `ttl_secs` from now.
    pub fn sign(
        &self,
        subject: &str,
        token_type: TokenType,
        ttl_secs: u64,
    ) -> Result<String, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let claims = Claims {
            sub: subject.to_string(),
            token_type,
            iat: now,
            exp: now.checked_add(ttl_secs).ok_or(JwtError::TimeError)?,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Sign a token of the given type using the configured lifetime for that type.
    pub fn issue(&self, subject: &str, token_type: TokenType) -> Result<String, JwtError> {
        self.sign(subject, token_type, self.lifetimes.for_type(token_type))
    }

    /// Verify the signature and expiry of a token and return its claims.
    /// The token type is returned as-is; enforcing a particular type is the caller's job.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(JwtError::InvalidToken)?;

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed token or expired token
    InvalidToken(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Access lifetime must be non-zero and shorter than the refresh lifetime
    InvalidLifetimes { access: u64, refresh: u64 },
    /// A lifetime above `MAX_TOKEN_LIFETIME_SECS`
    LifetimeTooLong(u64),
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::InvalidToken(e) => write!(f, "Invalid token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::InvalidLifetimes { access, refresh } => write!(
                f,
                "Access token lifetime ({}s) must be shorter than refresh token lifetime ({}s)",
                access, refresh
            ),
            JwtError::LifetimeTooLong(secs) => write!(
                f,
                "Token lifetime of {}s exceeds the maximum of {}s",
                secs, MAX_TOKEN_LIFETIME_SECS
            ),
        }
    }
}

impl std::error::Error for JwtError {}
