//! Authorization header parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::errors::{AuthError, AuthErrorKind};

/// Split `"<scheme> <token>"` and return the token.
///
/// The header must contain exactly one space and the scheme must be `Bearer`
/// when `expect_bearer` is set, `Basic` otherwise. Matching is case-sensitive.
pub fn extract_token_from_header(raw: &str, expect_bearer: bool) -> Result<&str, AuthError> {
    let mut parts = raw.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthErrorKind::BadCredentialsFormat.into());
    };

    let expected = if expect_bearer { "Bearer" } else { "Basic" };
    if scheme != expected {
        return Err(AuthErrorKind::BadCredentialsFormat.into());
    }

    Ok(token)
}

/// Decode a Basic token into `(email, password)`. Splits on the first `:`.
pub fn decode_basic(token: &str) -> Result<(String, String), AuthError> {
    let bytes = STANDARD
        .decode(token)
        .map_err(|_| AuthError::new(AuthErrorKind::BadCredentialsFormat))?;
    let decoded =
        String::from_utf8(bytes).map_err(|_| AuthError::new(AuthErrorKind::BadCredentialsFormat))?;

    let (email, password) = decoded
        .split_once(':')
        .ok_or(AuthError::new(AuthErrorKind::BadCredentialsFormat))?;

    Ok((email.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind<T: std::fmt::Debug>(result: Result<T, AuthError>) -> AuthErrorKind {
        result.unwrap_err().kind
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_token_from_header("Bearer abc", true).unwrap(), "abc");
        assert_eq!(extract_token_from_header("Basic abc", false).unwrap(), "abc");
    }

    #[test]
    fn test_extract_rejects_wrong_scheme() {
        assert_eq!(
            kind(extract_token_from_header("Basic abc", true)),
            AuthErrorKind::BadCredentialsFormat
        );
        assert_eq!(
            kind(extract_token_from_header("bearer abc", true)),
            AuthErrorKind::BadCredentialsFormat
        );
    }

    #[test]
    fn test_extract_rejects_wrong_part_count() {
        for raw in ["Bearer", "Bearer a b", "", "Bearer  abc"] {
            assert_eq!(
                kind(extract_token_from_header(raw, true)),
                AuthErrorKind::BadCredentialsFormat,
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn test_decode_basic() {
        let token = STANDARD.encode("a@b.c:pw:with:colons");
        let (email, password) = decode_basic(&token).unwrap();
        assert_eq!(email, "a@b.c");
        assert_eq!(password, "pw:with:colons");
    }

    #[test]
    fn test_decode_basic_rejects_garbage() {
        assert_eq!(kind(decode_basic("%%%")), AuthErrorKind::BadCredentialsFormat);
        assert_eq!(
            kind(decode_basic(&STANDARD.encode("no-separator"))),
            AuthErrorKind::BadCredentialsFormat
        );
        assert_eq!(
            kind(decode_basic(&STANDARD.encode([0xff, 0xfe, b':']))),
            AuthErrorKind::BadCredentialsFormat
        );
    }
}
