//! Token authentication with access/refresh rotation.
//!
//! Access tokens authorize ordinary calls; refresh tokens are only accepted by
//! the rotation routes. Both are stateless JWTs whose subject is the user's
//! email. Logins bootstrap from Basic credentials.

mod errors;
mod guard;
mod header;
mod service;

pub use errors::{AuthError, AuthErrorKind};
pub use guard::{
    AuthContext, CurrentUser, Guard, MaybeUser, OwnershipGuard, OwnershipGuardState, RouteConfig,
    TokenRequirement, basic_guard, bearer_guard, ownership_guard,
};
pub use header::{decode_basic, extract_token_from_header};
pub use service::{AuthService, RegisterUser, TokenPair};
