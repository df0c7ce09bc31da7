//! Guard chain for HTTP routes.
//!
//! Each guarded route is registered with a [`Guard`] that fixes two things up
//! front: whether the route is public and which role it needs
//! ([`RouteConfig`]), and which token type it accepts ([`TokenRequirement`]).
//! The guard runs as `route_layer` middleware and stores an [`AuthContext`] in
//! the request extensions; handlers read it with the extractors below.
//!
//! Ownership checks are separate middleware ([`ownership_guard`]) layered
//! inside the bearer guard so the identity is already attached.

use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State, rejection::RawPathParamsRejection},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::error;

use super::errors::{AuthError, AuthErrorKind};
use super::header::{decode_basic, extract_token_from_header};
use super::service::AuthService;
use crate::db::{Database, User, UserRole};
use crate::jwt::TokenType;

/// Route-level metadata fixed at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteConfig {
    pub public: bool,
    pub required_role: Option<UserRole>,
}

impl RouteConfig {
    pub fn public() -> Self {
        Self {
            public: true,
            required_role: None,
        }
    }

    pub fn role(role: UserRole) -> Self {
        Self {
            public: false,
            required_role: Some(role),
        }
    }
}

/// Token type a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRequirement {
    Any,
    Access,
    Refresh,
}

impl TokenRequirement {
    fn admits(&self, token_type: TokenType) -> bool {
        match self {
            TokenRequirement::Any => true,
            TokenRequirement::Access => token_type == TokenType::Access,
            TokenRequirement::Refresh => token_type == TokenType::Refresh,
        }
    }
}

/// Identity attached to an admitted request. Never modified after attachment.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    /// Raw bearer token, or the Basic payload for credential logins
    pub token: String,
    /// None for Basic credentials
    pub token_type: Option<TokenType>,
}

#[derive(Clone)]
pub struct Guard {
    auth: AuthService,
    route: RouteConfig,
    requirement: TokenRequirement,
}

impl Guard {
    pub fn new(auth: AuthService, route: RouteConfig, requirement: TokenRequirement) -> Self {
        Self {
            auth,
            route,
            requirement,
        }
    }

    /// Any valid bearer token.
    pub fn bearer(auth: AuthService) -> Self {
        Self::new(auth, RouteConfig::default(), TokenRequirement::Any)
    }

    /// Valid access token.
    pub fn access(auth: AuthService) -> Self {
        Self::new(auth, RouteConfig::default(), TokenRequirement::Access)
    }

    /// Valid refresh token.
    pub fn refresh(auth: AuthService) -> Self {
        Self::new(auth, RouteConfig::default(), TokenRequirement::Refresh)
    }

    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.route = route;
        self
    }

    /// Run the guard chain against request headers.
    ///
    /// Public routes are admitted without an identity. Everything else needs a
    /// `Bearer` token that verifies, names an existing user and has the
    /// required type. The role check runs last.
    pub async fn check(&self, headers: &HeaderMap) -> Result<Option<AuthContext>, AuthError> {
        let context = if self.route.public {
            None
        } else {
            Some(self.authenticate(headers).await?)
        };

        if let Some(role) = self.route.required_role {
            let Some(ctx) = &context else {
                return Err(AuthErrorKind::MissingToken.into());
            };
            if ctx.user.role != role {
                return Err(AuthErrorKind::InsufficientRole.into());
            }
        }

        Ok(context)
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let raw = authorization(headers)?;
        let token = extract_token_from_header(raw, true)?;
        let claims = self.auth.verify_token(token)?;
        let user = self.auth.identity_for(&claims).await?;

        if !self.requirement.admits(claims.token_type) {
            return Err(AuthErrorKind::WrongTokenType.into());
        }

        Ok(AuthContext {
            user,
            token: token.to_string(),
            token_type: Some(claims.token_type),
        })
    }
}

fn authorization(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::new(AuthErrorKind::MissingToken))?
        .to_str()
        .map_err(|_| AuthError::new(AuthErrorKind::BadCredentialsFormat))
}

/// Bearer guard middleware. Use with `middleware::from_fn_with_state(guard, bearer_guard)`.
pub async fn bearer_guard(
    State(guard): State<Guard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(context) = guard.check(request.headers()).await? {
        request.extensions_mut().insert(context);
    }
    Ok(next.run(request).await)
}

/// Basic credential guard for the login route.
pub async fn basic_guard(
    State(auth): State<AuthService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let raw = authorization(request.headers())?;
    let token = extract_token_from_header(raw, false)?;
    let (email, password) = decode_basic(token)?;
    let user = auth.signin(&email, &password).await?;

    let context = AuthContext {
        user,
        token: token.to_string(),
        token_type: None,
    };
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Which resource an ownership guard protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipGuard {
    Post,
    Comment,
}

impl OwnershipGuard {
    /// Path parameter holding the resource id.
    pub fn param(&self) -> &'static str {
        match self {
            OwnershipGuard::Post => "post_id",
            OwnershipGuard::Comment => "comment_id",
        }
    }
}

#[derive(Clone)]
pub struct OwnershipGuardState {
    pub db: Database,
    pub kind: OwnershipGuard,
}

/// Admit admins, and otherwise only the author of the addressed resource.
/// Must be layered inside [`bearer_guard`].
pub async fn ownership_guard(
    State(state): State<OwnershipGuardState>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (user_id, role) = request
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| (ctx.user.id, ctx.user.role))
        .ok_or(AuthError::new(AuthErrorKind::MissingToken))?;

    if role == UserRole::Admin {
        return Ok(next.run(request).await);
    }

    let name = state.kind.param();
    let resource_id: i64 = params
        .ok()
        .and_then(|params| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .and_then(|(_, value)| value.parse().ok())
        })
        .ok_or(AuthError::new(AuthErrorKind::MissingPathParameter))?;

    let author = match state.kind {
        OwnershipGuard::Post => state.db.posts().author_of(resource_id).await,
        OwnershipGuard::Comment => state.db.comments().author_of(resource_id).await,
    }
    .map_err(|e| {
        error!(error = %e, resource_id, "Failed to look up resource owner");
        AuthError::new(AuthErrorKind::DatabaseError)
    })?;

    if author != Some(user_id) {
        return Err(AuthErrorKind::NotOwner.into());
    }

    Ok(next.run(request).await)
}

impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::new(AuthErrorKind::MissingToken))
    }
}

/// The authenticated user. Rejects with 401 on routes without a guard-attached identity.
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = AuthContext::from_request_parts(parts, state).await?;
        Ok(CurrentUser(context.user))
    }
}

/// The authenticated user if one was attached.
pub struct MaybeUser(pub Option<User>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthContext>().map(|ctx| ctx.user.clone()),
        ))
    }
}
