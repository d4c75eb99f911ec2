//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use crate::db::Role;
use crate::jwt::Identity;

/// Role requirement checked by [`Auth`].
pub trait RoleConstraint {
    fn allows(role: Role) -> bool;
}

/// Any signed-in principal.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: Role) -> bool {
        true
    }
}

/// Admins only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: Role) -> bool {
        role == Role::Admin
    }
}

/// Extractor for API endpoints that require authentication.
///
/// Verifies the access cookie only. There is no implicit refresh here:
/// JSON clients call the refresh endpoint themselves after a 401.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub identity: Identity,
    _role: PhantomData<R>,
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_cookie(&parts.headers, ACCESS_COOKIE_NAME)
            .filter(|t| !t.is_empty())
            .ok_or(ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

        let claims = state.jwt().verify_access(token).map_err(|e| {
            debug!("Access token rejected: {}", e);
            ApiAuthError::new(AuthErrorKind::InvalidToken)
        })?;

        if !R::allows(claims.role) {
            debug!("Principal {} lacks the required role", claims.sub);
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole));
        }

        Ok(Auth {
            identity: claims.identity(),
            _role: PhantomData,
        })
    }
}

/// The session identity attached by the route gate.
///
/// Only usable on routes behind a protected prefix.
pub struct CurrentUser(pub Identity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or(ApiAuthError::new(AuthErrorKind::NotAuthenticated))
    }
}
