mod admin;
mod auth;
mod error;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::auth::{CookieSettings, SessionPolicy};
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

pub use auth::{PrincipalView, SessionState};
pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    session: SessionPolicy,
    cookies: CookieSettings,
    password_cost: u32,
    rate_limit: Arc<RateLimitConfig>,
    no_signup: bool,
) -> Router {
    let session_state = auth::SessionState {
        db: db.clone(),
        jwt: jwt.clone(),
        session,
        cookies,
        password_cost,
    };

    let admin_state = admin::AdminState {
        db,
        jwt,
        session,
        cookies,
        password_cost,
    };

    let login = auth::login_router(session_state.clone()).route_layer(
        middleware::from_fn_with_state(rate_limit.clone(), rate_limit_login),
    );

    let mut auth_router = auth::router(session_state.clone()).merge(login);

    if !no_signup {
        let register = auth::register_router(session_state).route_layer(
            middleware::from_fn_with_state(rate_limit, rate_limit_register),
        );
        auth_router = auth_router.merge(register);
    }

    Router::new()
        .nest("/auth", auth_router)
        .nest("/admin", admin::router(admin_state))
}
