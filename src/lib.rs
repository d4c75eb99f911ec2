pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod pages;
pub mod rate_limit;

use api::create_api_router;
use auth::{CookieSettings, GateRules, HasGateRules, SessionPolicy, route_gate};
use axum::{Router, middleware};
use db::Database;
use jwt::JwtConfig;
use pages::PagesState;
use rate_limit::{RateLimitConfig, spawn_sweeper};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Access and refresh token lifetimes
    pub session: SessionPolicy,
    /// bcrypt cost for new password hashes
    pub password_cost: u32,
    /// Login and registration attempts allowed per client IP per minute
    pub login_attempts_per_minute: u32,
    /// Take the client IP from a proxy header instead of the socket address
    pub ip_extractor: Option<cli::IpExtractor>,
    /// Whether self-service registration is disabled
    pub no_signup: bool,
}

/// State for the route gate.
#[derive(Clone)]
pub struct GateState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub session: SessionPolicy,
    pub cookies: CookieSettings,
    pub rules: Arc<GateRules>,
}

crate::impl_has_auth_backend!(GateState);

impl HasGateRules for GateState {
    fn gate_rules(&self) -> &GateRules {
        &self.rules
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let rate_limit = Arc::new(RateLimitConfig::new(
        config.login_attempts_per_minute,
        config.ip_extractor,
    ));
    create_app_with_limits(config, rate_limit)
}

fn create_app_with_limits(config: &ServerConfig, rate_limit: Arc<RateLimitConfig>) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret));
    let cookies = CookieSettings {
        secure: config.secure_cookies,
    };
    let rules = Arc::new(GateRules::default());

    let api_router = create_api_router(
        config.db.clone(),
        jwt.clone(),
        config.session,
        cookies,
        config.password_cost,
        rate_limit,
        config.no_signup,
    );

    let pages = pages::router(PagesState {
        jwt: jwt.clone(),
        rules: rules.clone(),
    });

    let gate_state = GateState {
        db: config.db.clone(),
        jwt,
        session: config.session,
        cookies,
        rules,
    };

    Router::new()
        .nest("/api", api_router)
        .merge(pages)
        .layer(middleware::from_fn_with_state(
            gate_state,
            route_gate::<GateState>,
        ))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let limits = Arc::new(RateLimitConfig::new(
        config.login_attempts_per_minute,
        config.ip_extractor,
    ));
    spawn_sweeper(limits.clone());
    let app = create_app_with_limits(&config, limits);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
