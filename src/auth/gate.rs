//! Route gate middleware for the dashboard area.
//!
//! Every request passes through [`route_gate`]. Requests under a protected
//! prefix must carry a valid session: a verified access token, or a refresh
//! token that can be redeemed on the spot. Role rules send principals that
//! wander into another role's subtree back to the dashboard.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use super::cookie::{clear_credentials, read_credentials, write_credentials};
use super::refresh::{RefreshError, RefreshOutcome, RefreshRejection, refresh_session};
use super::session::CredentialPair;
use super::state::HasAuthBackend;
use crate::db::Role;
use crate::jwt::Identity;

/// Which paths the gate guards and where it sends people.
#[derive(Debug, Clone)]
pub struct GateRules {
    /// Prefixes that require a session.
    pub protected: Vec<String>,
    /// Prefixes that additionally require a role. First match wins.
    pub role_rules: Vec<(String, Role)>,
    pub login_path: String,
    pub dashboard_path: String,
}

impl Default for GateRules {
    fn default() -> Self {
        Self {
            protected: vec!["/dashboard".to_string()],
            role_rules: vec![
                ("/dashboard/admin".to_string(), Role::Admin),
                ("/dashboard/club".to_string(), Role::Club),
            ],
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
        }
    }
}

impl GateRules {
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| matches_prefix(path, p))
    }

    /// The role required for a path, if any.
    pub fn required_role(&self, path: &str) -> Option<Role> {
        self.role_rules
            .iter()
            .find(|(prefix, _)| matches_prefix(path, prefix))
            .map(|(_, role)| *role)
    }

    fn admits(&self, path: &str, role: Role) -> bool {
        self.required_role(path).is_none_or(|required| required == role)
    }
}

/// `path` equals `prefix` or continues it with a new segment.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// Trait for state types that carry gate rules.
pub trait HasGateRules {
    fn gate_rules(&self) -> &GateRules;
}

/// What the gate does with a request.
#[derive(Debug)]
pub enum GateDecision {
    /// Not a protected path.
    PassThrough,
    /// Let the request through. `refreshed` is set when the session was
    /// renewed and the new cookies must go out with the response.
    Allow {
        identity: Identity,
        refreshed: Option<CredentialPair>,
    },
    /// Send the client to the login page. `clear_cookies` is set when a
    /// presented credential failed verification.
    RedirectLogin { clear_cookies: bool },
    /// Signed in, but not allowed in this subtree.
    RedirectDashboard { refreshed: Option<CredentialPair> },
}

/// Decide what to do with a request for `path` carrying `headers`.
pub async fn evaluate<S>(state: &S, path: &str, headers: &HeaderMap) -> Result<GateDecision, RefreshError>
where
    S: HasAuthBackend + HasGateRules + Sync,
{
    let rules = state.gate_rules();
    if !rules.is_protected(path) {
        return Ok(GateDecision::PassThrough);
    }

    let cookies = read_credentials(headers);
    if cookies.is_empty() {
        debug!("No session cookies for {}", path);
        return Ok(GateDecision::RedirectLogin {
            clear_cookies: false,
        });
    }

    if let Some(access) = cookies.access {
        match state.jwt().verify_access(access) {
            Ok(claims) => {
                let identity = claims.identity();
                return Ok(if rules.admits(path, identity.role) {
                    GateDecision::Allow {
                        identity,
                        refreshed: None,
                    }
                } else {
                    debug!("Role {} may not enter {}", identity.role, path);
                    GateDecision::RedirectDashboard { refreshed: None }
                });
            }
            Err(e) => debug!("Access token rejected for {}: {}", path, e),
        }
    }

    let Some(refresh) = cookies.refresh else {
        return Ok(GateDecision::RedirectLogin {
            clear_cookies: true,
        });
    };

    match refresh_session(state, refresh).await? {
        RefreshOutcome::Rejected(reason) => {
            debug!("Session refresh rejected for {}: {}", path, reason);
            // A deleted principal leaves cookie state untouched
            Ok(GateDecision::RedirectLogin {
                clear_cookies: matches!(reason, RefreshRejection::InvalidToken(_)),
            })
        }
        RefreshOutcome::Success { pair, principal } => {
            let identity = Identity::from(&principal);
            if rules.admits(path, identity.role) {
                Ok(GateDecision::Allow {
                    identity,
                    refreshed: Some(pair),
                })
            } else {
                debug!("Role {} may not enter {}", identity.role, path);
                Ok(GateDecision::RedirectDashboard {
                    refreshed: Some(pair),
                })
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

/// Middleware applying [`evaluate`] to every request.
///
/// Allowed requests get the session [`Identity`] in their extensions.
pub async fn route_gate<S>(State(state): State<S>, mut request: Request, next: Next) -> Response
where
    S: HasAuthBackend + HasGateRules + Clone + Send + Sync + 'static,
{
    let path = request.uri().path().to_string();

    let decision = match evaluate(&state, &path, request.headers()).await {
        Ok(decision) => decision,
        Err(e) => {
            error!("Route gate failed for {}: {}", path, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error",
                }),
            )
                .into_response();
        }
    };

    let (mut response, refreshed) = match decision {
        GateDecision::PassThrough => return next.run(request).await,
        GateDecision::Allow {
            identity,
            refreshed,
        } => {
            request.extensions_mut().insert(identity);
            (next.run(request).await, refreshed)
        }
        GateDecision::RedirectLogin { clear_cookies } => {
            let mut response = Redirect::temporary(&state.gate_rules().login_path).into_response();
            if clear_cookies {
                clear_credentials(response.headers_mut(), state.cookie_settings());
            }
            return response;
        }
        GateDecision::RedirectDashboard { refreshed } => (
            Redirect::temporary(&state.gate_rules().dashboard_path).into_response(),
            refreshed,
        ),
    };

    if let Some(pair) = refreshed {
        write_credentials(response.headers_mut(), &pair, state.cookie_settings());
    }
    response
}
