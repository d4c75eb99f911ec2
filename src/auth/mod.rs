//! Session authentication with role-based access to the dashboard.
//!
//! Dual-token system: an access token proving identity for the session
//! window and a longer-lived refresh token that can only mint new pairs.
//! Both are stateless and travel in HttpOnly cookies. The route gate
//! refreshes expired sessions transparently for page requests.

mod cookie;
mod errors;
mod extractors;
mod gate;
mod ip;
mod password;
mod refresh;
mod session;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, SessionCookies, clear_credentials,
    get_cookie, read_credentials, write_credentials,
};
pub use errors::ApiAuthError;
pub use extractors::{AdminOnly, AnyRole, Auth, CurrentUser, RoleConstraint};
pub use gate::{GateDecision, GateRules, HasGateRules, evaluate, route_gate};
pub use ip::extract_client_ip;
pub use password::{DEFAULT_COST, hash_password, verify_password};
pub use refresh::{RefreshError, RefreshOutcome, RefreshRejection, refresh_session};
pub use session::{CredentialPair, SessionPolicy, issue_session};
pub use state::HasAuthBackend;
