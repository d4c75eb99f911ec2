//! Session endpoints: login, registration, refresh, verify and logout.
//!
//! Successful calls set both session cookies and return the sanitized
//! principal. Token strings never appear in a response body.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::{ApiError, ResultExt};
use crate::auth::{
    Auth, CookieSettings, REFRESH_COOKIE_NAME, RefreshOutcome, SessionPolicy, clear_credentials,
    get_cookie, hash_password, issue_session, refresh_session, verify_password, write_credentials,
};
use crate::db::{Database, NewPrincipal, Principal, Role};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

const MAX_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_STUDENT_ID_LENGTH: usize = 32;
const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt ignores everything past 72 bytes.
const MAX_PASSWORD_LENGTH: usize = 72;

/// State for session endpoints.
#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub session: SessionPolicy,
    pub cookies: CookieSettings,
    pub password_cost: u32,
}

impl_has_auth_backend!(SessionState);

/// Routes that need no rate limiting.
pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .route("/verify", get(verify))
        .route("/logout", post(logout))
        .with_state(state)
}

pub fn login_router(state: SessionState) -> Router {
    Router::new().route("/login", post(login)).with_state(state)
}

pub fn register_router(state: SessionState) -> Router {
    Router::new()
        .route("/register", post(register))
        .with_state(state)
}

/// Principal as exposed to clients.
#[derive(Debug, Serialize)]
pub struct PrincipalView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub student_id: Option<String>,
}

impl From<&Principal> for PrincipalView {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.uuid.clone(),
            name: principal.name.clone(),
            email: principal.email.clone(),
            role: principal.role,
            student_id: principal.student_id.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: PrincipalView,
}

impl UserResponse {
    pub fn new(principal: &Principal) -> Json<Self> {
        Json(Self {
            user: principal.into(),
        })
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email address or student ID
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub student_id: Option<String>,
}

/// Validated fields for a new principal.
pub(super) struct PrincipalFields {
    pub name: String,
    pub email: String,
    pub password: String,
    pub student_id: Option<String>,
    pub role: Role,
}

impl PrincipalFields {
    pub(super) fn validate(
        name: &str,
        email: &str,
        password: String,
        student_id: Option<&str>,
        role: Role,
    ) -> Result<Self, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("Name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(ApiError::bad_request("Name is too long"));
        }

        let email = email.trim().to_lowercase();
        if email.len() > MAX_EMAIL_LENGTH {
            return Err(ApiError::bad_request("Email is too long"));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(ApiError::bad_request("Invalid email address")),
        }

        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(ApiError::bad_request("Password is too long"));
        }

        let student_id = match student_id.map(str::trim) {
            None | Some("") => None,
            Some(id) if id.len() > MAX_STUDENT_ID_LENGTH => {
                return Err(ApiError::bad_request("Student ID is too long"));
            }
            Some(id) if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') => {
                return Err(ApiError::bad_request("Student ID contains invalid characters"));
            }
            Some(id) => Some(id.to_string()),
        };

        Ok(Self {
            name: name.to_string(),
            email,
            password,
            student_id,
            role,
        })
    }
}

/// Hash the password and store a new principal.
pub(super) async fn create_principal(
    db: &Database,
    password_cost: u32,
    fields: PrincipalFields,
) -> Result<Principal, ApiError> {
    let taken = db
        .principals()
        .is_taken(&fields.email, fields.student_id.as_deref())
        .await
        .db_err("Failed to check existing principals")?;
    if taken {
        return Err(ApiError::conflict("Email or student ID already registered"));
    }

    let password = fields.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, password_cost))
        .await
        .internal_err("Password hashing task failed")?
        .internal_err("Failed to hash password")?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let created = db
        .principals()
        .create(&NewPrincipal {
            uuid: &uuid,
            email: &fields.email,
            student_id: fields.student_id.as_deref(),
            name: &fields.name,
            role: fields.role,
            password_hash: &password_hash,
        })
        .await;

    let id = match created {
        Ok(id) => id,
        // Lost a race with a concurrent registration
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(ApiError::conflict("Email or student ID already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create principal", e)),
    };

    info!(uuid = %uuid, role = %fields.role, "Principal created");

    Ok(Principal {
        id,
        uuid,
        email: fields.email,
        student_id: fields.student_id,
        name: fields.name,
        role: fields.role,
    })
}

/// Issue a session for `principal` and attach its cookies.
fn session_headers(state: &SessionState, principal: &Principal) -> Result<HeaderMap, ApiError> {
    let pair = issue_session(&state.jwt, &state.session, principal)
        .internal_err("Failed to issue session")?;
    let mut headers = HeaderMap::new();
    write_credentials(&mut headers, &pair, state.cookies);
    Ok(headers)
}

/// Log in with email or student ID and password.
async fn login(
    State(state): State<SessionState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = body.identifier.trim();
    if identifier.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Identifier and password are required"));
    }

    let Some((principal, password_hash)) = state
        .db
        .principals()
        .get_credentials(identifier)
        .await
        .db_err("Failed to look up principal")?
    else {
        debug!("Login failed: unknown identifier");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    let password = body.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .internal_err("Password check task failed")?
        .internal_err("Failed to verify password")?;
    if !matches {
        debug!(uuid = %principal.uuid, "Login failed: wrong password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if let Err(e) = state.db.principals().touch_last_login(principal.id).await {
        warn!(uuid = %principal.uuid, error = %e, "Failed to record last login");
    }

    let headers = session_headers(&state, &principal)?;
    info!(uuid = %principal.uuid, role = %principal.role, "Logged in");
    Ok((headers, UserResponse::new(&principal)))
}

/// Register a student account and sign it in.
async fn register(
    State(state): State<SessionState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = PrincipalFields::validate(
        &body.name,
        &body.email,
        body.password,
        body.student_id.as_deref(),
        Role::Student,
    )?;

    let principal = create_principal(&state.db, state.password_cost, fields).await?;
    let headers = session_headers(&state, &principal)?;

    Ok((StatusCode::CREATED, headers, UserResponse::new(&principal)))
}

/// Exchange the refresh cookie for a new credential pair.
async fn refresh(
    State(state): State<SessionState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    match refresh_session(&state, token)
        .await
        .internal_err("Session refresh failed")?
    {
        RefreshOutcome::Rejected(_) => Err(ApiError::unauthorized("Invalid or expired session")),
        RefreshOutcome::Success { pair, principal } => {
            let mut headers = HeaderMap::new();
            write_credentials(&mut headers, &pair, state.cookies);
            Ok((headers, UserResponse::new(&principal)))
        }
    }
}

/// Return the signed-in principal as currently stored.
async fn verify(
    State(state): State<SessionState>,
    auth: Auth,
) -> Result<impl IntoResponse, ApiError> {
    let principal = state
        .db
        .principals()
        .get_by_uuid(&auth.identity.id)
        .await
        .db_err("Failed to look up principal")?
        .ok_or_else(|| ApiError::unauthorized("Principal not found"))?;

    Ok(UserResponse::new(&principal))
}

#[derive(Serialize)]
struct LogoutResponse {
    success: bool,
}

/// Clear both session cookies.
async fn logout(State(state): State<SessionState>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    clear_credentials(&mut headers, state.cookies);
    (headers, Json(LogoutResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(
        name: &str,
        email: &str,
        password: &str,
        student_id: Option<&str>,
    ) -> Result<PrincipalFields, ApiError> {
        PrincipalFields::validate(name, email, password.to_string(), student_id, Role::Student)
    }

    #[test]
    fn test_validate_normalizes() {
        let fields =
            validate("  Alice ", " Alice@Uni.EDU ", "password123", Some(" S-100 ")).unwrap();

        assert_eq!(fields.name, "Alice");
        assert_eq!(fields.email, "alice@uni.edu");
        assert_eq!(fields.student_id.as_deref(), Some("S-100"));
    }

    #[test]
    fn test_validate_blank_student_id_is_none() {
        let fields = validate("Alice", "alice@uni.edu", "password123", Some("  ")).unwrap();
        assert!(fields.student_id.is_none());
    }

    #[test]
    fn test_validate_rejects() {
        assert!(validate("", "alice@uni.edu", "password123", None).is_err());
        assert!(validate("Alice", "alice", "password123", None).is_err());
        assert!(validate("Alice", "@uni.edu", "password123", None).is_err());
        assert!(validate("Alice", "alice@uni.edu", "short", None).is_err());
        assert!(validate("Alice", "alice@uni.edu", &"x".repeat(73), None).is_err());
        assert!(validate("Alice", "alice@uni.edu", "password123", Some("S 100")).is_err());
        assert!(validate(&"n".repeat(101), "alice@uni.edu", "password123", None).is_err());
    }

    #[test]
    fn test_principal_view_has_no_secrets() {
        let principal = Principal {
            id: 1,
            uuid: "uuid-1".to_string(),
            email: "alice@uni.edu".to_string(),
            student_id: None,
            name: "Alice".to_string(),
            role: Role::Student,
        };

        let json = serde_json::to_value(PrincipalView::from(&principal)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "uuid-1",
                "name": "Alice",
                "email": "alice@uni.edu",
                "role": "student",
                "student_id": null,
            })
        );
    }
}
