//! Admin API endpoints.
//!
//! All endpoints require admin role.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post, put},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::auth::{PrincipalFields, UserResponse, create_principal};
use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::{AdminOnly, Auth, CookieSettings, SessionPolicy};
use crate::db::{Database, Role};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

/// State for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub session: SessionPolicy,
    pub cookies: CookieSettings,
    pub password_cost: u32,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/principals", post(create))
        .route("/principals/{id}/role", put(set_role))
        .route("/principals/{id}", delete(remove))
        .with_state(state)
}

#[derive(Deserialize)]
struct CreatePrincipalRequest {
    name: String,
    email: String,
    password: String,
    role: Role,
    #[serde(default)]
    student_id: Option<String>,
}

#[derive(Deserialize)]
struct SetRoleRequest {
    role: Role,
}

/// Provision a principal with any role.
async fn create(
    State(state): State<AdminState>,
    _auth: Auth<AdminOnly>,
    Json(body): Json<CreatePrincipalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = PrincipalFields::validate(
        &body.name,
        &body.email,
        body.password,
        body.student_id.as_deref(),
        body.role,
    )?;

    let principal = create_principal(&state.db, state.password_cost, fields).await?;
    Ok((StatusCode::CREATED, UserResponse::new(&principal)))
}

/// Change a principal's role. Takes effect at its next refresh.
async fn set_role(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    Json(body): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;
    if id == auth.identity.id {
        return Err(ApiError::bad_request("Cannot change your own role"));
    }

    let updated = state
        .db
        .principals()
        .set_role(&id, body.role)
        .await
        .db_err("Failed to update role")?;
    if !updated {
        return Err(ApiError::not_found("Principal not found"));
    }

    let principal = state
        .db
        .principals()
        .get_by_uuid(&id)
        .await
        .db_err("Failed to look up principal")?
        .ok_or_else(|| ApiError::not_found("Principal not found"))?;

    info!(uuid = %id, role = %body.role, by = %auth.identity.id, "Role changed");
    Ok(UserResponse::new(&principal))
}

/// Remove a principal. Its sessions end at their next refresh.
async fn remove(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;
    if id == auth.identity.id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }

    let deleted = state
        .db
        .principals()
        .delete(&id)
        .await
        .db_err("Failed to delete principal")?;
    if !deleted {
        return Err(ApiError::not_found("Principal not found"));
    }

    info!(uuid = %id, by = %auth.identity.id, "Principal deleted");
    Ok(StatusCode::NO_CONTENT)
}
