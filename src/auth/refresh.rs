//! Refresh coordination: redeem a refresh token for a new credential pair.

use tracing::debug;

use super::session::{CredentialPair, issue_session};
use super::state::HasAuthBackend;
use crate::db::Principal;
use crate::jwt::{JwtError, VerifyError};

/// Result of a refresh attempt that reached a decision.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// A new pair was issued for the principal as currently stored.
    Success {
        pair: CredentialPair,
        principal: Principal,
    },
    Rejected(RefreshRejection),
}

/// Why a refresh token was not honored. Always an expected outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    InvalidToken(VerifyError),
    /// The subject no longer exists in the principal store.
    PrincipalNotFound,
}

impl std::fmt::Display for RefreshRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshRejection::InvalidToken(e) => write!(f, "{}", e),
            RefreshRejection::PrincipalNotFound => write!(f, "Principal not found"),
        }
    }
}

/// A refresh attempt that could not reach a decision.
#[derive(Debug)]
pub enum RefreshError {
    /// The principal store could not be queried.
    Store(sqlx::Error),
    /// The new pair could not be signed.
    Issue(JwtError),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Store(e) => write!(f, "Principal lookup failed: {}", e),
            RefreshError::Issue(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<sqlx::Error> for RefreshError {
    fn from(e: sqlx::Error) -> Self {
        RefreshError::Store(e)
    }
}

impl From<JwtError> for RefreshError {
    fn from(e: JwtError) -> Self {
        RefreshError::Issue(e)
    }
}

/// Verify a refresh token, reload its principal and issue a fresh pair.
///
/// Rejections are `Ok`; `Err` means the attempt itself failed. The old
/// refresh token stays valid until it expires.
pub async fn refresh_session<S>(
    state: &S,
    refresh_token: &str,
) -> Result<RefreshOutcome, RefreshError>
where
    S: HasAuthBackend + Sync,
{
    let claims = match state.jwt().verify_refresh(refresh_token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Refresh token rejected: {}", e);
            return Ok(RefreshOutcome::Rejected(RefreshRejection::InvalidToken(e)));
        }
    };

    let Some(principal) = state.db().principals().get_by_uuid(&claims.sub).await? else {
        debug!("Refresh token subject {} no longer exists", claims.sub);
        return Ok(RefreshOutcome::Rejected(RefreshRejection::PrincipalNotFound));
    };

    let pair = issue_session(state.jwt(), state.session_policy(), &principal)?;

    debug!("Refreshed session for {}", principal.uuid);
    Ok(RefreshOutcome::Success { pair, principal })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::auth::{CookieSettings, SessionPolicy};
    use crate::db::{Database, NewPrincipal, Role};
    use crate::jwt::{Identity, JwtConfig};

    #[derive(Clone)]
    struct TestState {
        db: Database,
        jwt: Arc<JwtConfig>,
        session: SessionPolicy,
        cookies: CookieSettings,
    }

    crate::impl_has_auth_backend!(TestState);

    async fn state() -> TestState {
        let db = Database::open(":memory:").await.unwrap();
        db.principals()
            .create(&NewPrincipal {
                uuid: "uuid-1",
                email: "alice@uni.edu",
                student_id: None,
                name: "Alice",
                role: Role::Student,
                password_hash: "hash",
            })
            .await
            .unwrap();
        TestState {
            db,
            jwt: Arc::new(JwtConfig::new(b"test-secret-key-for-testing")),
            session: SessionPolicy::default(),
            cookies: CookieSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_refresh_success_reflects_stored_role() {
        let state = state().await;
        let token = state
            .jwt
            .issue_refresh("uuid-1", Duration::from_secs(3600))
            .unwrap()
            .token;
        state.db.principals().set_role("uuid-1", Role::Dean).await.unwrap();

        let outcome = refresh_session(&state, &token).await.unwrap();

        let (pair, principal) = match outcome {
            RefreshOutcome::Success { pair, principal } => (pair, principal),
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(principal.role, Role::Dean);
        let claims = state.jwt.verify_access(&pair.access.token).unwrap();
        assert_eq!(claims.role, Role::Dean);
        assert_ne!(pair.refresh.token, token);
    }

    #[tokio::test]
    async fn test_refresh_invalid_token() {
        let state = state().await;

        let outcome = refresh_session(&state, "not-a-token").await.unwrap();
        assert!(matches!(
            outcome,
            RefreshOutcome::Rejected(RefreshRejection::InvalidToken(VerifyError::Malformed))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let state = state().await;
        let principal = state.db.principals().get_by_uuid("uuid-1").await.unwrap().unwrap();
        let access = state
            .jwt
            .issue_access(&Identity::from(&principal), Duration::from_secs(3600))
            .unwrap();

        let outcome = refresh_session(&state, &access.token).await.unwrap();
        assert!(matches!(
            outcome,
            RefreshOutcome::Rejected(RefreshRejection::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_deleted_principal() {
        let state = state().await;
        let token = state
            .jwt
            .issue_refresh("uuid-1", Duration::from_secs(3600))
            .unwrap()
            .token;
        state.db.principals().delete("uuid-1").await.unwrap();

        let outcome = refresh_session(&state, &token).await.unwrap();
        assert!(matches!(
            outcome,
            RefreshOutcome::Rejected(RefreshRejection::PrincipalNotFound)
        ));
    }

    #[tokio::test]
    async fn test_refresh_store_unavailable() {
        let state = state().await;
        let token = state
            .jwt
            .issue_refresh("uuid-1", Duration::from_secs(3600))
            .unwrap()
            .token;
        state.db.close().await;

        assert!(matches!(
            refresh_session(&state, &token).await,
            Err(RefreshError::Store(_))
        ));
    }
}
