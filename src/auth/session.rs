//! Session issuance: turn a principal into a signed credential pair.

use std::time::Duration;

use crate::db::Principal;
use crate::jwt::{Identity, IssuedToken, JwtConfig, JwtError};

const DAY: u64 = 24 * 60 * 60;

/// Longest lifetime either credential may have.
const MAX_TTL: Duration = Duration::from_secs(365 * DAY);

/// Lifetimes of the two session credentials.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(7 * DAY),
            refresh_ttl: Duration::from_secs(30 * DAY),
        }
    }
}

impl SessionPolicy {
    /// Build a policy, rejecting zero lifetimes, lifetimes over `MAX_TTL`
    /// and a refresh token that would expire before its access token.
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Result<Self, String> {
        if access_ttl.is_zero() {
            return Err("access token lifetime must be positive".into());
        }
        if access_ttl > MAX_TTL || refresh_ttl > MAX_TTL {
            return Err(format!(
                "token lifetimes must not exceed {} seconds",
                MAX_TTL.as_secs()
            ));
        }
        if refresh_ttl <= access_ttl {
            return Err("refresh token lifetime must exceed the access token lifetime".into());
        }
        Ok(Self {
            access_ttl,
            refresh_ttl,
        })
    }
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Sign a new credential pair for a principal.
///
/// The access token carries the full identity; the refresh token carries
/// only the subject. Nothing is persisted.
pub fn issue_session(
    jwt: &JwtConfig,
    policy: &SessionPolicy,
    principal: &Principal,
) -> Result<CredentialPair, JwtError> {
    let identity = Identity::from(principal);
    let access = jwt.issue_access(&identity, policy.access_ttl)?;
    let refresh = jwt.issue_refresh(&identity.id, policy.refresh_ttl)?;
    Ok(CredentialPair { access, refresh })
}
