//! JWT token generation and validation.
//!
//! Access and refresh credentials are HS256 tokens signed with one shared
//! secret. Verification distinguishes tampering, expiry and shape errors so
//! callers can decide between refreshing and forcing a new login.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db::{Principal, Role};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Who a session belongs to. Display fields are for rendering only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl From<&Principal> for Identity {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.uuid.clone(),
            role: principal.role,
            name: principal.name.clone(),
            email: principal.email.clone(),
        }
    }
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (principal UUID)
    pub sub: String,
    pub role: Role,
    /// Display name
    pub name: String,
    pub email: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl AccessClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.sub.clone(),
            role: self.role,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// JWT claims for refresh tokens. Only the subject is embedded; everything
/// else is re-read from the principal store when the token is redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID, unique per issued refresh token
    pub jti: String,
    /// Subject (principal UUID)
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// A freshly signed token and its lifetime.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue an access token carrying the full session identity.
    pub fn issue_access(&self, identity: &Identity, ttl: Duration) -> Result<IssuedToken, JwtError> {
        self.issue_access_at(identity, ttl, unix_now()?)
    }

    /// Issue a refresh token carrying only the subject.
    pub fn issue_refresh(&self, subject: &str, ttl: Duration) -> Result<IssuedToken, JwtError> {
        self.issue_refresh_at(subject, ttl, unix_now()?)
    }

    fn issue_access_at(
        &self,
        identity: &Identity,
        ttl: Duration,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let (duration, exp) = expiry(now, ttl)?;
        let claims = AccessClaims {
            sub: identity.id.clone(),
            role: identity.role,
            name: identity.name.clone(),
            email: identity.email.clone(),
            token_type: TokenType::Access,
            iat: now,
            exp,
        };
        self.sign(&claims, now, duration, exp)
    }

    fn issue_refresh_at(
        &self,
        subject: &str,
        ttl: Duration,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let (duration, exp) = expiry(now, ttl)?;
        let claims = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };
        self.sign(&claims, now, duration, exp)
    }

    fn sign<C: Serialize>(
        &self,
        claims: &C,
        now: u64,
        duration: u64,
        exp: u64,
    ) -> Result<IssuedToken, JwtError> {
        let token = jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, VerifyError> {
        let claims: AccessClaims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(VerifyError::Malformed);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, VerifyError> {
        let claims: RefreshClaims = self.decode(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(VerifyError::Malformed);
        }
        Ok(claims)
    }

    fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<C, VerifyError> {
        if !has_jws_shape(token) {
            return Err(VerifyError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match jsonwebtoken::decode::<C>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(VerifyError::Expired),
                ErrorKind::InvalidSignature => Err(VerifyError::SignatureInvalid),
                // Header, signature and claims all fail with the same parse
                // errors. A signature that still checks out means the
                // payload is simply not the shape we expected.
                _ if self.signature_matches(token) => Err(VerifyError::Malformed),
                _ => Err(VerifyError::SignatureInvalid),
            },
        }
    }

    /// Check the MAC alone, accepting any JSON payload.
    fn signature_matches(&self, token: &str) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<serde_json::Value>(token, &self.decoding_key, &validation).is_ok()
    }
}

/// Three non-empty dot-separated segments.
fn has_jws_shape(token: &str) -> bool {
    let mut segments = 0;
    for segment in token.split('.') {
        if segment.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}

fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Lifetime in seconds and the resulting `exp`.
fn expiry(now: u64, ttl: Duration) -> Result<(u64, u64), JwtError> {
    let duration = ttl.as_secs();
    now.checked_add(duration)
        .map(|exp| (duration, exp))
        .ok_or(JwtError::LifetimeOverflow)
}

/// Errors that can occur while issuing tokens.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Expiry does not fit in a timestamp
    LifetimeOverflow,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::LifetimeOverflow => write!(f, "Token lifetime too large"),
        }
    }
}

impl std::error::Error for JwtError {}

/// Why a credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// The MAC does not match: tampered, or signed with another secret.
    SignatureInvalid,
    /// Signature is fine but the token is past its expiry.
    Expired,
    /// Not a token at all, or not the kind of token expected here.
    Malformed,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::SignatureInvalid => write!(f, "Invalid token signature"),
            VerifyError::Expired => write!(f, "Token expired"),
            VerifyError::Malformed => write!(f, "Malformed token"),
        }
    }
}

impl std::error::Error for VerifyError {}
