//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
};
use connectrix::{
    ServerConfig,
    auth::{CredentialPair, SessionPolicy, hash_password, issue_session},
    create_app,
    db::{Database, NewPrincipal, Principal, Role},
    jwt::{AccessClaims, JwtConfig, RefreshClaims, TokenType},
};

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const TEST_PASSWORD: &str = "correct-horse-battery";
/// Minimum bcrypt cost, keeps tests fast.
pub const TEST_COST: u32 = 4;

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub jwt: JwtConfig,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build an app after letting the caller adjust the default test config.
    pub async fn with_config(adjust: impl FnOnce(&mut ServerConfig)) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let mut config = ServerConfig {
            db: db.clone(),
            jwt_secret: TEST_SECRET.to_vec(),
            secure_cookies: false,
            session: SessionPolicy::default(),
            password_cost: TEST_COST,
            login_attempts_per_minute: 1000,
            ip_extractor: None,
            no_signup: false,
        };
        adjust(&mut config);
        Self {
            app: create_app(&config),
            db,
            jwt: JwtConfig::new(TEST_SECRET),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    /// Store a principal whose password is `TEST_PASSWORD`.
    pub async fn create_principal(
        &self,
        email: &str,
        student_id: Option<&str>,
        role: Role,
    ) -> Principal {
        let uuid = uuid::Uuid::new_v4().to_string();
        let hash = hash_password(TEST_PASSWORD, TEST_COST).unwrap();
        self.db
            .principals()
            .create(&NewPrincipal {
                uuid: &uuid,
                email,
                student_id,
                name: "Test Principal",
                role,
                password_hash: &hash,
            })
            .await
            .unwrap();
        self.db.principals().get_by_uuid(&uuid).await.unwrap().unwrap()
    }

    /// Change a principal's display name behind the app's back.
    pub async fn rename_principal(&self, uuid: &str, name: &str) {
        sqlx::query("UPDATE principals SET name = ? WHERE uuid = ?")
            .bind(name)
            .bind(uuid)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    pub async fn last_login_at(&self, id: i64) -> Option<String> {
        let row: (Option<String>,) =
            sqlx::query_as("SELECT last_login_at FROM principals WHERE id = ?")
                .bind(id)
                .fetch_one(self.db.pool())
                .await
                .unwrap();
        row.0
    }

    /// Issue a fresh credential pair for a principal.
    pub fn session(&self, principal: &Principal) -> CredentialPair {
        issue_session(&self.jwt, &SessionPolicy::default(), principal).unwrap()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A correctly signed access token that expired a minute ago.
pub fn expired_access_token(principal: &Principal) -> String {
    let now = unix_now();
    let claims = AccessClaims {
        sub: principal.uuid.clone(),
        role: principal.role,
        name: principal.name.clone(),
        email: principal.email.clone(),
        token_type: TokenType::Access,
        iat: now - 3600,
        exp: now - 60,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap()
}

/// A correctly signed refresh token that expired a minute ago.
pub fn expired_refresh_token(principal: &Principal) -> String {
    let now = unix_now();
    let claims = RefreshClaims {
        jti: uuid::Uuid::new_v4().to_string(),
        sub: principal.uuid.clone(),
        token_type: TokenType::Refresh,
        iat: now - 3600,
        exp: now - 60,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap()
}

pub fn cookie_header(access: Option<&str>, refresh: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(access) = access {
        parts.push(format!("cx_access={}", access));
    }
    if let Some(refresh) = refresh {
        parts.push(format!("cx_refresh={}", refresh));
    }
    parts.join("; ")
}

pub fn get(uri: &str, cookies: &str) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if !cookies.is_empty() {
        builder = builder.header("cookie", cookies);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, cookies: &str, body: serde_json::Value) -> Request<Body> {
    json_request("POST", uri, cookies, body)
}

pub fn json_request(method: &str, uri: &str, cookies: &str, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if !cookies.is_empty() {
        builder = builder.header("cookie", cookies);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Attach a peer address, as `into_make_service_with_connect_info` would.
pub fn from_peer(mut request: Request<Body>, ip: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
    request
}

pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie set by the response, if any.
pub fn set_cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .find_map(|c| c.strip_prefix(&prefix))
        .map(|rest| rest.split(';').next().unwrap_or("").to_string())
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", cookie_name)) && c.contains("Max-Age=0"))
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
