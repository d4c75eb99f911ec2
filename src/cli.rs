//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::{DEFAULT_COST, SessionPolicy, hash_password};
use crate::db::{Database, NewPrincipal, Role};
use clap::Parser;
use rand::{Rng, distr::Alphanumeric};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const GENERATED_PASSWORD_LENGTH: usize = 24;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Header a trusted reverse proxy uses to pass on the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Real-IP`, holding exactly one address
    XRealIp,
    /// The last `X-Forwarded-For` entry, which the nearest proxy appended
    XForwardFor,
}

/// Reads the client IP from a proxy-set header.
#[derive(Clone, Copy, Debug)]
pub struct IpExtractor {
    pub header_name: &'static str,
    parse: fn(&str) -> Result<String, &'static str>,
}

impl IpExtractor {
    pub fn extract(&self, header_value: &str) -> Result<String, &'static str> {
        (self.parse)(header_value)
    }
}

impl From<ClientIpHeader> for IpExtractor {
    fn from(header: ClientIpHeader) -> Self {
        match header {
            ClientIpHeader::XRealIp => Self {
                header_name: "x-real-ip",
                parse: parse_ip,
            },
            ClientIpHeader::XForwardFor => Self {
                header_name: "x-forwarded-for",
                parse: parse_last_forwarded,
            },
        }
    }
}

fn parse_ip(value: &str) -> Result<String, &'static str> {
    value
        .trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| "IP header is not an address")
}

// Earlier entries come from the client and cannot be trusted.
fn parse_last_forwarded(value: &str) -> Result<String, &'static str> {
    value
        .rsplit(',')
        .next()
        .ok_or("IP header is empty")
        .and_then(parse_ip)
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Connectrix",
    about = "Club management sessions with role-gated dashboards"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "CONNECTRIX_DATABASE", default_value = "connectrix.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds (default 7 days)
    #[arg(long, default_value_t = 7 * 24 * 60 * 60)]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds (default 30 days)
    #[arg(long, default_value_t = 30 * 24 * 60 * 60)]
    pub refresh_ttl_secs: u64,

    /// Omit the Secure cookie attribute (local HTTP development only)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Take the client IP from this proxy-set header (only behind a reverse proxy)
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Login and registration attempts allowed per client IP per minute
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub login_attempts_per_minute: u32,

    /// Disable self-service registration (admins can still provision accounts)
    #[arg(long)]
    pub no_signup: bool,

    /// Create an admin with this email on startup and print its password
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Why no usable JWT secret was found.
#[derive(Debug)]
pub enum SecretError {
    Missing,
    Unreadable { path: String, source: std::io::Error },
    TooShort,
}

impl std::fmt::Display for SecretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretError::Missing => write!(
                f,
                "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
            ),
            SecretError::Unreadable { path, source } => {
                write!(f, "Failed to read JWT secret file {}: {}", path, source)
            }
            SecretError::TooShort => write!(
                f,
                "JWT secret is shorter than {} characters. Use a longer secret",
                MIN_JWT_SECRET_LENGTH
            ),
        }
    }
}

impl std::error::Error for SecretError {}

/// Pick the JWT secret from the environment value or, failing that, a file.
pub fn resolve_jwt_secret(
    env_value: Option<String>,
    jwt_secret_file: Option<&str>,
) -> Result<String, SecretError> {
    let secret = match (env_value, jwt_secret_file) {
        (Some(secret), _) => secret,
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|source| SecretError::Unreadable {
                path: path.to_string(),
                source,
            })?
            .trim()
            .to_string(),
        (None, None) => return Err(SecretError::Missing),
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(SecretError::TooShort);
    }
    Ok(secret)
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let env_value = std::env::var("JWT_SECRET").ok();
    if env_value.is_some() {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
    }

    match resolve_jwt_secret(env_value, jwt_secret_file) {
        Ok(secret) => Some(secret),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

/// Build the session policy from the TTL flags.
/// Returns None and logs an error if the lifetimes are inconsistent.
pub fn session_policy(args: &Args) -> Option<SessionPolicy> {
    match SessionPolicy::new(
        Duration::from_secs(args.access_ttl_secs),
        Duration::from_secs(args.refresh_ttl_secs),
    ) {
        Ok(policy) => Some(policy),
        Err(e) => {
            error!("Invalid token lifetimes: {}", e);
            None
        }
    }
}

/// Handle the --create-admin flag. Returns false if the admin could not be created.
pub async fn handle_create_admin(db: &Database, email: &str) -> bool {
    let email = email.trim().to_lowercase();

    match db.principals().is_taken(&email, None).await {
        Ok(true) => {
            error!(email = %email, "A principal with this email already exists");
            return false;
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Failed to check for existing principal");
            return false;
        }
    }

    let password = generate_password();
    let password_hash = match hash_password(&password, DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash admin password");
            return false;
        }
    };

    let uuid = Uuid::new_v4().to_string();
    let created = db
        .principals()
        .create(&NewPrincipal {
            uuid: &uuid,
            email: &email,
            student_id: None,
            name: "Administrator",
            role: Role::Admin,
            password_hash: &password_hash,
        })
        .await;

    match created {
        Ok(_) => {
            info!(email = %email, "Admin created");
            println!();
            println!("Admin created: {}", email);
            println!("Password: {}", password);
            println!();
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin");
            false
        }
    }
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    jwt_secret: String,
    session: SessionPolicy,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        secure_cookies: !args.insecure_cookies,
        session,
        password_cost: DEFAULT_COST,
        login_attempts_per_minute: args.login_attempts_per_minute,
        ip_extractor: args.ip_header.map(IpExtractor::from),
        no_signup: args.no_signup,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
