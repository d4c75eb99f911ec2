//! Cookie transport for session credentials.
//!
//! Reads and writes the two session cookies. Nothing here looks inside a
//! credential; verification belongs to [`crate::jwt`].

use axum::http::{HeaderMap, HeaderValue, header};
use tracing::error;

use super::session::CredentialPair;

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "cx_access";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "cx_refresh";

/// Attributes applied to every cookie we set.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    /// Add the `Secure` attribute. Off only for local HTTP development.
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self { secure: true }
    }
}

/// Session credentials as presented by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCookies<'a> {
    pub access: Option<&'a str>,
    pub refresh: Option<&'a str>,
}

impl SessionCookies<'_> {
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            if let Some((key, value)) = part.trim().split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// Read both session cookies. Empty values count as absent.
pub fn read_credentials(headers: &HeaderMap) -> SessionCookies<'_> {
    let non_empty = |name| get_cookie(headers, name).filter(|v| !v.is_empty());
    SessionCookies {
        access: non_empty(ACCESS_COOKIE_NAME),
        refresh: non_empty(REFRESH_COOKIE_NAME),
    }
}

/// Append `Set-Cookie` headers for a freshly issued credential pair.
pub fn write_credentials(headers: &mut HeaderMap, pair: &CredentialPair, settings: CookieSettings) {
    append_cookie(
        headers,
        ACCESS_COOKIE_NAME,
        &pair.access.token,
        pair.access.duration,
        settings,
    );
    append_cookie(
        headers,
        REFRESH_COOKIE_NAME,
        &pair.refresh.token,
        pair.refresh.duration,
        settings,
    );
}

/// Append `Set-Cookie` headers that delete both session cookies.
pub fn clear_credentials(headers: &mut HeaderMap, settings: CookieSettings) {
    append_cookie(headers, ACCESS_COOKIE_NAME, "", 0, settings);
    append_cookie(headers, REFRESH_COOKIE_NAME, "", 0, settings);
}

fn append_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    max_age: u64,
    settings: CookieSettings,
) {
    let secure = if settings.secure { "; Secure" } else { "" };
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        name, value, max_age, secure
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => error!(cookie = name, error = %e, "Dropping unrepresentable Set-Cookie header"),
    }
}
