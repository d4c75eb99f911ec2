//! Authentication state trait and macro.

use super::cookie::CookieSettings;
use super::session::SessionPolicy;
use crate::db::Database;
use crate::jwt::JwtConfig;

/// Trait for state types that provide everything session handling needs.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
    fn db(&self) -> &Database;
    fn session_policy(&self) -> &SessionPolicy;
    fn cookie_settings(&self) -> CookieSettings;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `jwt: Arc<JwtConfig>`
/// - `db: Database`
/// - `session: SessionPolicy`
/// - `cookies: CookieSettings`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub jwt: Arc<JwtConfig>,
///     pub session: SessionPolicy,
///     pub cookies: CookieSettings,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
            fn session_policy(&self) -> &$crate::auth::SessionPolicy {
                &self.session
            }
            fn cookie_settings(&self) -> $crate::auth::CookieSettings {
                self.cookies
            }
        }
    };
}
