//! HTML shells for the login page and the dashboard area.
//!
//! The dashboard routes sit behind the route gate, which has already
//! resolved the session by the time a handler runs.

use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use std::sync::Arc;

use crate::auth::{ACCESS_COOKIE_NAME, CurrentUser, GateRules, get_cookie};
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct PagesState {
    pub jwt: Arc<JwtConfig>,
    pub rules: Arc<GateRules>,
}

pub fn router(state: PagesState) -> Router {
    let login = state.rules.login_path.clone();
    let dashboard = state.rules.dashboard_path.clone();

    Router::new()
        .route("/", get(Redirect::temporary(&login)))
        .route(&login, get(login_handler))
        .route(&dashboard, get(dashboard_handler))
        .route(&format!("{}/", dashboard), get(dashboard_handler))
        .route(&format!("{}/{{*path}}", dashboard), get(dashboard_handler))
        .with_state(state)
}

/// Serve the login page, redirecting already signed-in users.
async fn login_handler(State(state): State<PagesState>, headers: HeaderMap) -> Response {
    if let Some(token) = get_cookie(&headers, ACCESS_COOKIE_NAME) {
        if state.jwt.verify_access(token).is_ok() {
            return Redirect::temporary(&state.rules.dashboard_path).into_response();
        }
    }
    Html(LOGIN_HTML).into_response()
}

/// Serve the dashboard shell for the signed-in principal.
async fn dashboard_handler(CurrentUser(identity): CurrentUser) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Connectrix</title></head>\n\
         <body><main id=\"dashboard\" data-role=\"{role}\">\
         <p>Signed in as {name} ({role})</p></main></body></html>\n",
        role = identity.role,
        name = escape_html(&identity.name),
    ))
}

const LOGIN_HTML: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Connectrix login</title></head>
<body><main id="login">
<form id="login-form">
<input name="identifier" placeholder="Email or student ID" autocomplete="username">
<input name="password" type="password" autocomplete="current-password">
<button type="submit">Sign in</button>
<p id="login-error" role="alert"></p>
</form>
<script>
document.getElementById("login-form").addEventListener("submit", async (event) => {
  event.preventDefault();
  const form = new FormData(event.target);
  const response = await fetch("/api/auth/login", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ identifier: form.get("identifier"), password: form.get("password") }),
  });
  if (response.ok) {
    window.location.assign("/dashboard");
  } else {
    const body = await response.json().catch(() => ({}));
    document.getElementById("login-error").textContent = body.error || "Sign in failed";
  }
});
</script>
</main></body></html>
"#;

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>Tom & \"Jerry\"</b>"),
            "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("Chess Club"), "Chess Club");
    }
}
