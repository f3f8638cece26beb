//! Session authentication for calchart-server
//!
//! Sessions are random tokens stored in the `sessions` table and carried in
//! the `calchart_session` cookie. [`require_login`] guards every page that
//! needs a user:
//! - no cookie or unknown token: 303 to `/login/?next=<path>`
//! - expired session (or expired Members Only token): session deleted, 303 to
//!   the re-authentication URL
//! - otherwise: [`CurrentUser`] is added to the request extensions
//!
//! The guarded handler never runs unless the session is valid.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use calchart_common::db::{Session, User};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::db::{sessions, users};
use crate::error::ApiError;
use crate::AppState;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "calchart_session";

pub const LOGIN_PATH: &str = "/login/";
pub const MEMBERS_ONLY_LOGIN_PATH: &str = "/login/members-only/";

/// The authenticated user of a request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

/// Middleware for login-guarded routes
pub async fn require_login(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    match authenticate(&state, request.headers(), Utc::now()).await {
        Ok(Authentication::Valid(current)) => {
            request.extensions_mut().insert(current);
            next.run(request).await
        }
        Ok(Authentication::Missing) => {
            debug!("No session for {}, redirecting to login", path);
            Redirect::to(&login_url(LOGIN_PATH, &path)).into_response()
        }
        Ok(Authentication::Expired) => {
            info!("Session expired for {}, re-authenticating", path);
            let target = login_url(reauth_path(&state), &path);
            (
                [(header::SET_COOKIE, clear_session_cookie(!state.config.is_local))],
                Redirect::to(&target),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

enum Authentication {
    Valid(CurrentUser),
    Missing,
    Expired,
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Result<Authentication, ApiError> {
    let Some(token) = session_token(headers) else {
        return Ok(Authentication::Missing);
    };

    let Some(session) = sessions::find_session(&state.db, &token).await? else {
        return Ok(Authentication::Missing);
    };

    if session.is_expired(now) {
        sessions::delete_session(&state.db, &session.token).await?;
        return Ok(Authentication::Expired);
    }

    let Some(user) = users::find_user(&state.db, &session.username).await? else {
        warn!("Session belongs to missing user {}", session.username);
        sessions::delete_session(&state.db, &session.token).await?;
        return Ok(Authentication::Missing);
    };

    // Members Only accounts are only as valid as their API token
    if user.is_members_only_user() && !user.has_valid_api_token(now) {
        sessions::delete_session(&state.db, &session.token).await?;
        return Ok(Authentication::Expired);
    }

    Ok(Authentication::Valid(CurrentUser { user, session }))
}

/// The request's user when it carries a valid session
pub async fn optional_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<CurrentUser>, ApiError> {
    match authenticate(state, headers, Utc::now()).await? {
        Authentication::Valid(current) => Ok(Some(current)),
        Authentication::Missing | Authentication::Expired => Ok(None),
    }
}

/// Where expired users go to log in again
pub fn reauth_path(state: &AppState) -> &'static str {
    if state.config.members_only_enabled() {
        MEMBERS_ONLY_LOGIN_PATH
    } else {
        LOGIN_PATH
    }
}

/// `login_path?next=<encoded next>`
pub fn login_url(login_path: &str, next: &str) -> String {
    format!("{}?next={}", login_path, percent_encode(next))
}

/// Session token from the request's cookies
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Set-Cookie value for a new session
///
/// `secure` adds the `Secure` attribute; it is off only for local installs
/// served over plain HTTP.
pub fn session_cookie(session: &Session, secure: bool) -> HeaderValue {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        SESSION_COOKIE,
        session.token,
        max_age,
        if secure { "; Secure" } else { "" }
    );
    // Tokens are hex, so the value is always a valid header
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_session_cookie(secure))
}

/// Set-Cookie value that removes the session cookie
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static(
            "calchart_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure",
        )
    } else {
        HeaderValue::from_static("calchart_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

/// Redirect target from a `next` parameter
///
/// Only local absolute paths are honoured; anything else falls back to `/`.
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(next)
            if next.starts_with('/')
                && !next.starts_with("//")
                && !next.contains('\\')
                && !next.chars().any(char::is_control) =>
        {
            next.to_string()
        }
        _ => "/".to_string(),
    }
}

/// Percent-encode a query parameter value
pub fn percent_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
