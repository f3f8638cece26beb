//! Login, logout and the Members Only callback

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use calchart_common::auth::{validate_hash, verify_password, AuthError};
use calchart_common::db::split_committees;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::auth::{
    clear_session_cookie, optional_user, percent_encode, safe_next, session_cookie, session_token,
    LOGIN_PATH, MEMBERS_ONLY_LOGIN_PATH,
};
use super::ui::{login_page, LoginPage};
use crate::db::{sessions, users};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// GET /login/
pub async fn login_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NextQuery>,
) -> ApiResult<Response> {
    let next = safe_next(query.next.as_deref());
    if optional_user(&state, &headers).await?.is_some() {
        return Ok(Redirect::to(&next).into_response());
    }

    Ok(login_page(&LoginPage {
        next: &next,
        username: "",
        error: None,
        members_only: state.config.members_only_enabled(),
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

/// POST /login/
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Response> {
    let next = safe_next(form.next.as_deref());
    let username = form.username.trim();

    let verified = match users::find_user(&state.db, username).await? {
        Some(user) => verify_password(&form.password, &user.password_salt, &user.password_hash),
        None => Err(AuthError::InvalidCredentials),
    };

    if let Err(e) = verified {
        warn!("Failed login for {:?}: {}", username, e);
        return Ok(login_page(&LoginPage {
            next: &next,
            username,
            error: Some("Invalid username or password"),
            members_only: state.config.members_only_enabled(),
        })
        .into_response());
    }

    let expires_at = expiry_after_days(state.config.session_ttl_days).ok_or_else(|| {
        ApiError::Internal(format!(
            "session_ttl_days out of range: {}",
            state.config.session_ttl_days
        ))
    })?;
    let session = sessions::create_session(&state.db, username, expires_at).await?;
    info!("User {} logged in", username);

    Ok((
        [(header::SET_COOKIE, session_cookie(&session, !state.config.is_local))],
        Redirect::to(&next),
    )
        .into_response())
}

/// GET /logout/
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(token) = session_token(&headers) {
        sessions::delete_session(&state.db, &token).await?;
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie(!state.config.is_local))],
        Redirect::to(LOGIN_PATH),
    )
        .into_response())
}

/// GET /login/members-only/
///
/// Without a `username` parameter the user is sent to Members Only, which
/// redirects back here with the signed identity fields. With them, the
/// signature is checked and a session opened.
pub async fn members_only(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    let Some(secret) = state.config.members_only_secret.as_deref() else {
        return Err(ApiError::Forbidden("Members Only login is not configured".to_string()));
    };
    let next = safe_next(params.get("next").map(String::as_str));

    if params.contains_key("username") {
        return members_only_callback(&state, secret, &params, &next).await;
    }

    let Some(members_only_url) = state.config.members_only_url.as_deref() else {
        return Err(ApiError::Forbidden("Members Only login is not configured".to_string()));
    };

    let return_to = format!(
        "{}{}?next={}",
        origin(&headers),
        MEMBERS_ONLY_LOGIN_PATH,
        percent_encode(&next)
    );
    let separator = if members_only_url.contains('?') { '&' } else { '?' };
    let target = format!(
        "{}{}next={}",
        members_only_url,
        separator,
        percent_encode(&return_to)
    );
    Ok(Redirect::to(&target).into_response())
}

async fn members_only_callback(
    state: &AppState,
    secret: &str,
    params: &HashMap<String, String>,
    next: &str,
) -> ApiResult<Response> {
    let field = |name: &'static str| {
        params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ApiError::BadRequest(AuthError::MissingField(name).to_string()))
    };

    let username = field("username")?;
    let api_token = field("api_token")?;
    let ttl_days = field("ttl_days")?;
    let hash = field("hash")?;
    let committees = params.get("committees").map(String::as_str).unwrap_or("");

    let signed = json!({
        "username": username,
        "api_token": api_token,
        "ttl_days": ttl_days,
        "committees": committees,
        "hash": hash,
    });
    if let Err(e) = validate_hash(hash, &signed, secret) {
        if let AuthError::InvalidHash { provided, calculated } = &e {
            warn!(
                "Members Only hash validation failed for {}: provided={}, calculated={}",
                username, provided, calculated
            );
        }
        return Err(ApiError::Forbidden(e.to_string()));
    }

    let expires_at = ttl_days
        .parse::<i64>()
        .ok()
        .filter(|days| *days > 0)
        .and_then(expiry_after_days)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid ttl_days: {:?}", ttl_days)))?;
    let user = users::upsert_members_only_user(
        &state.db,
        username,
        api_token,
        expires_at,
        &split_committees(committees),
    )
    .await?;
    let session = sessions::create_session(&state.db, &user.username, expires_at).await?;
    info!("Members Only user {} logged in", user.username);

    Ok((
        [(header::SET_COOKIE, session_cookie(&session, !state.config.is_local))],
        Redirect::to(next),
    )
        .into_response())
}

/// `now + days`, or None when the result is not representable
fn expiry_after_days(days: i64) -> Option<DateTime<Utc>> {
    Utc::now().checked_add_signed(Duration::try_days(days)?)
}

/// `scheme://host` of the request, as seen by the client
fn origin(headers: &HeaderMap) -> String {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str("x-forwarded-host")
        .or_else(|| header_str(header::HOST.as_str()))
        .unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}
