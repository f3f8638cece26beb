//! Login session queries

use calchart_common::auth::generate_token;
use calchart_common::db::{format_timestamp, Session};
use calchart_common::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Open a session for a user, valid until `expires_at`
pub async fn create_session(
    pool: &SqlitePool,
    username: &str,
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    let token = generate_token();

    sqlx::query("INSERT INTO sessions (token, username, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(username)
        .bind(format_timestamp(&expires_at))
        .execute(pool)
        .await?;

    Ok(Session {
        token,
        username: username.to_string(),
        expires_at,
    })
}

pub async fn find_session(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT token, username, expires_at FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(Session::from_row).transpose()
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove every expired session, returning how many were removed
pub async fn purge_expired_sessions(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT token, expires_at FROM sessions")
        .fetch_all(pool)
        .await?;

    let mut purged = 0;
    for (token, expires_at) in rows {
        let expired = calchart_common::db::parse_timestamp("expires_at", &expires_at)
            .map(|ts| ts <= now)
            .unwrap_or(true);
        if expired {
            delete_session(pool, &token).await?;
            purged += 1;
        }
    }
    Ok(purged)
}
