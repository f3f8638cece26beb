//! User account queries

use calchart_common::auth::{generate_salt, hash_password};
use calchart_common::db::{format_timestamp, User};
use calchart_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

const USER_COLUMNS: &str =
    "username, password_hash, password_salt, api_token, api_token_expiry, committees";

pub async fn find_user(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
        .bind(username)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(User::from_row).transpose()
}

/// Create a local account with a password
pub async fn create_local_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    committees: &[String],
) -> Result<User> {
    validate_username(username)?;
    if password.is_empty() {
        return Err(Error::InvalidInput("Password must not be empty".to_string()));
    }

    let salt = generate_salt();
    let result = sqlx::query(
        "INSERT INTO users (username, password_hash, password_salt, committees) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hash_password(password, &salt))
    .bind(&salt)
    .bind(committees.join(","))
    .execute(pool)
    .await;

    match result {
        Ok(_) => {}
        Err(e) if Error::is_unique_violation(&e) => {
            return Err(Error::Conflict(format!("User {:?} already exists", username)));
        }
        Err(e) => return Err(e.into()),
    }

    find_user(pool, username)
        .await?
        .ok_or_else(|| Error::Internal(format!("User {} vanished after insert", username)))
}

/// Create or refresh an account from a Members Only login
///
/// The password columns of an existing account are left untouched.
pub async fn upsert_members_only_user(
    pool: &SqlitePool,
    username: &str,
    api_token: &str,
    api_token_expiry: DateTime<Utc>,
    committees: &[String],
) -> Result<User> {
    validate_username(username)?;

    sqlx::query(
        r#"
        INSERT INTO users (username, api_token, api_token_expiry, committees)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(username) DO UPDATE SET
            api_token = excluded.api_token,
            api_token_expiry = excluded.api_token_expiry,
            committees = excluded.committees
        "#,
    )
    .bind(username)
    .bind(api_token)
    .bind(format_timestamp(&api_token_expiry))
    .bind(committees.join(","))
    .execute(pool)
    .await?;

    find_user(pool, username)
        .await?
        .ok_or_else(|| Error::Internal(format!("User {} vanished after upsert", username)))
}

fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && username.len() <= 150
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid username {:?}", username)))
    }
}
