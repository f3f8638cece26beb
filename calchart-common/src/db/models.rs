//! Database models

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// Committee whose members manage the band's shows
pub const STUNT_COMMITTEE: &str = "STUNT";

/// Format a timestamp the way every table stores it
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub api_token_expiry: Option<DateTime<Utc>>,
    pub committees: Vec<String>,
}

impl User {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let expiry: Option<String> = row.try_get("api_token_expiry")?;
        let committees: String = row.try_get("committees")?;
        Ok(Self {
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            password_salt: row.try_get("password_salt")?,
            api_token: row.try_get("api_token")?,
            api_token_expiry: expiry
                .as_deref()
                .map(|v| parse_timestamp("api_token_expiry", v))
                .transpose()?,
            committees: split_committees(&committees),
        })
    }

    /// Whether the account was provisioned through Members Only
    pub fn is_members_only_user(&self) -> bool {
        self.api_token.is_some()
    }

    pub fn has_committee(&self, committee: &str) -> bool {
        self.committees
            .iter()
            .any(|c| c.eq_ignore_ascii_case(committee))
    }

    /// Members Only token present and not expired
    pub fn has_valid_api_token(&self, now: DateTime<Utc>) -> bool {
        match (&self.api_token, self.api_token_expiry) {
            (Some(_), Some(expiry)) => expiry > now,
            _ => false,
        }
    }
}

/// Parse the comma-separated committee list stored on a user
pub fn split_committees(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let expires_at: String = row.try_get("expires_at")?;
        Ok(Self {
            token: row.try_get("token")?,
            username: row.try_get("username")?,
            expires_at: parse_timestamp("expires_at", &expires_at)?,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A show record
///
/// Payload fields hold storage names relative to the media root. The payload
/// bytes themselves are never part of this struct.
#[derive(Debug, Clone, Serialize)]
pub struct Show {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub owner: String,
    pub published: bool,
    pub is_band: bool,
    pub date_added: DateTime<Utc>,
    pub viewer_file: Option<String>,
    pub beats_file: Option<String>,
    pub audio_file: Option<String>,
}

impl Show {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let date_added: String = row.try_get("date_added")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            owner: row.try_get("owner")?,
            published: row.try_get::<i64, _>("published")? != 0,
            is_band: row.try_get::<i64, _>("is_band")? != 0,
            date_added: parse_timestamp("date_added", &date_added)?,
            viewer_file: non_empty(row.try_get("viewer_file")?),
            beats_file: non_empty(row.try_get("beats_file")?),
            audio_file: non_empty(row.try_get("audio_file")?),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
