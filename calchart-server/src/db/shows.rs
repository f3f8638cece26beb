//! Show record queries

use calchart_common::db::{format_timestamp, Show};
use calchart_common::{Error, Result};
use chrono::{DateTime, Datelike, Utc};
use sqlx::SqlitePool;

use crate::show::PayloadKind;

const SHOW_COLUMNS: &str = "id, name, slug, owner, published, is_band, date_added, viewer_file, beats_file, audio_file";

/// Fields of a show about to be inserted
#[derive(Debug, Clone)]
pub struct NewShow<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub owner: &'a str,
    pub is_band: bool,
    pub audio_file: Option<&'a str>,
    pub date_added: DateTime<Utc>,
}

/// Insert a show
///
/// Fails with `Error::Conflict` when the name or slug is already taken.
pub async fn insert_show(pool: &SqlitePool, new: &NewShow<'_>) -> Result<Show> {
    let result = sqlx::query(
        r#"
        INSERT INTO shows (name, slug, owner, published, is_band, date_added, audio_file)
        VALUES (?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(new.name)
    .bind(new.slug)
    .bind(new.owner)
    .bind(new.is_band as i64)
    .bind(format_timestamp(&new.date_added))
    .bind(new.audio_file.unwrap_or(""))
    .execute(pool)
    .await;

    match result {
        Ok(_) => get_show_by_slug(pool, new.slug).await,
        Err(e) if Error::is_unique_violation(&e) => {
            let message = e.to_string();
            if message.contains("shows.slug") || message.contains("idx_shows_slug") {
                Err(Error::Conflict(format!(
                    "Show name {:?} produces slug {:?}, which is already in use",
                    new.name, new.slug
                )))
            } else {
                Err(Error::Conflict(format!("A show named {:?} already exists", new.name)))
            }
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn find_show_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Show>> {
    let row = sqlx::query(&format!("SELECT {} FROM shows WHERE slug = ?", SHOW_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(Show::from_row).transpose()
}

/// Load a show by slug, `Error::NotFound` if absent
pub async fn get_show_by_slug(pool: &SqlitePool, slug: &str) -> Result<Show> {
    find_show_by_slug(pool, slug)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Show {}", slug)))
}

/// Shows owned by a user, newest first
pub async fn list_shows_by_owner(pool: &SqlitePool, owner: &str) -> Result<Vec<Show>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM shows WHERE owner = ? ORDER BY date_added DESC, id DESC",
        SHOW_COLUMNS
    ))
    .bind(owner)
    .fetch_all(pool)
    .await?;

    rows.iter().map(Show::from_row).collect()
}

/// Band shows created in the given calendar year, newest first
pub async fn list_band_shows(pool: &SqlitePool, year: i32) -> Result<Vec<Show>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM shows WHERE is_band = 1 ORDER BY date_added DESC, id DESC",
        SHOW_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let mut shows = Vec::with_capacity(rows.len());
    for row in &rows {
        let show = Show::from_row(row)?;
        if show.date_added.year() == year {
            shows.push(show);
        }
    }
    Ok(shows)
}

/// Every show, oldest first
pub async fn list_shows(pool: &SqlitePool) -> Result<Vec<Show>> {
    let rows = sqlx::query(&format!("SELECT {} FROM shows ORDER BY id", SHOW_COLUMNS))
        .fetch_all(pool)
        .await?;

    rows.iter().map(Show::from_row).collect()
}

/// Point a payload column at a new storage name
///
/// Returns the name that was replaced, if any. The update only applies while
/// the column still holds the value just read, so each concurrent writer gets
/// back a distinct previous name and no replaced name is reported twice.
pub async fn swap_payload_file(
    pool: &SqlitePool,
    show_id: i64,
    kind: PayloadKind,
    storage_name: &str,
) -> Result<Option<String>> {
    let column = kind.column();
    loop {
        let current: String =
            sqlx::query_scalar(&format!("SELECT {} FROM shows WHERE id = ?", column))
                .bind(show_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Show id {}", show_id)))?;

        let result = sqlx::query(&format!(
            "UPDATE shows SET {col} = ? WHERE id = ? AND {col} = ?",
            col = column
        ))
        .bind(storage_name)
        .bind(show_id)
        .bind(&current)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Some(current).filter(|name| !name.is_empty()));
        }
    }
}
