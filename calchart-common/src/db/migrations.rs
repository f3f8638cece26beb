//! Database schema migrations
//!
//! Versioned schema migrations so an existing database upgrades in place.
//! The applied version is tracked in the `schema_version` table.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - deployed databases depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Idempotent** - check before altering; a fresh database already has the
//!    current `CREATE TABLE` shape and every step must be a no-op there
//!
//! Changes to the *content* of stored show files are not schema migrations;
//! those live in the server's show data version steps.

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: Add is_band column to shows
///
/// **Background:** The first shows table had no notion of band shows. The
/// home page's band tab lists shows flagged here.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add is_band column to shows");

    if !table_exists(pool, "shows").await? {
        info!("  Shows table doesn't exist yet - skipping migration");
        return Ok(());
    }

    if column_exists(pool, "shows", "is_band").await? {
        info!("  is_band column already exists - skipping");
        return Ok(());
    }

    match sqlx::query("ALTER TABLE shows ADD COLUMN is_band INTEGER NOT NULL DEFAULT 0")
        .execute(pool)
        .await
    {
        Ok(_) => {
            info!("  ✓ Added is_band column to shows table");
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  is_band column added by concurrent initialization - skipping");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Migration v2: Unique index on shows.slug
///
/// **Background:** Slugs were originally only unique by convention. Two names
/// that differ only in punctuation or case produce the same slug, and the
/// editor URL could then resolve to either show. Existing duplicates must be
/// renamed by hand before this migration can apply.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Unique index on shows.slug");

    if !table_exists(pool, "shows").await? {
        info!("  Shows table doesn't exist yet - skipping migration");
        return Ok(());
    }

    let duplicates: Vec<String> = sqlx::query_scalar(
        "SELECT slug FROM shows GROUP BY slug HAVING COUNT(*) > 1 ORDER BY slug",
    )
    .fetch_all(pool)
    .await?;

    if !duplicates.is_empty() {
        return Err(Error::Conflict(format!(
            "Cannot add unique slug index, duplicate slugs: {}",
            duplicates.join(", ")
        )));
    }

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_shows_slug ON shows(slug)")
        .execute(pool)
        .await?;

    info!("  ✓ Created unique index idx_shows_slug");
    Ok(())
}
