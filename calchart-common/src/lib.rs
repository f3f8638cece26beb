//! # Calchart Common Library
//!
//! Shared code for the Calchart server:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Slug derivation for show names
//! - Credential hashing and signed login callbacks
//! - Database initialization and schema migrations

pub mod auth;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod slug;

pub use error::{Error, Result};
pub use slug::slugify;
