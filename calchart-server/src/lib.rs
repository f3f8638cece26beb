//! calchart-server library
//!
//! Web backend for Calchart: login, show lists, the show editor's page
//! shells and actions, viewer downloads, help pages and media files.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use calchart_common::config::ServerConfig;
use sqlx::SqlitePool;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod api;
pub mod db;
pub mod error;
pub mod show;
pub mod show_versions;
pub mod storage;

pub use error::{ApiError, ApiResult};

use storage::FileStorage;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Show payloads and uploads, under the media root
    pub storage: FileStorage,
    pub help_root: PathBuf,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        let initializer = config.initializer();
        Self {
            db,
            storage: FileStorage::new(initializer.media_root(), config.media_url.clone()),
            help_root: initializer.help_root(),
            config: Arc::new(config),
        }
    }
}

/// Build application router
///
/// `/` and `/editor/:slug/` require a session; everything else is public.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(api::home).post(api::home_action))
        .route("/editor/:slug/", get(api::editor).post(api::editor_action))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_login,
        ));

    let public = Router::new()
        .route("/login/", get(api::login_form).post(api::login_submit))
        .route("/login/members-only/", get(api::members_only))
        .route("/logout/", get(api::logout))
        .route("/download/:file", get(api::export))
        .merge(api::help_routes())
        .merge(api::health_routes());

    let media = ServeDir::new(state.storage.root());
    let media_prefix = state.config.media_url.trim_end_matches('/').to_string();
    let max_upload_bytes = state.config.max_upload_bytes;

    let router = Router::new().merge(protected).merge(public);
    let router = if media_prefix.is_empty() {
        router.fallback_service(media)
    } else {
        router.nest_service(&media_prefix, media)
    };

    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
