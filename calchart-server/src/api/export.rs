//! Raw viewer download

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use calchart_common::slug::is_valid_slug;

use crate::error::{ApiError, ApiResult};
use crate::show::ShowHandle;
use crate::AppState;

const EXTENSION: &str = ".json";

pub fn download_path(slug: &str) -> String {
    format!("/download/{}{}", slug, EXTENSION)
}

/// GET /download/:slug.json
///
/// The viewer bytes exactly as stored, as an attachment named `<slug>.json`.
pub async fn export(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let slug = file
        .strip_suffix(EXTENSION)
        .filter(|slug| is_valid_slug(slug))
        .ok_or_else(|| ApiError::NotFound(format!("Download {}", file)))?;

    let mut handle = ShowHandle::load(&state.db, slug).await?;
    let viewer = handle
        .viewer(&state.storage)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Show {} has no saved data", slug)))?
        .to_vec();

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}.json", slug),
            ),
        ],
        viewer,
    )
        .into_response())
}
