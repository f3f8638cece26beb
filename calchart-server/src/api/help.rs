//! Help pages
//!
//! Static HTML from the help directory: `/help/` is `index.html`,
//! `/help/<page>/` is `<page>.html`. Pages may be nested (`/help/a/b/`).

use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn help_routes() -> Router<AppState> {
    Router::new()
        .route("/help/", get(help_index))
        .route("/help", get(|| async { Redirect::permanent("/help/") }))
        .route("/help/*page", get(help_page))
}

async fn help_index(State(state): State<AppState>) -> ApiResult<Response> {
    serve_page(&state, "index").await
}

async fn help_page(State(state): State<AppState>, Path(page): Path<String>) -> ApiResult<Response> {
    let page = page.trim_start_matches('/');
    match page.strip_suffix('/') {
        Some(page) => serve_page(&state, page).await,
        None => Ok(Redirect::permanent(&format!("/help/{}/", page)).into_response()),
    }
}

async fn serve_page(state: &AppState, page: &str) -> ApiResult<Response> {
    let path = page_path(&state.help_root, page)
        .ok_or_else(|| ApiError::NotFound(format!("Help page {}", page)))?;

    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Ok(Html(html).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound(format!("Help page {}", page)))
        }
        Err(e) => Err(e.into()),
    }
}

/// File for a help page; None unless every segment is a plain name
fn page_path(root: &std::path::Path, page: &str) -> Option<PathBuf> {
    let valid = !page.is_empty()
        && page.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
    valid.then(|| root.join(format!("{}.html", page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_path() {
        let root = std::path::Path::new("/srv/help");
        assert_eq!(page_path(root, "index"), Some(PathBuf::from("/srv/help/index.html")));
        assert_eq!(
            page_path(root, "editor/continuities"),
            Some(PathBuf::from("/srv/help/editor/continuities.html"))
        );
        assert_eq!(page_path(root, "../secret"), None);
        assert_eq!(page_path(root, "a//b"), None);
        assert_eq!(page_path(root, ""), None);
    }
}
