//! Show editor page and its actions

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Extension,
};
use serde_json::json;
use tracing::{debug, info};

use super::actions::{ActionForm, ActionKind, ActionOutcome, ShowAction};
use super::auth::CurrentUser;
use super::export::download_path;
use super::home::create_show_action;
use super::ui::{editor_page, EditorPage};
use crate::error::{ApiError, ApiResult};
use crate::show::ShowHandle;
use crate::storage::{sanitize_filename, UploadedFile, BACKGROUNDS_DIR};
use crate::AppState;

pub fn editor_path(slug: &str) -> String {
    format!("/editor/{}/", slug)
}

/// GET /editor/:slug/
pub async fn editor(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Response> {
    let handle = ShowHandle::load(&state.db, &slug).await?;
    let show = handle.show();

    Ok(editor_page(&EditorPage {
        show,
        audio_url: show.audio_file.as_deref().map(|name| state.storage.url(name)),
        download_url: download_path(&show.slug),
        is_local: state.config.is_local,
    })
    .into_response())
}

/// POST /editor/:slug/
pub async fn editor_action(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(slug): Path<String>,
    form: ActionForm,
) -> ApiResult<Response> {
    let mut handle = ShowHandle::load(&state.db, &slug).await?;
    let action = ShowAction::from_form(form, &ActionKind::ALL)?;
    debug!("{} on {} by {}", action.kind().name(), slug, current.user.username);

    let outcome = match action {
        ShowAction::SaveShow { viewer } => {
            handle
                .set_viewer(&state.db, &state.storage, viewer.into_bytes())
                .await?;
            info!("Saved show {} ({})", handle.show().slug, current.user.username);
            ActionOutcome::Redirect
        }
        ShowAction::UploadSheetImage { sheet, image } => {
            upload_sheet_image(&state, &handle, &sheet, image).await?
        }
        ShowAction::CreateShow {
            name,
            is_band,
            audio,
        } => create_show_action(&state, &current, &name, is_band, audio).await?,
    };

    Ok(outcome.into_response_for(&editor_path(&slug)))
}

/// Store a sheet's background image, replacing any image of the same name
async fn upload_sheet_image(
    state: &AppState,
    handle: &ShowHandle,
    sheet: &str,
    image: UploadedFile,
) -> ApiResult<ActionOutcome> {
    let file_name = sanitize_filename(&image.file_name).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid image file name: {:?}", image.file_name))
    })?;

    let name = format!("{}/{}/{}", BACKGROUNDS_DIR, handle.show().slug, file_name);
    let stored = state.storage.replace(&name, &image.bytes).await?;
    debug!("Stored background for sheet {} of {}: {}", sheet, handle.show().slug, stored);

    Ok(ActionOutcome::Json(json!({
        "url": state.storage.url(&stored),
    })))
}
