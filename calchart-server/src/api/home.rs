//! Home page: show lists and show creation

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use calchart_common::db::{Show, STUNT_COMMITTEE};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::actions::{ActionForm, ActionKind, ActionOutcome, ShowAction};
use super::auth::CurrentUser;
use super::ui::{home_page, HomePage};
use crate::db::shows;
use crate::error::{ApiError, ApiResult};
use crate::show::{create_show, CreateShow};
use crate::storage::UploadedFile;
use crate::AppState;

const HOME_ACTIONS: &[ActionKind] = &[ActionKind::CreateShow];

/// Show lists offered on the home page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    /// This year's band shows; Members Only users only
    Band,
    /// Shows owned by the current user
    Created,
}

impl Tab {
    pub fn as_str(self) -> &'static str {
        match self {
            Tab::Band => "band",
            Tab::Created => "created",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "band" => Some(Tab::Band),
            "created" => Some(Tab::Created),
            _ => None,
        }
    }

    /// Tab opened when the page loads
    pub fn default_for(current: &CurrentUser) -> Self {
        if current.user.is_members_only_user() {
            Tab::Band
        } else {
            Tab::Created
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HomeQuery {
    pub tab: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShowSummary {
    pub slug: String,
    pub name: String,
    pub published: bool,
}

impl From<Show> for ShowSummary {
    fn from(show: Show) -> Self {
        Self {
            slug: show.slug,
            name: show.name,
            published: show.published,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShowListResponse {
    pub shows: Vec<ShowSummary>,
}

/// GET /
///
/// Without `tab` renders the page; with it returns that tab's show list.
pub async fn home(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<HomeQuery>,
) -> ApiResult<Response> {
    let Some(tab) = query.tab else {
        let is_members_only = current.user.is_members_only_user();
        return Ok(home_page(&HomePage {
            username: &current.user.username,
            tab: Tab::default_for(&current).as_str(),
            show_band_tab: is_members_only,
            is_stunt: is_members_only && current.user.has_committee(STUNT_COMMITTEE),
        })
        .into_response());
    };

    let tab = Tab::from_name(&tab)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown tab: {:?}", tab)))?;
    let shows = list_tab(&state, &current, tab).await?;
    Ok(Json(ShowListResponse {
        shows: shows.into_iter().map(ShowSummary::from).collect(),
    })
    .into_response())
}

async fn list_tab(state: &AppState, current: &CurrentUser, tab: Tab) -> ApiResult<Vec<Show>> {
    match tab {
        Tab::Band => {
            if !current.user.is_members_only_user() {
                return Err(ApiError::Forbidden(
                    "Band shows are only visible to Members Only users".to_string(),
                ));
            }
            Ok(shows::list_band_shows(&state.db, Utc::now().year()).await?)
        }
        Tab::Created => Ok(shows::list_shows_by_owner(&state.db, &current.user.username).await?),
    }
}

/// POST /
pub async fn home_action(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    form: ActionForm,
) -> ApiResult<Response> {
    let action = ShowAction::from_form(form, HOME_ACTIONS)?;
    let outcome = match action {
        ShowAction::CreateShow {
            name,
            is_band,
            audio,
        } => create_show_action(&state, &current, &name, is_band, audio).await?,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown action: {:?}",
                other.kind().name()
            )))
        }
    };
    Ok(outcome.into_response_for("/"))
}

/// Create a show and send the user to its editor
///
/// Shared by the home page and the editor.
pub async fn create_show_action(
    state: &AppState,
    current: &CurrentUser,
    name: &str,
    is_band: bool,
    audio: Option<UploadedFile>,
) -> ApiResult<ActionOutcome> {
    if is_band && !current.user.has_committee(STUNT_COMMITTEE) {
        return Err(ApiError::Forbidden(
            "Only the STUNT committee can create band shows".to_string(),
        ));
    }

    let show = create_show(
        &state.db,
        &state.storage,
        CreateShow {
            name,
            owner: &current.user.username,
            is_band,
            audio,
        },
    )
    .await?;

    Ok(ActionOutcome::Response(
        Redirect::to(&format!("/editor/{}/", show.slug)).into_response(),
    ))
}
