//! POST action dispatch
//!
//! Pages accept POST requests carrying an `action` field. Each action is a
//! variant of [`ShowAction`] with its inputs declared as fields, so a request
//! either parses into a complete action or is rejected before any handler
//! runs. A page states which actions it accepts; anything else is a 400.
//!
//! Handlers return an [`ActionOutcome`]:
//! - `Redirect`: 303 back to the page that received the POST
//! - `Json`: the value as a JSON body
//! - `Response`: passed through unchanged

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::storage::UploadedFile;

/// Field carrying the action name
pub const ACTION_FIELD: &str = "action";

/// Names of every known action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SaveShow,
    UploadSheetImage,
    CreateShow,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::SaveShow,
        ActionKind::UploadSheetImage,
        ActionKind::CreateShow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::SaveShow => "save_show",
            ActionKind::UploadSheetImage => "upload_sheet_image",
            ActionKind::CreateShow => "create_show",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// A parsed action with its inputs
#[derive(Debug)]
pub enum ShowAction {
    /// Replace the show's viewer JSON
    SaveShow { viewer: String },
    /// Store a background image for one sheet of the show
    UploadSheetImage { sheet: String, image: UploadedFile },
    /// Create a new show, optionally with audio
    CreateShow {
        name: String,
        is_band: bool,
        audio: Option<UploadedFile>,
    },
}

impl ShowAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ShowAction::SaveShow { .. } => ActionKind::SaveShow,
            ShowAction::UploadSheetImage { .. } => ActionKind::UploadSheetImage,
            ShowAction::CreateShow { .. } => ActionKind::CreateShow,
        }
    }

    /// Parse a submitted form into one of the `accepted` actions
    ///
    /// A form without an action field is a 405; an unknown action, one the
    /// page does not accept, or a missing input is a 400.
    pub fn from_form(mut form: ActionForm, accepted: &[ActionKind]) -> ApiResult<Self> {
        let name = form.take_field(ACTION_FIELD).ok_or_else(|| {
            ApiError::MethodNotAllowed("POST requires an action field".to_string())
        })?;

        let kind = ActionKind::from_name(&name)
            .filter(|kind| accepted.contains(kind))
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown action: {:?}", name)))?;

        let action = match kind {
            ActionKind::SaveShow => ShowAction::SaveShow {
                viewer: form.require_field("viewer")?,
            },
            ActionKind::UploadSheetImage => ShowAction::UploadSheetImage {
                sheet: form.require_field("sheet")?,
                image: form.require_file("image")?,
            },
            ActionKind::CreateShow => ShowAction::CreateShow {
                name: form.require_field("name")?,
                is_band: form.take_field("is_band").is_some_and(|v| is_truthy(&v)),
                audio: form.take_file("audio"),
            },
        };
        Ok(action)
    }
}

/// Checkbox and boolean spellings accepted as true
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1" | "yes"
    )
}

/// What an action handler produced
#[derive(Debug)]
pub enum ActionOutcome {
    Redirect,
    Json(Value),
    Response(Response),
}

impl ActionOutcome {
    /// Turn the outcome into a response for a POST to `path`
    pub fn into_response_for(self, path: &str) -> Response {
        match self {
            ActionOutcome::Redirect => Redirect::to(path).into_response(),
            ActionOutcome::Json(value) => Json(value).into_response(),
            ActionOutcome::Response(response) => response,
        }
    }
}

/// Text fields and files of a submitted form
///
/// Accepts `multipart/form-data` and `application/x-www-form-urlencoded`.
/// When a field repeats, the last value wins.
#[derive(Debug, Default)]
pub struct ActionForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl ActionForm {
    pub fn take_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    fn require_field(&mut self, name: &str) -> ApiResult<String> {
        self.take_field(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing field: {}", name)))
    }

    fn require_file(&mut self, name: &str) -> ApiResult<UploadedFile> {
        self.take_file(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing file: {}", name)))
    }
}

fn rejection(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(text)
    } else {
        ApiError::BadRequest(text)
    }
}

#[async_trait]
impl<S> FromRequest<S> for ActionForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        let mut form = ActionForm::default();

        if !is_multipart {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| rejection(e.status(), e.body_text()))?;
            form.fields.extend(pairs);
            return Ok(form);
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| rejection(e.status(), e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| rejection(e.status(), e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| rejection(e.status(), e.body_text()))?;
                    // An empty file input submits a part with no name and no content
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| rejection(e.status(), e.body_text()))?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> ActionForm {
        let mut form = ActionForm::default();
        for (k, v) in fields {
            form.fields.insert(k.to_string(), v.to_string());
        }
        form
    }

    #[test]
    fn test_missing_action_is_method_not_allowed() {
        let err = ShowAction::from_form(form(&[("viewer", "{}")]), &ActionKind::ALL).unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_unknown_action_is_bad_request() {
        let err = ShowAction::from_form(form(&[("action", "delete_show")]), &ActionKind::ALL)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_action_not_accepted_by_page() {
        let err = ShowAction::from_form(
            form(&[("action", "save_show"), ("viewer", "{}")]),
            &[ActionKind::CreateShow],
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_input_is_bad_request() {
        let err = ShowAction::from_form(form(&[("action", "save_show")]), &ActionKind::ALL)
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("viewer")));

        let err = ShowAction::from_form(
            form(&[("action", "upload_sheet_image"), ("sheet", "0")]),
            &ActionKind::ALL,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("image")));
    }

    #[test]
    fn test_parse_create_show() {
        let action = ShowAction::from_form(
            form(&[("action", "create_show"), ("name", "Script Ohio"), ("is_band", "on")]),
            &[ActionKind::CreateShow],
        )
        .unwrap();

        match action {
            ShowAction::CreateShow { name, is_band, audio } => {
                assert_eq!(name, "Script Ohio");
                assert!(is_band);
                assert!(audio.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_is_truthy() {
        for v in ["true", "On", "1", "YES"] {
            assert!(is_truthy(v), "{}", v);
        }
        for v in ["false", "0", "", "off"] {
            assert!(!is_truthy(v), "{}", v);
        }
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_outcome_redirect_targets_current_path() {
        let response = ActionOutcome::Redirect.into_response_for("/editor/script-ohio/");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/editor/script-ohio/"
        );
    }
}
