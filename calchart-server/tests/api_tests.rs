//! Integration tests for calchart-server pages and actions
//!
//! Tests cover:
//! - Login guard on the home and editor pages
//! - Home tabs and show creation
//! - Editor actions: save_show, upload_sheet_image, create_show
//! - Viewer download
//! - Help pages, media and health

mod helpers;

use axum::http::StatusCode;
use calchart_server::db::shows;
use calchart_server::show::{create_show, CreateShow, ShowHandle};
use helpers::*;
use serde_json::json;
use tower::util::ServiceExt; // for `oneshot` method

async fn seed_show(app: &TestApp, name: &str, owner: &str, is_band: bool) -> String {
    create_show(
        &app.state.db,
        &app.state.storage,
        CreateShow {
            name,
            owner,
            is_band,
            audio: None,
        },
    )
    .await
    .unwrap()
    .slug
}

// =============================================================================
// Health Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = TestApp::new().await;

    let response = app.router().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "calchart-server");
    assert!(body["version"].is_string());
}

// =============================================================================
// Login Guard Tests
// =============================================================================

#[tokio::test]
async fn test_home_without_session_redirects_to_login() {
    let app = TestApp::new().await;

    let response = app.router().oneshot(get("/?tab=created", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login/?next=/%3Ftab%3Dcreated");
}

#[tokio::test]
async fn test_unknown_session_redirects_to_login() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(get("/", Some("calchart_session=not-a-real-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login/?next="));
}

#[tokio::test]
async fn test_unauthenticated_save_never_reaches_handler() {
    let app = TestApp::new().await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(post_form(
            &format!("/editor/{}/", slug),
            None,
            &[("action", "save_show"), ("viewer", "{\"version\":6}")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let show = shows::get_show_by_slug(&app.state.db, &slug).await.unwrap();
    assert!(show.viewer_file.is_none());
}

#[tokio::test]
async fn test_expired_session_is_deleted_and_redirected() {
    let app = TestApp::new().await;
    app.login_local("alice", &[]).await;
    let session = app.open_session("alice", chrono::Duration::seconds(-1)).await;

    let response = app
        .router()
        .oneshot(get("/", Some(&cookie(&session))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login/?next="));
    assert!(set_cookie(&response).unwrap().contains("Max-Age=0"));

    let found = calchart_server::db::sessions::find_session(&app.state.db, &session.token)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_expired_session_reauthenticates_with_members_only() {
    let app = TestApp::with_members_only(true).await;
    app.login_members_only("bob", &[]).await;
    let session = app.open_session("bob", chrono::Duration::seconds(-1)).await;

    let response = app
        .router()
        .oneshot(get("/editor/x/", Some(&cookie(&session))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login/members-only/?next=/editor/x/");
}

// =============================================================================
// Home Page Tests
// =============================================================================

#[tokio::test]
async fn test_home_page_renders() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;

    let response = app.router().oneshot(get("/", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("data-tab=\"created\""));
    assert!(html.contains("alice"));
}

#[tokio::test]
async fn test_band_tab_forbidden_for_local_user() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &["STUNT"]).await;

    let response = app
        .router()
        .oneshot(get("/?tab=band", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_band_tab_lists_this_years_band_shows() {
    let app = TestApp::new().await;
    let cookie = app.login_members_only("bob", &[]).await;
    seed_show(&app, "Band Show", "stunt", true).await;
    seed_show(&app, "Personal Show", "stunt", false).await;

    let response = app
        .router()
        .oneshot(get("/?tab=band", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"shows": [{"slug": "band-show", "name": "Band Show", "published": false}]})
    );
}

#[tokio::test]
async fn test_created_tab_lists_own_shows() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    seed_show(&app, "Mine", "alice", false).await;
    seed_show(&app, "Theirs", "carol", false).await;

    let response = app
        .router()
        .oneshot(get("/?tab=created", Some(&cookie)))
        .await
        .unwrap();
    let body = body_json(response).await;
    let slugs: Vec<&str> = body["shows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["mine"]);
}

#[tokio::test]
async fn test_unknown_tab_is_bad_request() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;

    let response = app
        .router()
        .oneshot(get("/?tab=everything", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("everything"));
}

#[tokio::test]
async fn test_create_show_redirects_to_editor() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;

    let response = app
        .router()
        .oneshot(post_form(
            "/",
            Some(&cookie),
            &[("action", "create_show"), ("name", "Script Ohio!")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/editor/script-ohio/");

    let show = shows::get_show_by_slug(&app.state.db, "script-ohio").await.unwrap();
    assert_eq!(show.owner, "alice");
    assert!(!show.is_band);
}

#[tokio::test]
async fn test_create_show_with_audio() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;

    let response = app
        .router()
        .oneshot(post_multipart(
            "/",
            Some(&cookie),
            &[("action", "create_show"), ("name", "Band Dance")],
            &[FilePart {
                field: "audio",
                file_name: "dance.mp3",
                content_type: "audio/mpeg",
                bytes: b"ID3 fake audio",
            }],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let show = shows::get_show_by_slug(&app.state.db, "band-dance").await.unwrap();
    let audio = show.audio_file.expect("audio stored");
    assert_eq!(audio, "audio/dance.mp3");
    assert_eq!(app.state.storage.read(&audio).await.unwrap(), b"ID3 fake audio");
}

#[tokio::test]
async fn test_create_duplicate_show_conflicts() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(post_form(
            "/",
            Some(&cookie),
            &[("action", "create_show"), ("name", "Script Ohio")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_band_show_requires_stunt() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &["Drumline"]).await;

    let response = app
        .router()
        .oneshot(post_form(
            "/",
            Some(&cookie),
            &[("action", "create_show"), ("name", "Pregame"), ("is_band", "true")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(shows::find_show_by_slug(&app.state.db, "pregame").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stunt_member_creates_band_show() {
    let app = TestApp::new().await;
    let cookie = app.login_members_only("bob", &["STUNT"]).await;

    let response = app
        .router()
        .oneshot(post_form(
            "/",
            Some(&cookie),
            &[("action", "create_show"), ("name", "Pregame"), ("is_band", "on")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let show = shows::get_show_by_slug(&app.state.db, "pregame").await.unwrap();
    assert!(show.is_band);
}

// =============================================================================
// Action Dispatch Tests
// =============================================================================

#[tokio::test]
async fn test_post_without_action_is_method_not_allowed() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;

    let response = app
        .router()
        .oneshot(post_form("/", Some(&cookie), &[("name", "x")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_action_is_bad_request() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(post_form(
            &format!("/editor/{}/", slug),
            Some(&cookie),
            &[("action", "delete_show")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_home_rejects_editor_actions() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;

    let response = app
        .router()
        .oneshot(post_form(
            "/",
            Some(&cookie),
            &[("action", "save_show"), ("viewer", "{}")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Editor Tests
// =============================================================================

#[tokio::test]
async fn test_editor_page_for_missing_show_is_not_found() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;

    let response = app
        .router()
        .oneshot(get("/editor/nope/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_editor_page_renders_show() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(get(&format!("/editor/{}/", slug), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("Script Ohio"));
    assert!(html.contains("/download/script-ohio.json"));
}

#[tokio::test]
async fn test_save_show_then_download_roundtrip() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;
    let viewer = r#"{"version": 6, "title": "Script Ohio", "sheets": [{"beats": 16}]}"#;

    let response = app
        .router()
        .oneshot(post_form(
            &format!("/editor/{}/", slug),
            Some(&cookie),
            &[("action", "save_show"), ("viewer", viewer)],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/editor/script-ohio/");

    let response = app
        .router()
        .oneshot(get("/download/script-ohio.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=script-ohio.json"
    );
    assert_eq!(body_bytes(response).await, viewer.as_bytes());
}

#[tokio::test]
async fn test_resave_keeps_slug_and_single_file() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;

    for viewer in ["{\"v\":1}", "{\"v\":2}", "{\"v\":3}"] {
        let response = app
            .router()
            .oneshot(post_form(
                &format!("/editor/{}/", slug),
                Some(&cookie),
                &[("action", "save_show"), ("viewer", viewer)],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    let mut handle = ShowHandle::load(&app.state.db, &slug).await.unwrap();
    assert_eq!(handle.show().slug, "script-ohio");
    assert_eq!(handle.viewer(&app.state.storage).await.unwrap(), Some(&b"{\"v\":3}"[..]));

    let files = std::fs::read_dir(app.state.storage.root().join("viewer"))
        .unwrap()
        .count();
    assert_eq!(files, 1);
}

#[tokio::test]
async fn test_upload_sheet_image_returns_url() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;
    let uri = format!("/editor/{}/", slug);

    for content in [&b"first"[..], &b"second"[..]] {
        let response = app
            .router()
            .oneshot(post_multipart(
                &uri,
                Some(&cookie),
                &[("action", "upload_sheet_image"), ("sheet", "2")],
                &[FilePart {
                    field: "image",
                    file_name: "field.png",
                    content_type: "image/png",
                    bytes: content,
                }],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body, json!({"url": "/media/backgrounds/script-ohio/field.png"}));
    }

    // Second upload replaced the first under the same name
    let stored = app
        .state
        .storage
        .read("backgrounds/script-ohio/field.png")
        .await
        .unwrap();
    assert_eq!(stored, b"second");

    let response = app
        .router()
        .oneshot(get("/media/backgrounds/script-ohio/field.png", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"second");
}

#[tokio::test]
async fn test_upload_sheet_image_without_file_is_bad_request() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(post_multipart(
            &format!("/editor/{}/", slug),
            Some(&cookie),
            &[("action", "upload_sheet_image"), ("sheet", "0")],
            &[],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_show_from_editor() {
    let app = TestApp::new().await;
    let cookie = app.login_local("alice", &[]).await;
    let slug = seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(post_form(
            &format!("/editor/{}/", slug),
            Some(&cookie),
            &[("action", "create_show"), ("name", "Hang On Sloopy")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/editor/hang-on-sloopy/");
}

// =============================================================================
// Download Tests
// =============================================================================

#[tokio::test]
async fn test_download_missing_show_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(get("/download/nope.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_show_without_viewer_is_not_found() {
    let app = TestApp::new().await;
    seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(get("/download/script-ohio.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_requires_json_suffix() {
    let app = TestApp::new().await;
    seed_show(&app, "Script Ohio", "alice", false).await;

    let response = app
        .router()
        .oneshot(get("/download/script-ohio", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Help Tests
// =============================================================================

#[tokio::test]
async fn test_help_pages() {
    let app = TestApp::new().await;
    let help = app.state.help_root.clone();
    std::fs::write(help.join("index.html"), "<h1>Help</h1>").unwrap();
    std::fs::create_dir_all(help.join("editor")).unwrap();
    std::fs::write(help.join("editor/sheets.html"), "<h1>Sheets</h1>").unwrap();

    let response = app.router().oneshot(get("/help/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<h1>Help</h1>");

    let response = app
        .router()
        .oneshot(get("/help/editor/sheets/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<h1>Sheets</h1>");

    let response = app.router().oneshot(get("/help/missing/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
