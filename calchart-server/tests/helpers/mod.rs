//! Shared setup for calchart-server integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use calchart_common::config::ServerConfig;
use calchart_common::db::Session;
use calchart_server::db::{init_database, sessions, users};
use calchart_server::{build_router, AppState};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;

pub const MEMBERS_ONLY_SECRET: &str = "test-secret";

/// Temporary root folder plus the state built on it
pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_members_only(false).await
    }

    pub async fn with_members_only(enabled: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), enabled);
        let initializer = config.initializer();
        initializer.ensure_directory_exists().unwrap();

        let pool = init_database(&initializer.database_path()).await.unwrap();
        let state = AppState::new(pool, config);
        Self { dir, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Local account with an open session; returns the cookie header value
    pub async fn login_local(&self, username: &str, committees: &[&str]) -> String {
        let committees: Vec<String> = committees.iter().map(|c| c.to_string()).collect();
        users::create_local_user(&self.state.db, username, "password", &committees)
            .await
            .unwrap();
        let session = self.open_session(username, Duration::days(1)).await;
        cookie(&session)
    }

    /// Members Only account with a valid token and an open session
    pub async fn login_members_only(&self, username: &str, committees: &[&str]) -> String {
        let committees: Vec<String> = committees.iter().map(|c| c.to_string()).collect();
        let expiry = Utc::now() + Duration::days(7);
        users::upsert_members_only_user(&self.state.db, username, "api-token", expiry, &committees)
            .await
            .unwrap();
        let session = self.open_session(username, Duration::days(1)).await;
        cookie(&session)
    }

    pub async fn open_session(&self, username: &str, ttl: Duration) -> Session {
        sessions::create_session(&self.state.db, username, Utc::now() + ttl)
            .await
            .unwrap()
    }
}

pub fn test_config(root_folder: PathBuf, members_only: bool) -> ServerConfig {
    ServerConfig {
        root_folder,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        media_url: "/media/".to_string(),
        members_only_url: members_only.then(|| "https://membersonly.example/login/".to_string()),
        members_only_secret: members_only.then(|| MEMBERS_ONLY_SECRET.to_string()),
        session_ttl_days: 14,
        max_upload_bytes: 1024 * 1024,
        is_local: false,
    }
}

pub fn cookie(session: &Session) -> String {
    format!("calchart_session={}", session.token)
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// POST an urlencoded form
pub fn post_form(uri: &str, cookie: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// A file part for [`post_multipart`]
pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

const BOUNDARY: &str = "----calchart-test-boundary";

pub fn post_multipart(
    uri: &str,
    cookie: Option<&str>,
    fields: &[(&str, &str)],
    files: &[FilePart<'_>],
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for file in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file.field, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder().method("POST").uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("JSON body")
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

pub fn set_cookie(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
}

fn encode(value: &str) -> String {
    let mut encoded = String::new();
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b' ' => encoded.push('+'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
