//! HTTP handlers for calchart-server

pub mod actions;
pub mod auth;
pub mod editor;
pub mod export;
pub mod health;
pub mod help;
pub mod home;
pub mod login;
pub mod ui;

pub use auth::{require_login, CurrentUser};
pub use editor::{editor, editor_action};
pub use export::export;
pub use health::health_routes;
pub use help::help_routes;
pub use home::{home, home_action};
pub use login::{login_form, login_submit, logout, members_only};
