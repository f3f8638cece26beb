//! Database access for calchart-server
//!
//! Schema creation and migrations live in `calchart_common::db`; this module
//! holds the queries the server issues against that schema.

pub mod sessions;
pub mod shows;
pub mod users;

pub use calchart_common::db::init_database;
