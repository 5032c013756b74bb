//! Recipe store with ingredient scaling.
//!
//! Dishes and their ingredients live in SQLite behind Diesel; [`query`] is the
//! gateway over them and [`scale::scale`] recomputes quantities for another
//! serving count. [`handlers`] exposes both over HTTP.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod query;
pub mod scale;
mod schema;
pub mod validation;
