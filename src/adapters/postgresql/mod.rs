//! PostgreSQL adapter
//!
//! Reads the LMS tables and persists Harvest's bookkeeping (cursors, id
//! snapshots, overrides, settings, staging and artifact index) in the same
//! database.

pub mod adapter;
pub mod client;
pub mod models;
pub mod sql;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
