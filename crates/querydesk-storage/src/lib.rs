//! QueryDesk Storage crate - SQLite relational engine for the chat pipeline.
//!
//! Provides a WAL-mode SQLite database with migrations and a seeded sample
//! schema, schema discovery, and a read-only statement executor.

pub mod db;
pub mod executor;
pub mod migrations;
pub mod schema;

pub use db::Database;
pub use schema::{ColumnInfo, TableInfo};
