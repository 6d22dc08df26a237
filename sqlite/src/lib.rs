//! SQLite store for Hatchify
//!
//! Renders compiled query plans and write operations as SQLite SQL and runs
//! them through [`rusqlite`].

pub mod connection;
mod ddl;
mod render;
mod store;
mod values;

pub use connection::{SqliteConfig, TransactionMode};
pub use store::{SqliteStore, SqliteTransaction};
