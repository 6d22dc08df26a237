//! # Hatchify for Rust
//!
//! JSON:API resource services driven by declarative schemas: query-string
//! compilation, write validation and relationship-aware persistence.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use hatchify::prelude::*;
//! use hatchify::sqlite::{SqliteConfig, SqliteStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Arc::new(
//!     Registry::builder()
//!         .schema(Schema::new("Todo").attribute(Attribute::string("name").required()))
//!         .build()
//!         .unwrap(),
//! );
//! let store = SqliteStore::open(&SqliteConfig::in_memory(), registry.clone()).unwrap();
//! store.create_tables().await.unwrap();
//!
//! let app = Hatchify::new(registry);
//! let body = serde_json::json!({"data": {"type": "Todo", "attributes": {"name": "Ship it"}}});
//! let created = app.dispatch(&store, &Request::post("/api/todos", body)).await;
//! assert!(matches!(created, Some(Ok(Outcome::Created(_)))));
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate            | Contents                                            | Feature Flag |
//! |------------------|-----------------------------------------------------|--------------|
//! | `hatchify-core`  | schemas, query compiler, write validation, errors    | always       |
//! | `hatchify-sqlite`| SQLite store over rusqlite                          | `rusqlite`   |

pub mod config;
pub mod engine;
pub mod route;
pub mod service;
pub mod transaction;

pub use hatchify_core;
#[cfg(feature = "rusqlite")]
pub use hatchify_sqlite as sqlite;

pub use config::{ConfigError, HatchifyConfig};
pub use engine::{Engine, Record};
pub use route::{Method, Request, Route};
pub use service::{Hatchify, Outcome};
pub use transaction::TxScope;

pub mod prelude {
    pub use crate::{Engine, Hatchify, HatchifyConfig, Method, Outcome, Record, Request, Route};
    pub use hatchify_core::{
        Attribute, AttributeType, Errors, HatchifyError, IdType, Registry, Relationship, Schema,
        WriteMode, WritePayload,
    };
    pub use hatchify_core::{Executor, Store, Transaction};
}
