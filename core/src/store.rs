//! Relational store interface.
//!
//! The persistence engine talks to a store only through these traits. Rows are
//! JSON objects keyed by attribute name (lowerCamelCase), including the primary
//! key and any foreign-key attributes the registry derived.

use serde_json::Value;
use thiserror::Error;

use crate::query::{PredicateNode, QueryPlan};
use crate::schema::{Association, Schema};

/// A single row, keyed by attribute name.
pub type Row = serde_json::Map<String, Value>;

/// Failure reported by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// The adapter could not express a plan (unknown path, unsupported value).
    #[error("unable to execute plan: {0}")]
    Plan(String),

    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Database(Box::new(err))
    }
}

/// Operations available both on a store and inside a transaction.
#[allow(async_fn_in_trait)]
pub trait Executor {
    /// Rows matching `plan`, with included relationships nested under their names.
    async fn find(&self, schema: &Schema, plan: &QueryPlan) -> Result<Vec<Row>, StoreError>;

    /// Number of rows matching `filter`, ignoring pagination.
    async fn count(&self, schema: &Schema, filter: &PredicateNode) -> Result<u64, StoreError>;

    /// Inserts one row and returns it as stored (primary key included).
    async fn create(&self, schema: &Schema, row: &Row) -> Result<Row, StoreError>;

    async fn bulk_create(&self, schema: &Schema, rows: &[Row]) -> Result<Vec<Row>, StoreError>;

    /// Returns the number of affected rows.
    async fn update(
        &self,
        schema: &Schema,
        attributes: &Row,
        filter: &PredicateNode,
    ) -> Result<u64, StoreError>;

    /// Returns the number of deleted rows.
    async fn destroy(&self, schema: &Schema, filter: &PredicateNode) -> Result<u64, StoreError>;

    /// Links `ids` to `parent` in addition to any existing links.
    async fn add_links(
        &self,
        association: &Association,
        parent: &Value,
        ids: &[Value],
    ) -> Result<(), StoreError>;

    /// Replaces every link of `parent` with `ids`. An empty slice clears the relationship.
    async fn set_links(
        &self,
        association: &Association,
        parent: &Value,
        ids: &[Value],
    ) -> Result<(), StoreError>;

    /// The subset of `ids` present in `schema`'s table.
    async fn existing_ids(&self, schema: &Schema, ids: &[Value]) -> Result<Vec<Value>, StoreError>;
}

/// An open transaction. Dropping it without committing rolls it back.
#[allow(async_fn_in_trait)]
pub trait Transaction: Executor {
    async fn commit(self) -> Result<(), StoreError>;
    async fn rollback(self) -> Result<(), StoreError>;
}

/// A store that can open transactions.
#[allow(async_fn_in_trait)]
pub trait Store: Executor {
    type Transaction<'s>: Transaction
    where
        Self: 's;

    async fn begin(&self) -> Result<Self::Transaction<'_>, StoreError>;
}
