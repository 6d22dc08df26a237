//! [`Store`] implementation over a single [`rusqlite::Connection`].
//!
//! rusqlite is synchronous, so the connection lives behind a
//! [`tokio::sync::Mutex`]. A transaction holds the guard for its whole
//! lifetime; statements issued through the store itself wait until the
//! transaction ends.

use std::sync::Arc;

use hatchify_core::query::{IncludeNode, PredicateNode, QueryPlan};
use hatchify_core::schema::{Association, Cardinality, Registry, Schema};
use hatchify_core::store::{Executor, Row, Store, StoreError, Transaction};
use hatchify_core::{hatchify_trace_query, hatchify_trace_tx};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params_from_iter};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::connection::{SqliteConfig, TransactionMode};
use crate::ddl;
use crate::render::{self, Output, Statement};
use crate::values::{Decode, classify, column_for, column_named, columns, fix_json, from_sql};

/// Synchronous operations against a borrowed connection.
struct Ops<'a> {
    conn: &'a Connection,
    registry: &'a Registry,
}

impl Ops<'_> {
    fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        hatchify_trace_query!(statement.sql, statement.params.len());
        let changed = self
            .conn
            .execute(&statement.sql, params_from_iter(statement.params.iter()))
            .map_err(classify)?;
        Ok(changed as u64)
    }

    fn find(&self, schema: &Schema, plan: &QueryPlan) -> Result<Vec<Row>, StoreError> {
        let (statement, outputs) = render::select(self.registry, schema, plan)?;
        hatchify_trace_query!(statement.sql, statement.params.len());

        let mut stmt = self.conn.prepare(&statement.sql).map_err(classify)?;
        let mut rows = stmt
            .query(params_from_iter(statement.params.iter()))
            .map_err(classify)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut record = Row::new();
            for (i, output) in outputs.iter().enumerate() {
                let value = row.get_ref(i).map_err(classify)?;
                match output {
                    Output::Attribute { name, decode } => {
                        record.insert(name.to_string(), from_sql(value, *decode));
                    }
                    Output::Include { node, cardinality } => {
                        let nested = self.decode_include(value, node, *cardinality)?;
                        record.insert(node.relationship.clone(), nested);
                    }
                }
            }
            out.push(record);
        }
        Ok(out)
    }

    fn decode_include(
        &self,
        value: ValueRef<'_>,
        node: &IncludeNode,
        cardinality: Cardinality,
    ) -> Result<Value, StoreError> {
        let mut value = match value {
            ValueRef::Null => Value::Null,
            ValueRef::Text(text) => serde_json::from_slice(text).map_err(StoreError::database)?,
            _ => {
                return Err(StoreError::Plan(format!(
                    "included relationship '{}' did not render as JSON",
                    node.relationship
                )));
            }
        };
        self.fix_include(&mut value, node, cardinality);
        Ok(value)
    }

    /// Restores value types SQLite's JSON functions lose, and normalises empty to-many sets.
    fn fix_include(&self, value: &mut Value, node: &IncludeNode, cardinality: Cardinality) {
        if value.is_null() && cardinality == Cardinality::Many {
            *value = Value::Array(Vec::new());
        }
        let Some(target) = self.registry.schema(&node.target) else {
            return;
        };

        let objects: Vec<&mut serde_json::Map<String, Value>> = match value {
            Value::Array(items) => items.iter_mut().filter_map(Value::as_object_mut).collect(),
            Value::Object(object) => vec![object],
            _ => Vec::new(),
        };

        for object in objects {
            for name in node.attributes.names(target) {
                if let Some(column) = column_for(self.registry, target, name)
                    && let Some(field) = object.get_mut(name)
                {
                    fix_json(field, column.decode);
                }
            }
            for nested in &node.nested {
                let cardinality = self
                    .registry
                    .associations()
                    .get(&target.full_name(), &nested.relationship)
                    .map(Association::cardinality)
                    .unwrap_or(Cardinality::One);
                let field = object
                    .entry(nested.relationship.clone())
                    .or_insert(Value::Null);
                self.fix_include(field, nested, cardinality);
            }
        }
    }

    fn count(&self, schema: &Schema, filter: &PredicateNode) -> Result<u64, StoreError> {
        let statement = render::count(self.registry, schema, filter)?;
        hatchify_trace_query!(statement.sql, statement.params.len());
        let count: i64 = self
            .conn
            .query_row(
                &statement.sql,
                params_from_iter(statement.params.iter()),
                |row| row.get(0),
            )
            .map_err(classify)?;
        Ok(count.max(0) as u64)
    }

    fn create(&self, schema: &Schema, row: &Row) -> Result<Row, StoreError> {
        let statement = render::insert(self.registry, schema, row)?;
        hatchify_trace_query!(statement.sql, statement.params.len());

        let columns = columns(self.registry, schema);
        let mut stmt = self.conn.prepare(&statement.sql).map_err(classify)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        stmt.query_row(params_from_iter(statement.params.iter()), |stored| {
            let mut record = Row::new();
            for (i, name) in names.iter().enumerate() {
                if let Some(column) = column_named(&columns, name) {
                    record.insert(
                        column.attribute.to_string(),
                        from_sql(stored.get_ref(i)?, column.decode),
                    );
                }
            }
            Ok(record)
        })
        .map_err(classify)
    }

    fn update(
        &self,
        schema: &Schema,
        attributes: &Row,
        filter: &PredicateNode,
    ) -> Result<u64, StoreError> {
        if attributes.is_empty() {
            return self.count(schema, filter);
        }
        self.execute(&render::update(self.registry, schema, attributes, filter)?)
    }

    fn destroy(&self, schema: &Schema, filter: &PredicateNode) -> Result<u64, StoreError> {
        self.execute(&render::delete(self.registry, schema, filter)?)
    }

    fn links(
        &self,
        association: &Association,
        parent: &Value,
        ids: &[Value],
        replace: bool,
    ) -> Result<(), StoreError> {
        for statement in render::links(self.registry, association, parent, ids, replace)? {
            self.execute(&statement)?;
        }
        Ok(())
    }

    fn existing_ids(&self, schema: &Schema, ids: &[Value]) -> Result<Vec<Value>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let statement = render::existing_ids(self.registry, schema, ids);
        hatchify_trace_query!(statement.sql, statement.params.len());

        let decode = Decode::of_id(schema.id_type);
        let mut stmt = self.conn.prepare(&statement.sql).map_err(classify)?;
        let found = stmt
            .query_map(params_from_iter(statement.params.iter()), |row| {
                Ok(from_sql(row.get_ref(0)?, decode))
            })
            .map_err(classify)?;
        found.collect::<Result<Vec<_>, _>>().map_err(classify)
    }
}

/// Implements [`Executor`] by handing each call to [`Ops`].
macro_rules! executor_impl {
    ($ty:ty) => {
        impl Executor for $ty {
            async fn find(&self, schema: &Schema, plan: &QueryPlan) -> Result<Vec<Row>, StoreError> {
                self.with(|ops| ops.find(schema, plan)).await
            }

            async fn count(&self, schema: &Schema, filter: &PredicateNode) -> Result<u64, StoreError> {
                self.with(|ops| ops.count(schema, filter)).await
            }

            async fn create(&self, schema: &Schema, row: &Row) -> Result<Row, StoreError> {
                self.with(|ops| ops.create(schema, row)).await
            }

            async fn bulk_create(&self, schema: &Schema, rows: &[Row]) -> Result<Vec<Row>, StoreError> {
                self.with(|ops| rows.iter().map(|row| ops.create(schema, row)).collect())
                    .await
            }

            async fn update(
                &self,
                schema: &Schema,
                attributes: &Row,
                filter: &PredicateNode,
            ) -> Result<u64, StoreError> {
                self.with(|ops| ops.update(schema, attributes, filter)).await
            }

            async fn destroy(&self, schema: &Schema, filter: &PredicateNode) -> Result<u64, StoreError> {
                self.with(|ops| ops.destroy(schema, filter)).await
            }

            async fn add_links(
                &self,
                association: &Association,
                parent: &Value,
                ids: &[Value],
            ) -> Result<(), StoreError> {
                self.with(|ops| ops.links(association, parent, ids, false)).await
            }

            async fn set_links(
                &self,
                association: &Association,
                parent: &Value,
                ids: &[Value],
            ) -> Result<(), StoreError> {
                self.with(|ops| ops.links(association, parent, ids, true)).await
            }

            async fn existing_ids(&self, schema: &Schema, ids: &[Value]) -> Result<Vec<Value>, StoreError> {
                self.with(|ops| ops.existing_ids(schema, ids)).await
            }
        }
    };
}

/// SQLite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    registry: Arc<Registry>,
    mode: TransactionMode,
}

impl SqliteStore {
    /// Wraps an open connection, enabling foreign keys and case-sensitive `LIKE`.
    pub fn new(conn: Connection, registry: Arc<Registry>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA case_sensitive_like = ON;")
            .map_err(classify)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
            mode: TransactionMode::default(),
        })
    }

    pub fn open(config: &SqliteConfig, registry: Arc<Registry>) -> Result<Self, StoreError> {
        let conn = if config.is_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        }
        .map_err(classify)?;
        Ok(Self::new(conn, registry)?.with_mode(config.transaction))
    }

    pub fn with_mode(mut self, mode: TransactionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Creates every table the registry needs, skipping those that exist.
    pub async fn create_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        for sql in ddl::create_statements(&self.registry) {
            hatchify_trace_query!(sql, 0);
            conn.execute_batch(&sql).map_err(classify)?;
        }
        Ok(())
    }

    /// Runs raw SQL, e.g. to install triggers or seed data.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn
            .lock()
            .await
            .execute_batch(sql)
            .map_err(classify)
    }

    async fn with<R>(&self, f: impl FnOnce(Ops<'_>) -> R) -> R {
        let conn = self.conn.lock().await;
        f(Ops {
            conn: &conn,
            registry: &self.registry,
        })
    }
}

executor_impl!(SqliteStore);

impl Store for SqliteStore {
    type Transaction<'s> = SqliteTransaction<'s>;

    async fn begin(&self) -> Result<SqliteTransaction<'_>, StoreError> {
        let guard = self.conn.lock().await;
        guard.execute_batch(self.mode.begin_sql()).map_err(classify)?;
        hatchify_trace_tx!("begin", "sqlite.rusqlite");
        Ok(SqliteTransaction {
            guard,
            registry: &self.registry,
            finished: false,
        })
    }
}

/// Open SQLite transaction. Rolled back on drop unless committed.
pub struct SqliteTransaction<'s> {
    guard: MutexGuard<'s, Connection>,
    registry: &'s Registry,
    finished: bool,
}

impl core::fmt::Debug for SqliteTransaction<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("finished", &self.finished)
            .finish()
    }
}

impl SqliteTransaction<'_> {
    async fn with<R>(&self, f: impl FnOnce(Ops<'_>) -> R) -> R {
        f(Ops {
            conn: &self.guard,
            registry: self.registry,
        })
    }
}

executor_impl!(SqliteTransaction<'_>);

impl Transaction for SqliteTransaction<'_> {
    async fn commit(mut self) -> Result<(), StoreError> {
        self.guard.execute_batch("COMMIT").map_err(classify)?;
        self.finished = true;
        hatchify_trace_tx!("commit", "sqlite.rusqlite");
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.guard.execute_batch("ROLLBACK").map_err(classify)?;
        hatchify_trace_tx!("rollback", "sqlite.rusqlite");
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.guard.execute_batch("ROLLBACK");
            hatchify_trace_tx!("rollback", "sqlite.rusqlite");
        }
    }
}
