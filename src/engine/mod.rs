//! Relationship-aware persistence.
//!
//! A write is split into the row's own columns, belongsTo keys (inlined as
//! foreign-key values) and external keys (hasOne, hasMany, hasManyThrough),
//! which are linked after the row exists. Attribute-only writes go straight to
//! the store. Anything with relationships runs inside one transaction and
//! either fully applies or leaves nothing behind.

mod partition;

use hatchify_core::error::{HatchifyError, Location};
use hatchify_core::query::{PredicateNode, QueryPlan, Selection};
use hatchify_core::schema::{Association, AssociationKind, Cardinality, IdType, Registry, Schema};
use hatchify_core::store::{Executor, Row, Store, StoreError, Transaction};
use hatchify_core::write::{LinkTarget, RelationshipLink, WritePayload};
use serde_json::Value;

use crate::transaction::TxScope;
use partition::{Partition, partition};

/// A written row with the identifiers its relationships now point at.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Value,
    /// The row as stored, foreign-key attributes included
    pub attributes: Row,
    /// Relationship name to related id (to-one, `null` when cleared) or ids (to-many).
    /// Only relationships present in the payload are listed.
    pub relationships: Row,
}

/// Translates a store failure into the error taxonomy.
pub(crate) fn store_error(err: StoreError) -> HatchifyError {
    match err {
        StoreError::UniqueViolation(detail) => HatchifyError::conflict(
            format!("Record with the same unique value already exists ({detail})."),
            Location::None,
        ),
        StoreError::ForeignKeyViolation(detail) => HatchifyError::conflict(
            format!("Record references a row that does not exist ({detail})."),
            Location::None,
        ),
        other => HatchifyError::internal(other.to_string()),
    }
}

fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn not_found(schema: &Schema, id: &Value) -> HatchifyError {
    HatchifyError::not_found(
        format!("Unable to find '{}' with id '{}'.", schema.name, display_id(id)),
        Location::None,
    )
}

/// Adds a generated v4 id when the schema uses UUID keys and none was given.
fn fill_id(schema: &Schema, row: &mut Row) {
    if schema.id_type == IdType::Uuid && !row.contains_key(&schema.id_field) {
        row.insert(
            schema.id_field.clone(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
}

fn primary_key(schema: &Schema, row: &Row) -> Result<Value, HatchifyError> {
    row.get(&schema.id_field).cloned().ok_or_else(|| {
        HatchifyError::internal(format!("Store returned a '{}' row without an id.", schema.name))
    })
}

fn linked_ids(association: &Association, ids: Vec<Value>) -> Value {
    match association.cardinality() {
        Cardinality::One => ids.into_iter().next().unwrap_or(Value::Null),
        Cardinality::Many => Value::Array(ids),
    }
}

/// Executes reads and writes against a store using a registry's associations.
#[derive(Debug, Clone, Copy)]
pub struct Engine<'r> {
    registry: &'r Registry,
}

impl<'r> Engine<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Matching rows and the number of rows matching the filter without pagination.
    pub async fn find_all<E: Executor>(
        &self,
        exec: &E,
        schema: &Schema,
        plan: &QueryPlan,
    ) -> Result<(Vec<Row>, u64), HatchifyError> {
        let rows = exec.find(schema, plan).await.map_err(store_error)?;
        let count = exec.count(schema, &plan.filter).await.map_err(store_error)?;
        Ok((rows, count))
    }

    /// The single row a plan compiled with an id override addresses.
    pub async fn find_one<E: Executor>(
        &self,
        exec: &E,
        schema: &Schema,
        id: &Value,
        plan: &QueryPlan,
    ) -> Result<Row, HatchifyError> {
        exec.find(schema, plan)
            .await
            .map_err(store_error)?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(schema, id))
    }

    pub async fn create<S: Store>(
        &self,
        store: &S,
        schema: &Schema,
        payload: &WritePayload,
    ) -> Result<Record, HatchifyError> {
        let parts = partition(self.registry, schema, payload)?;
        if !parts.has_relationships() {
            let mut row = parts.own;
            self.assign_id(schema, payload, &mut row);
            let created = store.create(schema, &row).await.map_err(store_error)?;
            return Ok(Record {
                id: primary_key(schema, &created)?,
                attributes: created,
                relationships: Row::new(),
            });
        }

        let scope = TxScope::Owned(store.begin().await.map_err(store_error)?);
        let result = self
            .create_with(scope.executor(), schema, payload, parts)
            .await;
        scope.finish(result).await
    }

    /// Creates inside a caller's transaction, which is neither committed nor rolled back here.
    pub async fn create_in<T: Transaction>(
        &self,
        tx: &T,
        schema: &Schema,
        payload: &WritePayload,
    ) -> Result<Record, HatchifyError> {
        let parts = partition(self.registry, schema, payload)?;
        let scope = TxScope::Borrowed(tx);
        let result = self
            .create_with(scope.executor(), schema, payload, parts)
            .await;
        scope.finish(result).await
    }

    pub async fn update<S: Store>(
        &self,
        store: &S,
        schema: &Schema,
        id: &Value,
        payload: &WritePayload,
    ) -> Result<Record, HatchifyError> {
        check_payload_id(schema, id, payload)?;
        let parts = partition(self.registry, schema, payload)?;
        if !parts.has_relationships() {
            let affected = store
                .update(schema, &parts.own, &PredicateNode::id_eq(schema, id.clone()))
                .await
                .map_err(store_error)?;
            if affected == 0 {
                return Err(not_found(schema, id));
            }
            return self.reload(store, schema, id, Row::new()).await;
        }

        let scope = TxScope::Owned(store.begin().await.map_err(store_error)?);
        let result = self.update_with(scope.executor(), schema, id, parts).await;
        scope.finish(result).await
    }

    /// Updates inside a caller's transaction, which is neither committed nor rolled back here.
    pub async fn update_in<T: Transaction>(
        &self,
        tx: &T,
        schema: &Schema,
        id: &Value,
        payload: &WritePayload,
    ) -> Result<Record, HatchifyError> {
        check_payload_id(schema, id, payload)?;
        let parts = partition(self.registry, schema, payload)?;
        let scope = TxScope::Borrowed(tx);
        let result = self.update_with(scope.executor(), schema, id, parts).await;
        scope.finish(result).await
    }

    /// Deletes one row. Join rows referencing it cascade.
    pub async fn destroy<E: Executor>(
        &self,
        exec: &E,
        schema: &Schema,
        id: &Value,
    ) -> Result<(), HatchifyError> {
        let deleted = exec
            .destroy(schema, &PredicateNode::id_eq(schema, id.clone()))
            .await
            .map_err(store_error)?;
        if deleted == 0 {
            return Err(not_found(schema, id));
        }
        Ok(())
    }

    fn assign_id(&self, schema: &Schema, payload: &WritePayload, row: &mut Row) {
        if let Some(id) = &payload.id {
            row.insert(schema.id_field.clone(), id.clone());
        }
        fill_id(schema, row);
    }

    async fn create_with<E: Executor>(
        &self,
        exec: &E,
        schema: &Schema,
        payload: &WritePayload,
        parts: Partition<'_, '_>,
    ) -> Result<Record, HatchifyError> {
        let Partition {
            mut own,
            belongs_to,
            external,
        } = parts;

        let mut relationships = Row::new();
        self.inline_belongs_to(exec, &belongs_to, &mut own, &mut relationships)
            .await?;

        self.assign_id(schema, payload, &mut own);
        let created = exec.create(schema, &own).await.map_err(store_error)?;
        let parent = primary_key(schema, &created)?;

        for (association, link) in external {
            let ids = self.resolve_targets(exec, association, link).await?;
            exec.add_links(association, &parent, &ids)
                .await
                .map_err(store_error)?;
            relationships.insert(association.name.clone(), linked_ids(association, ids));
        }

        Ok(Record {
            id: parent,
            attributes: created,
            relationships,
        })
    }

    async fn update_with<E: Executor>(
        &self,
        exec: &E,
        schema: &Schema,
        id: &Value,
        parts: Partition<'_, '_>,
    ) -> Result<Record, HatchifyError> {
        let Partition {
            mut own,
            belongs_to,
            external,
        } = parts;

        let found = exec
            .existing_ids(schema, std::slice::from_ref(id))
            .await
            .map_err(store_error)?;
        if found.is_empty() {
            return Err(not_found(schema, id));
        }

        let mut relationships = Row::new();
        self.inline_belongs_to(exec, &belongs_to, &mut own, &mut relationships)
            .await?;

        if !own.is_empty() {
            exec.update(schema, &own, &PredicateNode::id_eq(schema, id.clone()))
                .await
                .map_err(store_error)?;
        }

        for (association, link) in external {
            let ids = self.resolve_targets(exec, association, link).await?;
            exec.set_links(association, id, &ids)
                .await
                .map_err(store_error)?;
            relationships.insert(association.name.clone(), linked_ids(association, ids));
        }

        self.reload(exec, schema, id, relationships).await
    }

    async fn reload<E: Executor>(
        &self,
        exec: &E,
        schema: &Schema,
        id: &Value,
        relationships: Row,
    ) -> Result<Record, HatchifyError> {
        // Same shape as a freshly created row: foreign-key attributes included
        let mut names: Vec<String> = schema.all_fields().into_iter().map(String::from).collect();
        names.extend(
            self.registry
                .foreign_keys(&schema.full_name())
                .iter()
                .map(|fk| fk.attribute.clone()),
        );
        let plan = QueryPlan {
            attributes: Selection::Only(names),
            ..QueryPlan::for_id(schema, id.clone())
        };
        let attributes = self.find_one(exec, schema, id, &plan).await?;
        Ok(Record {
            id: id.clone(),
            attributes,
            relationships,
        })
    }

    /// Writes each belongsTo id into its foreign-key column after checking the row exists.
    async fn inline_belongs_to<E: Executor>(
        &self,
        exec: &E,
        belongs_to: &[(&Association, Option<&Value>)],
        own: &mut Row,
        relationships: &mut Row,
    ) -> Result<(), HatchifyError> {
        for (association, id) in belongs_to {
            let AssociationKind::BelongsTo { source_key } = &association.kind else {
                continue;
            };
            if let Some(id) = id {
                self.require_existing(exec, association, std::slice::from_ref(*id))
                    .await?;
            }
            let value = id.cloned().unwrap_or(Value::Null);
            own.insert(source_key.clone(), value.clone());
            relationships.insert(association.name.clone(), value);
        }
        Ok(())
    }

    /// Fails with `NotFound` on the first id missing from the association's target table.
    async fn require_existing<E: Executor>(
        &self,
        exec: &E,
        association: &Association,
        ids: &[Value],
    ) -> Result<(), HatchifyError> {
        if ids.is_empty() {
            return Ok(());
        }
        let target = self.registry.target(association);
        let found = exec.existing_ids(target, ids).await.map_err(store_error)?;
        match ids.iter().find(|id| !found.contains(id)) {
            Some(missing) => Err(HatchifyError::not_found(
                format!(
                    "Unable to find '{}' with id '{}' for relationship '{}'.",
                    target.name,
                    display_id(missing),
                    association.name
                ),
                Location::pointer(format!("/data/relationships/{}/data", association.name)),
            )),
            None => Ok(()),
        }
    }

    /// Ids to link for one external relationship: existing ids are checked,
    /// nested rows are created first.
    async fn resolve_targets<E: Executor>(
        &self,
        exec: &E,
        association: &Association,
        link: &RelationshipLink,
    ) -> Result<Vec<Value>, HatchifyError> {
        let target = self.registry.target(association);
        let mut ids = Vec::new();
        let mut rows = Vec::new();
        for element in link.targets() {
            match element {
                LinkTarget::ById(id) => ids.push(id.clone()),
                LinkTarget::Create(row) => {
                    let mut row = row.clone();
                    fill_id(target, &mut row);
                    rows.push(row);
                }
            }
        }

        self.require_existing(exec, association, &ids).await?;

        if !rows.is_empty() {
            let created = exec
                .bulk_create(target, &rows)
                .await
                .map_err(store_error)?;
            for row in &created {
                ids.push(primary_key(target, row)?);
            }
        }
        Ok(ids)
    }
}

fn check_payload_id(schema: &Schema, id: &Value, payload: &WritePayload) -> Result<(), HatchifyError> {
    match &payload.id {
        Some(given) if given != id => Err(HatchifyError::unexpected_value(
            format!(
                "Payload must have 'id' as '{}' to update that '{}'.",
                display_id(id),
                schema.name
            ),
            Location::pointer("/data/id"),
        )),
        _ => Ok(()),
    }
}
