//! Conversion between JSON row values and SQLite storage values.

use hatchify_core::schema::{AttributeType, IdType, Registry, Schema, column_name};
use hatchify_core::store::StoreError;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

/// How a stored column reads back into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decode {
    Text,
    Integer,
    Real,
    /// Stored as 0/1
    Boolean,
}

impl Decode {
    pub(crate) fn of(ty: &AttributeType) -> Self {
        match ty {
            AttributeType::Integer => Decode::Integer,
            AttributeType::Float => Decode::Real,
            AttributeType::Boolean => Decode::Boolean,
            AttributeType::String
            | AttributeType::Text
            | AttributeType::Datetime
            | AttributeType::Uuid
            | AttributeType::Enum(_) => Decode::Text,
        }
    }

    pub(crate) fn of_id(id_type: IdType) -> Self {
        match id_type {
            IdType::Uuid => Decode::Text,
            IdType::Integer => Decode::Integer,
        }
    }
}

/// A stored column of a schema's table.
#[derive(Debug, Clone)]
pub(crate) struct Column<'r> {
    /// Attribute name rows are keyed by
    pub attribute: &'r str,
    pub column: String,
    pub decode: Decode,
}

/// Every column of `schema`'s table: primary key, declared attributes, derived foreign keys.
pub(crate) fn columns<'r>(registry: &'r Registry, schema: &'r Schema) -> Vec<Column<'r>> {
    let mut out = vec![Column {
        attribute: &schema.id_field,
        column: column_name(&schema.id_field),
        decode: Decode::of_id(schema.id_type),
    }];
    out.extend(schema.attributes.iter().map(|a| Column {
        attribute: &a.name,
        column: column_name(&a.name),
        decode: Decode::of(&a.ty),
    }));
    out.extend(registry.foreign_keys(&schema.full_name()).iter().map(|fk| Column {
        attribute: &fk.attribute,
        column: column_name(&fk.attribute),
        decode: registry
            .schema(&fk.references)
            .map(|s| Decode::of_id(s.id_type))
            .unwrap_or(Decode::Text),
    }));
    out
}

/// The stored column behind `attribute`, if `schema`'s table has one.
pub(crate) fn column_for<'r>(
    registry: &'r Registry,
    schema: &'r Schema,
    attribute: &str,
) -> Option<Column<'r>> {
    columns(registry, schema)
        .into_iter()
        .find(|c| c.attribute == attribute)
}

/// Finds the column by its stored name, for reading `RETURNING *` rows.
pub(crate) fn column_named<'c, 'r>(columns: &'c [Column<'r>], column: &str) -> Option<&'c Column<'r>> {
    columns.iter().find(|c| c.column == column)
}

/// JSON value to a bindable SQLite value.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Stored value back to JSON.
pub(crate) fn from_sql(value: ValueRef<'_>, decode: Decode) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if decode == Decode::Boolean => Value::Bool(i != 0),
        ValueRef::Integer(i) if decode == Decode::Real => float(i as f64),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Fixes up a value produced by SQLite's JSON functions, where booleans come back as 0/1.
pub(crate) fn fix_json(value: &mut Value, decode: Decode) {
    if decode == Decode::Boolean
        && let Some(i) = value.as_i64()
    {
        *value = Value::Bool(i != 0);
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Maps a driver error onto the store error taxonomy.
pub(crate) fn classify(err: rusqlite::Error) -> StoreError {
    use rusqlite::ffi;

    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        let detail = message.clone().unwrap_or_else(|| failure.to_string());
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return StoreError::UniqueViolation(detail);
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return StoreError::ForeignKeyViolation(detail),
            _ => {}
        }
    }
    StoreError::database(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatchify_core::schema::{Attribute, Relationship};
    use serde_json::json;

    #[test]
    fn json_round_trips_through_storage_types() {
        assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(to_sql(&json!(["a"])), SqlValue::Text("[\"a\"]".into()));

        assert_eq!(from_sql(ValueRef::Integer(1), Decode::Boolean), json!(true));
        assert_eq!(from_sql(ValueRef::Integer(3), Decode::Real), json!(3.0));
        assert_eq!(from_sql(ValueRef::Text(b"x"), Decode::Text), json!("x"));
        assert_eq!(from_sql(ValueRef::Null, Decode::Integer), Value::Null);
    }

    #[test]
    fn columns_include_foreign_keys() {
        let registry = Registry::builder()
            .schema(Schema::new("User"))
            .schema(
                Schema::new("Todo")
                    .attribute(Attribute::datetime("dueDate"))
                    .relationship("user", Relationship::belongs_to("User")),
            )
            .build()
            .unwrap();
        let todo = registry.schema("Todo").unwrap();

        let cols: Vec<_> = columns(&registry, todo)
            .into_iter()
            .map(|c| (c.attribute, c.column))
            .collect();
        assert_eq!(
            cols,
            vec![
                ("id", "id".to_string()),
                ("dueDate", "due_date".to_string()),
                ("userId", "user_id".to_string()),
            ]
        );
    }

    #[test]
    fn classifies_constraint_failures() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();

        assert!(matches!(classify(err), StoreError::UniqueViolation(_)));
    }
}
