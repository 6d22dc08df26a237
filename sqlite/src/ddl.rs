//! Table definitions derived from the registry.

use core::fmt::Write;

use hatchify_core::schema::{AssociationKind, AttributeType, IdType, Registry, Schema, column_name};

fn id_type_sql(id_type: IdType) -> &'static str {
    match id_type {
        IdType::Uuid => "TEXT",
        IdType::Integer => "INTEGER",
    }
}

fn attribute_type_sql(ty: &AttributeType) -> &'static str {
    match ty {
        AttributeType::Integer | AttributeType::Boolean => "INTEGER",
        AttributeType::Float => "REAL",
        AttributeType::String
        | AttributeType::Text
        | AttributeType::Datetime
        | AttributeType::Uuid
        | AttributeType::Enum(_) => "TEXT",
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn referenced_id_type(registry: &Registry, schema: &str) -> IdType {
    registry
        .schema(schema)
        .map(|s| s.id_type)
        .unwrap_or_default()
}

/// `CREATE TABLE IF NOT EXISTS` for one schema.
pub(crate) fn create_table(registry: &Registry, schema: &Schema) -> String {
    let mut sql = String::with_capacity(256);
    let _ = write!(sql, "CREATE TABLE IF NOT EXISTS \"{}\" (", schema.table_name());

    let id = column_name(&schema.id_field);
    match schema.id_type {
        IdType::Uuid => {
            let _ = write!(sql, "\"{id}\" TEXT PRIMARY KEY NOT NULL");
        }
        IdType::Integer => {
            let _ = write!(sql, "\"{id}\" INTEGER PRIMARY KEY AUTOINCREMENT");
        }
    }

    for attribute in &schema.attributes {
        let column = column_name(&attribute.name);
        let _ = write!(sql, ", \"{column}\" {}", attribute_type_sql(&attribute.ty));
        if !attribute.nullable {
            sql.push_str(" NOT NULL");
        }
        if attribute.unique {
            sql.push_str(" UNIQUE");
        }
        if let AttributeType::Enum(values) = &attribute.ty {
            let allowed: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
            let _ = write!(sql, " CHECK (\"{column}\" IN ({}))", allowed.join(", "));
        }
    }

    for fk in registry.foreign_keys(&schema.full_name()) {
        let Some(target) = registry.schema(&fk.references) else {
            continue;
        };
        let _ = write!(
            sql,
            ", \"{}\" {} REFERENCES \"{}\" (\"{}\") ON DELETE SET NULL",
            column_name(&fk.attribute),
            id_type_sql(target.id_type),
            target.table_name(),
            column_name(&target.id_field)
        );
    }

    sql.push(')');
    sql
}

/// Every table the registry needs: one per schema, then one per join table.
pub(crate) fn create_statements(registry: &Registry) -> Vec<String> {
    let mut statements: Vec<String> = registry
        .schemas()
        .iter()
        .map(|schema| create_table(registry, schema))
        .collect();

    for association in registry.join_associations() {
        let AssociationKind::HasManyThrough { join } = &association.kind
        else {
            continue;
        };
        let Some(source) = registry.schema(&association.source) else {
            continue;
        };
        let target = registry.target(association);
        let source_key = column_name(&join.source_key);
        let target_key = column_name(&join.target_key);

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\
             \"{source_key}\" {source_type} NOT NULL REFERENCES \"{source_table}\" (\"{source_id}\") ON DELETE CASCADE, \
             \"{target_key}\" {target_type} NOT NULL REFERENCES \"{target_table}\" (\"{target_id}\") ON DELETE CASCADE, \
             PRIMARY KEY (\"{source_key}\", \"{target_key}\"))",
            table = join.table,
            source_type = id_type_sql(referenced_id_type(registry, &association.source)),
            source_table = source.table_name(),
            source_id = column_name(&source.id_field),
            target_type = id_type_sql(target.id_type),
            target_table = target.table_name(),
            target_id = column_name(&target.id_field),
        ));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatchify_core::schema::{Attribute, Relationship};

    fn registry() -> Registry {
        Registry::builder()
            .schema(
                Schema::new("User")
                    .id("id", IdType::Integer)
                    .attribute(Attribute::string("email").unique()),
            )
            .schema(
                Schema::new("Todo")
                    .attribute(Attribute::string("name").required())
                    .attribute(Attribute::enumeration("status", ["open", "won't"]))
                    .relationship("user", Relationship::belongs_to("User"))
                    .relationship("tags", Relationship::has_many_through("Tag")),
            )
            .schema(Schema::new("Tag"))
            .build()
            .unwrap()
    }

    #[test]
    fn table_carries_constraints_and_foreign_keys() {
        let registry = registry();
        let sql = create_table(&registry, registry.schema("Todo").unwrap());

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"todo\" (\"id\" TEXT PRIMARY KEY NOT NULL, \
             \"name\" TEXT NOT NULL, \"status\" TEXT CHECK (\"status\" IN ('open', 'won''t')), \
             \"user_id\" INTEGER REFERENCES \"user\" (\"id\") ON DELETE SET NULL)"
        );
    }

    #[test]
    fn integer_keys_autoincrement() {
        let registry = registry();
        let sql = create_table(&registry, registry.schema("User").unwrap());
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"user\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"email\" TEXT UNIQUE)"
        );
    }

    #[test]
    fn join_tables_cascade() {
        let registry = registry();
        let statements = create_statements(&registry);

        assert_eq!(statements.len(), 4);
        assert_eq!(
            statements[3],
            "CREATE TABLE IF NOT EXISTS \"todo_tags\" (\"todo_id\" TEXT NOT NULL REFERENCES \"todo\" \
             (\"id\") ON DELETE CASCADE, \"tag_id\" TEXT NOT NULL REFERENCES \"tag\" (\"id\") ON \
             DELETE CASCADE, PRIMARY KEY (\"todo_id\", \"tag_id\"))"
        );
    }

    #[test]
    fn statements_execute() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for sql in create_statements(&registry()) {
            conn.execute_batch(&sql).unwrap();
        }
    }

    #[test]
    fn self_join_table_has_two_columns() {
        let registry = Registry::builder()
            .schema(Schema::new("User").relationship("friends", Relationship::has_many_through("User")))
            .build()
            .unwrap();
        let statements = create_statements(&registry);
        assert_eq!(
            statements[1],
            "CREATE TABLE IF NOT EXISTS \"user_friends\" (\"user_id\" TEXT NOT NULL REFERENCES \"user\" \
             (\"id\") ON DELETE CASCADE, \"friends_id\" TEXT NOT NULL REFERENCES \"user\" (\"id\") ON \
             DELETE CASCADE, PRIMARY KEY (\"user_id\", \"friends_id\"))"
        );

        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for sql in &statements {
            conn.execute_batch(sql).unwrap();
        }
        conn.execute_batch(
            "INSERT INTO \"user\" (\"id\") VALUES ('a'), ('b'); \
             INSERT INTO \"user_friends\" (\"user_id\", \"friends_id\") VALUES ('a', 'b');",
        )
        .unwrap();
    }
}
