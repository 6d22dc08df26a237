//! SQL rendering for plans and writes.
//!
//! A [`QueryPlan`] becomes a single SELECT. Included relationships render as
//! correlated JSON subqueries (`json_object` / `json_group_array`), dotted
//! filter paths as `EXISTS` subqueries and dotted sort keys as scalar
//! subqueries. Every table reference is aliased `t0`, `t1`, ... in render order.

use core::fmt::Write;

use hatchify_core::query::{Direction, IncludeNode, Operator, PredicateNode, QueryPlan};
use hatchify_core::schema::{
    Association, AssociationKind, Cardinality, Registry, Schema, column_name,
};
use hatchify_core::store::{Row, StoreError};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::values::{Decode, column_for, to_sql};

/// Rendered SQL with its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// How to read one column of a rendered SELECT.
#[derive(Debug)]
pub(crate) enum Output<'p> {
    Attribute { name: &'p str, decode: Decode },
    Include { node: &'p IncludeNode, cardinality: Cardinality },
}

struct Renderer<'r> {
    registry: &'r Registry,
    sql: String,
    params: Vec<SqlValue>,
    next_alias: usize,
}

impl<'r> Renderer<'r> {
    fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            sql: String::with_capacity(256),
            params: Vec::new(),
            next_alias: 0,
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn bind(&mut self, value: &Value) {
        self.sql.push('?');
        self.params.push(to_sql(value));
    }

    fn bind_list(&mut self, values: &[Value]) {
        self.sql.push('(');
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.bind(value);
        }
        self.sql.push(')');
    }

    fn association(
        &self,
        schema: &Schema,
        name: &str,
    ) -> Result<(&'r Association, &'r Schema), StoreError> {
        let association = self
            .registry
            .associations()
            .get(&schema.full_name(), name)
            .ok_or_else(|| {
                StoreError::Plan(format!("'{}' has no relationship '{name}'", schema.name))
            })?;
        Ok((association, self.registry.target(association)))
    }

    fn column(&self, schema: &Schema, attribute: &str) -> Result<String, StoreError> {
        column_for(self.registry, schema, attribute)
            .map(|c| c.column)
            .ok_or_else(|| StoreError::Plan(format!("'{}' has no column '{attribute}'", schema.name)))
    }

    /// Condition tying `alias` (a row of `target`) to `parent_alias` (a row of `parent`).
    fn write_join(
        &mut self,
        association: &Association,
        target: &Schema,
        alias: &str,
        parent: &Schema,
        parent_alias: &str,
    ) {
        match &association.kind {
            AssociationKind::BelongsTo { source_key } => {
                write_qualified_column(alias, &column_name(&target.id_field), &mut self.sql);
                self.sql.push_str(" = ");
                write_qualified_column(parent_alias, &column_name(source_key), &mut self.sql);
            }
            AssociationKind::HasOne { target_key } | AssociationKind::HasMany { target_key } => {
                write_qualified_column(alias, &column_name(target_key), &mut self.sql);
                self.sql.push_str(" = ");
                write_qualified_column(parent_alias, &column_name(&parent.id_field), &mut self.sql);
            }
            AssociationKind::HasManyThrough { join } => {
                let join_alias = self.alias();
                write_qualified_column(alias, &column_name(&target.id_field), &mut self.sql);
                self.sql.push_str(" IN (SELECT ");
                write_qualified_column(&join_alias, &column_name(&join.target_key), &mut self.sql);
                let _ = write!(self.sql, " FROM \"{}\" AS \"{join_alias}\" WHERE ", join.table);
                write_qualified_column(&join_alias, &column_name(&join.source_key), &mut self.sql);
                self.sql.push_str(" = ");
                write_qualified_column(parent_alias, &column_name(&parent.id_field), &mut self.sql);
                self.sql.push(')');
            }
        }
    }

    // =========================================================================
    // WHERE
    // =========================================================================

    fn write_predicate(
        &mut self,
        schema: &Schema,
        alias: &str,
        node: &PredicateNode,
    ) -> Result<(), StoreError> {
        let (nodes, separator, empty) = match node {
            PredicateNode::Leaf(condition) => {
                let segments: Vec<&str> = condition.path.split('.').collect();
                return self.write_condition(
                    schema,
                    alias,
                    &segments,
                    condition.operator,
                    &condition.value,
                );
            }
            PredicateNode::And(nodes) => (nodes, " AND ", "1 = 1"),
            PredicateNode::Or(nodes) => (nodes, " OR ", "1 = 0"),
        };

        if nodes.is_empty() {
            self.sql.push_str(empty);
            return Ok(());
        }
        self.sql.push('(');
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(separator);
            }
            self.write_predicate(schema, alias, node)?;
        }
        self.sql.push(')');
        Ok(())
    }

    fn write_condition(
        &mut self,
        schema: &Schema,
        alias: &str,
        segments: &[&str],
        operator: Operator,
        value: &Value,
    ) -> Result<(), StoreError> {
        match segments {
            [attribute] => {
                let column = self.column(schema, attribute)?;
                self.write_comparison(alias, &column, operator, value)
            }
            [relationship, rest @ ..] => {
                let (association, target) = self.association(schema, relationship)?;
                let inner = self.alias();
                let _ = write!(
                    self.sql,
                    "EXISTS (SELECT 1 FROM \"{}\" AS \"{inner}\" WHERE ",
                    target.table_name()
                );
                self.write_join(association, target, &inner, schema, alias);
                self.sql.push_str(" AND ");
                self.write_condition(target, &inner, rest, operator, value)?;
                self.sql.push(')');
                Ok(())
            }
            [] => Err(StoreError::Plan("empty filter path".into())),
        }
    }

    fn write_comparison(
        &mut self,
        alias: &str,
        column: &str,
        operator: Operator,
        value: &Value,
    ) -> Result<(), StoreError> {
        match operator {
            Operator::Eq | Operator::Ne if value.is_null() => {
                write_qualified_column(alias, column, &mut self.sql);
                self.sql.push_str(if operator == Operator::Eq {
                    " IS NULL"
                } else {
                    " IS NOT NULL"
                });
            }
            Operator::In | Operator::Nin => {
                let Value::Array(items) = value else {
                    return Err(StoreError::Plan(format!(
                        "'{}' requires an array value",
                        operator.as_str()
                    )));
                };
                if items.is_empty() {
                    self.sql
                        .push_str(if operator == Operator::In { "1 = 0" } else { "1 = 1" });
                    return Ok(());
                }
                write_qualified_column(alias, column, &mut self.sql);
                self.sql.push_str(if operator == Operator::In {
                    " IN "
                } else {
                    " NOT IN "
                });
                self.bind_list(items);
            }
            Operator::ILike => {
                self.sql.push_str("LOWER(");
                write_qualified_column(alias, column, &mut self.sql);
                self.sql.push_str(") LIKE LOWER(");
                self.bind(value);
                self.sql.push(')');
            }
            _ => {
                write_qualified_column(alias, column, &mut self.sql);
                let symbol = match operator {
                    Operator::Eq => "=",
                    Operator::Ne => "<>",
                    Operator::Gt => ">",
                    Operator::Gte => ">=",
                    Operator::Lt => "<",
                    Operator::Lte => "<=",
                    _ => "LIKE",
                };
                let _ = write!(self.sql, " {symbol} ");
                self.bind(value);
            }
        }
        Ok(())
    }

    // =========================================================================
    // SELECT list and ORDER BY
    // =========================================================================

    fn write_include(
        &mut self,
        parent: &Schema,
        parent_alias: &str,
        node: &IncludeNode,
    ) -> Result<(), StoreError> {
        let (association, target) = self.association(parent, &node.relationship)?;
        let alias = self.alias();
        let many = association.cardinality() == Cardinality::Many;

        self.sql.push_str("(SELECT ");
        if many {
            self.sql.push_str("json_group_array(");
        }
        self.sql.push_str("json_object(");
        let mut first_arg = true;
        for name in node.attributes.names(target) {
            if !first_arg {
                self.sql.push_str(", ");
            }
            first_arg = false;
            let column = self.column(target, name)?;
            let _ = write!(self.sql, "'{name}', ");
            write_qualified_column(&alias, &column, &mut self.sql);
        }
        for nested in &node.nested {
            if !first_arg {
                self.sql.push_str(", ");
            }
            first_arg = false;
            let _ = write!(self.sql, "'{}', json(", nested.relationship);
            self.write_include(target, &alias, nested)?;
            self.sql.push(')');
        }
        self.sql.push(')');
        if many {
            self.sql.push(')');
        }

        let _ = write!(
            self.sql,
            " FROM \"{}\" AS \"{alias}\" WHERE ",
            target.table_name()
        );
        self.write_join(association, target, &alias, parent, parent_alias);
        if !many {
            self.sql.push_str(" LIMIT 1");
        }
        self.sql.push(')');
        Ok(())
    }

    fn write_sort_value(
        &mut self,
        schema: &Schema,
        alias: &str,
        segments: &[&str],
    ) -> Result<(), StoreError> {
        match segments {
            [attribute] => {
                let column = self.column(schema, attribute)?;
                write_qualified_column(alias, &column, &mut self.sql);
                Ok(())
            }
            [relationship, rest @ ..] => {
                let (association, target) = self.association(schema, relationship)?;
                let inner = self.alias();
                self.sql.push_str("(SELECT ");
                self.write_sort_value(target, &inner, rest)?;
                let _ = write!(
                    self.sql,
                    " FROM \"{}\" AS \"{inner}\" WHERE ",
                    target.table_name()
                );
                self.write_join(association, target, &inner, schema, alias);
                self.sql.push_str(" LIMIT 1)");
                Ok(())
            }
            [] => Err(StoreError::Plan("empty sort path".into())),
        }
    }

    /// `SELECT "t0"."id" FROM table AS "t0" WHERE ...`
    fn write_matching_ids(
        &mut self,
        schema: &Schema,
        filter: &PredicateNode,
    ) -> Result<(), StoreError> {
        let alias = self.alias();
        self.sql.push_str("SELECT ");
        write_qualified_column(&alias, &column_name(&schema.id_field), &mut self.sql);
        let _ = write!(self.sql, " FROM \"{}\" AS \"{alias}\"", schema.table_name());
        if !filter.is_empty() {
            self.sql.push_str(" WHERE ");
            self.write_predicate(schema, &alias, filter)?;
        }
        Ok(())
    }
}

// =============================================================================
// Statements
// =============================================================================

/// SELECT for `plan`, with the decoding instructions for each result column.
pub(crate) fn select<'p>(
    registry: &Registry,
    schema: &'p Schema,
    plan: &'p QueryPlan,
) -> Result<(Statement, Vec<Output<'p>>), StoreError> {
    let mut r = Renderer::new(registry);
    let alias = r.alias();
    let mut outputs = Vec::new();

    r.sql.push_str("SELECT ");
    for (i, name) in plan.attributes.names(schema).into_iter().enumerate() {
        if i > 0 {
            r.sql.push_str(", ");
        }
        let column = column_for(registry, schema, name).ok_or_else(|| {
            StoreError::Plan(format!("'{}' has no column '{name}'", schema.name))
        })?;
        write_qualified_column(&alias, &column.column, &mut r.sql);
        outputs.push(Output::Attribute {
            name,
            decode: column.decode,
        });
    }

    for node in &plan.include {
        r.sql.push_str(", ");
        let (association, _) = r.association(schema, &node.relationship)?;
        r.write_include(schema, &alias, node)?;
        outputs.push(Output::Include {
            node,
            cardinality: association.cardinality(),
        });
    }

    let _ = write!(r.sql, " FROM \"{}\" AS \"{alias}\"", schema.table_name());

    if !plan.filter.is_empty() {
        r.sql.push_str(" WHERE ");
        r.write_predicate(schema, &alias, &plan.filter)?;
    }

    if !plan.sort.is_empty() {
        r.sql.push_str(" ORDER BY ");
        for (i, key) in plan.sort.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            let segments: Vec<&str> = key.path.split('.').collect();
            r.write_sort_value(schema, &alias, &segments)?;
            r.sql.push_str(match key.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }
    }

    // SQLite reads integer literals past i64::MAX as REAL
    let bound = |n: u64| n.min(i64::MAX as u64);
    match (plan.limit.map(bound), plan.offset.map(bound)) {
        (Some(limit), offset) => {
            let _ = write!(r.sql, " LIMIT {limit}");
            if let Some(offset) = offset {
                let _ = write!(r.sql, " OFFSET {offset}");
            }
        }
        (None, Some(offset)) => {
            let _ = write!(r.sql, " LIMIT -1 OFFSET {offset}");
        }
        (None, None) => {}
    }

    Ok((r.finish(), outputs))
}

pub(crate) fn count(
    registry: &Registry,
    schema: &Schema,
    filter: &PredicateNode,
) -> Result<Statement, StoreError> {
    let mut r = Renderer::new(registry);
    r.sql.push_str("SELECT COUNT(*) FROM (");
    r.write_matching_ids(schema, filter)?;
    r.sql.push(')');
    Ok(r.finish())
}

/// `INSERT ... RETURNING *`.
pub(crate) fn insert(
    registry: &Registry,
    schema: &Schema,
    row: &Row,
) -> Result<Statement, StoreError> {
    let mut r = Renderer::new(registry);
    let _ = write!(r.sql, "INSERT INTO \"{}\"", schema.table_name());
    if row.is_empty() {
        r.sql.push_str(" DEFAULT VALUES RETURNING *");
        return Ok(r.finish());
    }

    r.sql.push_str(" (");
    for (i, name) in row.keys().enumerate() {
        if i > 0 {
            r.sql.push_str(", ");
        }
        let column = r.column(schema, name)?;
        let _ = write!(r.sql, "\"{column}\"");
    }
    r.sql.push_str(") VALUES ");
    let values: Vec<Value> = row.values().cloned().collect();
    r.bind_list(&values);
    r.sql.push_str(" RETURNING *");
    Ok(r.finish())
}

pub(crate) fn update(
    registry: &Registry,
    schema: &Schema,
    attributes: &Row,
    filter: &PredicateNode,
) -> Result<Statement, StoreError> {
    let mut r = Renderer::new(registry);
    let _ = write!(r.sql, "UPDATE \"{}\" SET ", schema.table_name());
    for (i, (name, value)) in attributes.iter().enumerate() {
        if i > 0 {
            r.sql.push_str(", ");
        }
        let column = r.column(schema, name)?;
        let _ = write!(r.sql, "\"{column}\" = ");
        r.bind(value);
    }
    let _ = write!(r.sql, " WHERE \"{}\" IN (", column_name(&schema.id_field));
    r.write_matching_ids(schema, filter)?;
    r.sql.push(')');
    Ok(r.finish())
}

pub(crate) fn delete(
    registry: &Registry,
    schema: &Schema,
    filter: &PredicateNode,
) -> Result<Statement, StoreError> {
    let mut r = Renderer::new(registry);
    let _ = write!(
        r.sql,
        "DELETE FROM \"{}\" WHERE \"{}\" IN (",
        schema.table_name(),
        column_name(&schema.id_field)
    );
    r.write_matching_ids(schema, filter)?;
    r.sql.push(')');
    Ok(r.finish())
}

pub(crate) fn existing_ids(
    registry: &Registry,
    schema: &Schema,
    ids: &[Value],
) -> Statement {
    let mut r = Renderer::new(registry);
    let id = column_name(&schema.id_field);
    let _ = write!(
        r.sql,
        "SELECT \"{id}\" FROM \"{}\" WHERE \"{id}\" IN ",
        schema.table_name()
    );
    r.bind_list(ids);
    r.finish()
}

/// Statements linking `ids` to `parent`. With `replace`, existing links not in
/// `ids` are removed first.
pub(crate) fn links(
    registry: &Registry,
    association: &Association,
    parent: &Value,
    ids: &[Value],
    replace: bool,
) -> Result<Vec<Statement>, StoreError> {
    let source = registry.schema(&association.source).ok_or_else(|| {
        StoreError::Plan(format!("unknown schema '{}'", association.source))
    })?;
    let target = registry.target(association);
    let mut statements = Vec::new();

    match &association.kind {
        AssociationKind::BelongsTo { source_key } => {
            if ids.is_empty() && !replace {
                return Ok(statements);
            }
            let mut r = Renderer::new(registry);
            let _ = write!(
                r.sql,
                "UPDATE \"{}\" SET \"{}\" = ",
                source.table_name(),
                column_name(source_key)
            );
            r.bind(ids.first().unwrap_or(&Value::Null));
            let _ = write!(r.sql, " WHERE \"{}\" = ", column_name(&source.id_field));
            r.bind(parent);
            statements.push(r.finish());
        }
        AssociationKind::HasOne { target_key } | AssociationKind::HasMany { target_key } => {
            let table = target.table_name();
            let key = column_name(target_key);
            let id = column_name(&target.id_field);

            if replace {
                let mut r = Renderer::new(registry);
                let _ = write!(r.sql, "UPDATE \"{table}\" SET \"{key}\" = NULL WHERE \"{key}\" = ");
                r.bind(parent);
                if !ids.is_empty() {
                    let _ = write!(r.sql, " AND \"{id}\" NOT IN ");
                    r.bind_list(ids);
                }
                statements.push(r.finish());
            }
            if !ids.is_empty() {
                let mut r = Renderer::new(registry);
                let _ = write!(r.sql, "UPDATE \"{table}\" SET \"{key}\" = ");
                r.bind(parent);
                let _ = write!(r.sql, " WHERE \"{id}\" IN ");
                r.bind_list(ids);
                statements.push(r.finish());
            }
        }
        AssociationKind::HasManyThrough { join } => {
            let source_key = column_name(&join.source_key);
            let target_key = column_name(&join.target_key);

            if replace {
                let mut r = Renderer::new(registry);
                let _ = write!(
                    r.sql,
                    "DELETE FROM \"{}\" WHERE \"{source_key}\" = ",
                    join.table
                );
                r.bind(parent);
                statements.push(r.finish());
            }
            if !ids.is_empty() {
                let mut r = Renderer::new(registry);
                let _ = write!(
                    r.sql,
                    "INSERT OR IGNORE INTO \"{}\" (\"{source_key}\", \"{target_key}\") VALUES ",
                    join.table
                );
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        r.sql.push_str(", ");
                    }
                    r.sql.push('(');
                    r.bind(parent);
                    r.sql.push_str(", ");
                    r.bind(id);
                    r.sql.push(')');
                }
                statements.push(r.finish());
            }
        }
    }

    Ok(statements)
}

/// Writes `"alias"."column"` into the buffer.
fn write_qualified_column(alias: &str, column: &str, sql: &mut String) {
    sql.push('"');
    sql.push_str(alias);
    sql.push_str("\".\"");
    sql.push_str(column);
    sql.push('"');
}
