//! Structural checks on JSON:API write documents.

use serde_json::Value;

use crate::error::{Errors, HatchifyError, Location, quoted_list};
use crate::schema::{Cardinality, Registry, Schema};

/// Checks the shape of a write document for `schema`.
///
/// `data`, `data.type` and `data.attributes` fail fast. Relationship problems
/// are collected and returned together.
pub fn validate_structure(registry: &Registry, schema: &Schema, body: &Value) -> Result<(), Errors> {
    let result = check(registry, schema, body);
    if let Err(errors) = &result {
        crate::hatchify_trace_rejected!("structure", errors.len());
    }
    result
}

fn check(registry: &Registry, schema: &Schema, body: &Value) -> Result<(), Errors> {
    let data = match body.get("data") {
        None | Some(Value::Null) => {
            return Err(vec![HatchifyError::value_required(
                "Payload must include 'data'.",
                Location::pointer("/data"),
            )]);
        }
        Some(Value::Object(data)) => data,
        Some(_) => {
            return Err(vec![HatchifyError::unexpected_value(
                "Payload must have 'data' as an object.",
                Location::pointer("/data"),
            )]);
        }
    };

    match data.get("type") {
        None | Some(Value::Null) => {
            return Err(vec![HatchifyError::value_required(
                "Payload must include 'type'.",
                Location::pointer("/data/type"),
            )]);
        }
        Some(Value::String(ty)) if *ty == schema.name || *ty == schema.full_name() => {}
        Some(_) => {
            return Err(vec![HatchifyError::unexpected_value(
                format!("Payload must have 'type' as '{}'.", schema.name),
                Location::pointer("/data/type"),
            )]);
        }
    }

    match data.get("attributes") {
        None | Some(Value::Null) => {
            return Err(vec![HatchifyError::value_required(
                "Payload must include 'attributes'.",
                Location::pointer("/data/attributes"),
            )]);
        }
        Some(Value::Object(_)) => {}
        Some(_) => {
            return Err(vec![HatchifyError::unexpected_value(
                "Payload must have 'attributes' as an object.",
                Location::pointer("/data/attributes"),
            )]);
        }
    }

    let relationships = match data.get("relationships") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Object(relationships)) => relationships,
        Some(_) => {
            return Err(vec![HatchifyError::unexpected_value(
                "Payload must have 'relationships' as an object.",
                Location::pointer("/data/relationships"),
            )]);
        }
    };

    let lookup = registry.associations();
    let source = schema.full_name();
    let mut errors = Vec::new();

    for (name, value) in relationships {
        let pointer = format!("/data/relationships/{name}");
        let Some(association) = lookup.get(&source, name) else {
            let detail = if schema.relationships.is_empty() {
                format!("'{}' has no relationships; '{name}' is unknown.", schema.name)
            } else {
                format!(
                    "Payload must have 'relationships' as one or more of {}.",
                    quoted_list(schema.relationship_names())
                )
            };
            errors.push(HatchifyError::relationship_path(
                detail,
                Location::pointer(pointer),
            ));
            continue;
        };

        let Some(linkage) = value.as_object().and_then(|v| v.get("data")) else {
            errors.push(HatchifyError::value_required(
                format!("Payload must include 'data' for relationship '{name}'."),
                Location::pointer(format!("{pointer}/data")),
            ));
            continue;
        };

        let matches = match (association.cardinality(), linkage) {
            (Cardinality::One, Value::Object(_) | Value::Null) => true,
            (Cardinality::Many, Value::Array(_)) => true,
            _ => false,
        };
        if !matches {
            let expected = match association.cardinality() {
                Cardinality::One => "an object",
                Cardinality::Many => "an array",
            };
            errors.push(HatchifyError::unexpected_value(
                format!(
                    "Relationship '{name}' is {} and must have 'data' as {expected}.",
                    association.kind.name()
                ),
                Location::pointer(format!("{pointer}/data")),
            ));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
