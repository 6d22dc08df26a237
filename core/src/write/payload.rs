//! Write payload construction.
//!
//! Turns a structurally valid JSON:API document into a [`WritePayload`]:
//! attributes coerced against the schema and relationship linkage tagged as
//! link-by-id or nested create.

use serde_json::{Map, Value};

use super::structure::validate_structure;
use crate::coerce::{coerce_id, coerce_json};
use crate::error::{Errors, HatchifyError, Location, quoted_list};
use crate::schema::{AssociationKind, Registry, Schema};
use crate::store::Row;

/// Whether a document creates a row or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Defaults apply and non-nullable attributes are required
    Create,
    /// Only the supplied attributes change
    Update,
}

/// One element of relationship linkage.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    /// Link an existing row
    ById(Value),
    /// Create the related row, then link it
    Create(Row),
}

impl LinkTarget {
    pub fn id(&self) -> Option<&Value> {
        match self {
            LinkTarget::ById(id) => Some(id),
            LinkTarget::Create(_) => None,
        }
    }
}

/// Linkage for one relationship key.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipLink {
    /// belongsTo / hasOne. `None` clears the relationship.
    One(Option<LinkTarget>),
    /// hasMany / hasManyThrough
    Many(Vec<LinkTarget>),
}

impl RelationshipLink {
    pub fn targets(&self) -> impl Iterator<Item = &LinkTarget> {
        let (one, many) = match self {
            RelationshipLink::One(target) => (target.as_ref(), &[][..]),
            RelationshipLink::Many(targets) => (None, targets.as_slice()),
        };
        one.into_iter().chain(many)
    }
}

/// Parsed write for one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePayload {
    /// Full name of the written schema
    pub resource_type: String,
    /// `data.id`, coerced to the primary key type
    pub id: Option<Value>,
    pub attributes: Row,
    /// Relationship linkage in document order
    pub relationships: Vec<(String, RelationshipLink)>,
}

impl WritePayload {
    /// Attribute-only payload.
    pub fn new(schema: &Schema, attributes: Row) -> Self {
        Self {
            resource_type: schema.full_name(),
            id: None,
            attributes,
            relationships: Vec::new(),
        }
    }

    pub fn with_relationship(mut self, name: impl Into<String>, link: RelationshipLink) -> Self {
        self.relationships.push((name.into(), link));
        self
    }

    pub fn has_relationships(&self) -> bool {
        !self.relationships.is_empty()
    }

    /// Validates `body` and builds the payload.
    pub fn from_document(
        registry: &Registry,
        schema: &Schema,
        body: &Value,
        mode: WriteMode,
    ) -> Result<Self, Errors> {
        validate_structure(registry, schema, body)?;

        let mut errors = Vec::new();
        let data = &body["data"];

        let id = match data.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => match coerce_id(schema, raw) {
                Ok(id) => Some(id),
                Err(detail) => {
                    errors.push(HatchifyError::unexpected_value(
                        detail,
                        Location::pointer("/data/id"),
                    ));
                    None
                }
            },
        };

        let empty = Map::new();
        let raw_attributes = data["attributes"].as_object().unwrap_or(&empty);
        let attributes =
            coerce_attributes(schema, raw_attributes, mode, "/data/attributes", &mut errors);

        let mut relationships = Vec::new();
        if let Some(raw) = data.get("relationships").and_then(Value::as_object) {
            for (name, value) in raw {
                if let Some(link) = build_link(registry, schema, name, &value["data"], &mut errors) {
                    relationships.push((name.clone(), link));
                }
            }
        }

        if !errors.is_empty() {
            crate::hatchify_trace_rejected!("payload", errors.len());
            return Err(errors);
        }

        Ok(Self {
            resource_type: schema.full_name(),
            id,
            attributes,
            relationships,
        })
    }
}

fn coerce_attributes(
    schema: &Schema,
    raw: &Map<String, Value>,
    mode: WriteMode,
    pointer: &str,
    errors: &mut Errors,
) -> Row {
    let mut row = Row::new();

    for (name, value) in raw {
        let Some(attribute) = schema.attribute_named(name) else {
            errors.push(HatchifyError::unexpected_value(
                format!(
                    "Payload must have 'attributes' containing one or more of {}.",
                    quoted_list(schema.attribute_names())
                ),
                Location::pointer(format!("{pointer}/{name}")),
            ));
            continue;
        };

        if value.is_null() {
            if attribute.nullable {
                row.insert(name.clone(), Value::Null);
            } else {
                errors.push(HatchifyError::value_required(
                    format!("Payload must include a non-null value for '{name}'."),
                    Location::pointer(format!("{pointer}/{name}")),
                ));
            }
            continue;
        }

        match coerce_json(attribute, value) {
            Ok(coerced) => {
                row.insert(name.clone(), coerced);
            }
            Err(detail) => errors.push(HatchifyError::unexpected_value(
                detail,
                Location::pointer(format!("{pointer}/{name}")),
            )),
        }
    }

    if mode == WriteMode::Create {
        for attribute in &schema.attributes {
            if raw.contains_key(&attribute.name) {
                continue;
            }
            if let Some(default) = &attribute.default {
                row.insert(attribute.name.clone(), default.clone());
            } else if !attribute.nullable {
                errors.push(HatchifyError::value_required(
                    format!("Payload must include a value for '{}'.", attribute.name),
                    Location::pointer(format!("{pointer}/{}", attribute.name)),
                ));
            }
        }
    }

    row
}

fn build_link(
    registry: &Registry,
    schema: &Schema,
    name: &str,
    linkage: &Value,
    errors: &mut Errors,
) -> Option<RelationshipLink> {
    let association = registry.associations().get(&schema.full_name(), name)?;
    let target = registry.target(association);
    let belongs_to = matches!(association.kind, AssociationKind::BelongsTo { .. });
    let pointer = format!("/data/relationships/{name}/data");

    match linkage {
        Value::Null => Some(RelationshipLink::One(None)),
        Value::Array(elements) => {
            let mut targets = Vec::with_capacity(elements.len());
            for (i, element) in elements.iter().enumerate() {
                let element_pointer = format!("{pointer}/{i}");
                if let Some(t) = build_target(target, element, false, &element_pointer, errors) {
                    targets.push(t);
                }
            }
            Some(RelationshipLink::Many(targets))
        }
        element => build_target(target, element, belongs_to, &pointer, errors)
            .map(|t| RelationshipLink::One(Some(t))),
    }
}

fn build_target(
    target: &Schema,
    element: &Value,
    belongs_to: bool,
    pointer: &str,
    errors: &mut Errors,
) -> Option<LinkTarget> {
    let Some(object) = element.as_object() else {
        errors.push(HatchifyError::unexpected_value(
            "Relationship linkage must be an object with 'type' and 'id' or 'attributes'.",
            Location::pointer(pointer),
        ));
        return None;
    };

    if let Some(Value::String(ty)) = object.get("type")
        && *ty != target.name
        && *ty != target.full_name()
    {
        errors.push(HatchifyError::unexpected_value(
            format!("Relationship linkage must have 'type' as '{}'.", target.name),
            Location::pointer(format!("{pointer}/type")),
        ));
        return None;
    }

    if let Some(id) = object.get("id").filter(|id| !id.is_null()) {
        return match coerce_id(target, id) {
            Ok(id) => Some(LinkTarget::ById(id)),
            Err(detail) => {
                errors.push(HatchifyError::unexpected_value(
                    detail,
                    Location::pointer(format!("{pointer}/id")),
                ));
                None
            }
        };
    }

    match object.get("attributes") {
        Some(Value::Object(attributes)) if !belongs_to => {
            let row = coerce_attributes(
                target,
                attributes,
                WriteMode::Create,
                &format!("{pointer}/attributes"),
                errors,
            );
            Some(LinkTarget::Create(row))
        }
        Some(Value::Object(_)) => {
            errors.push(HatchifyError::unexpected_value(
                format!(
                    "A belongsTo relationship must reference an existing '{}' by 'id'.",
                    target.name
                ),
                Location::pointer(pointer),
            ));
            None
        }
        _ => {
            errors.push(HatchifyError::value_required(
                "Relationship linkage must include 'id' or 'attributes'.",
                Location::pointer(pointer),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{Attribute, Relationship};
    use serde_json::json;

    const USER_ID: &str = "6b0c1a3e-5b7f-4a55-9d3c-0d6b5a1f2e3d";
    const TAG_ID: &str = "0d9c5f3e-1b2a-4c6d-8e7f-9a0b1c2d3e4f";

    fn registry() -> Registry {
        Registry::builder()
            .schema(
                Schema::new("User")
                    .attribute(Attribute::string("name").required())
                    .relationship("todos", Relationship::has_many("Todo")),
            )
            .schema(
                Schema::new("Todo")
                    .attribute(Attribute::string("name").required())
                    .attribute(Attribute::datetime("dueDate"))
                    .attribute(Attribute::boolean("complete").required().default_value(false))
                    .relationship("user", Relationship::belongs_to("User"))
                    .relationship("tags", Relationship::has_many_through("Tag")),
            )
            .schema(Schema::new("Tag").attribute(Attribute::string("name").required()))
            .build()
            .unwrap()
    }

    fn build(schema: &str, body: Value, mode: WriteMode) -> Result<WritePayload, Errors> {
        let registry = registry();
        WritePayload::from_document(&registry, registry.schema(schema).unwrap(), &body, mode)
    }

    #[test]
    fn create_applies_defaults_and_tags_links() {
        let payload = build(
            "Todo",
            json!({
                "data": {
                    "type": "Todo",
                    "attributes": { "name": "Walk", "dueDate": "2024-03-01T10:00:00+02:00" },
                    "relationships": {
                        "user": { "data": { "type": "User", "id": USER_ID } },
                        "tags": { "data": [
                            { "type": "Tag", "id": TAG_ID },
                            { "type": "Tag", "attributes": { "name": "home" } }
                        ] }
                    }
                }
            }),
            WriteMode::Create,
        )
        .unwrap();

        assert_eq!(payload.attributes["complete"], json!(false));
        assert_eq!(payload.attributes["dueDate"], json!("2024-03-01T08:00:00.000Z"));

        let mut rels = payload.relationships.into_iter();
        assert_eq!(
            rels.next().unwrap(),
            (
                "tags".to_string(),
                RelationshipLink::Many(vec![
                    LinkTarget::ById(json!(TAG_ID)),
                    LinkTarget::Create(json!({ "name": "home" }).as_object().unwrap().clone()),
                ])
            )
        );
        assert_eq!(
            rels.next().unwrap(),
            (
                "user".to_string(),
                RelationshipLink::One(Some(LinkTarget::ById(json!(USER_ID))))
            )
        );
    }

    #[test]
    fn missing_required_attributes_only_on_create() {
        let body = json!({ "data": { "type": "Todo", "attributes": {} } });

        let errors = build("Todo", body.clone(), WriteMode::Create).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::ValueRequired);
        assert_eq!(errors[0].location(), &Location::pointer("/data/attributes/name"));

        assert!(build("Todo", body, WriteMode::Update).is_ok());
    }

    #[test]
    fn attribute_errors_accumulate() {
        let errors = build(
            "Todo",
            json!({
                "data": {
                    "type": "Todo",
                    "attributes": { "name": null, "dueDate": "soon", "bogus": 1 }
                }
            }),
            WriteMode::Update,
        )
        .unwrap_err();

        assert_eq!(errors.len(), 3);
        let kinds: Vec<_> = errors.iter().map(HatchifyError::kind).collect();
        assert_eq!(
            kinds.iter().filter(|k| **k == ErrorKind::UnexpectedValue).count(),
            2
        );
        assert!(kinds.contains(&ErrorKind::ValueRequired));
    }

    #[test]
    fn belongs_to_cannot_nest_create() {
        let errors = build(
            "Todo",
            json!({
                "data": {
                    "type": "Todo",
                    "attributes": { "name": "Walk" },
                    "relationships": {
                        "user": { "data": { "type": "User", "attributes": { "name": "Ann" } } }
                    }
                }
            }),
            WriteMode::Create,
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].location(),
            &Location::pointer("/data/relationships/user/data")
        );
    }

    #[test]
    fn nested_create_is_coerced_against_target() {
        let errors = build(
            "User",
            json!({
                "data": {
                    "type": "User",
                    "attributes": { "name": "Ann" },
                    "relationships": {
                        "todos": { "data": [ { "type": "Todo", "attributes": {} } ] }
                    }
                }
            }),
            WriteMode::Create,
        )
        .unwrap_err();

        assert_eq!(
            errors[0].location(),
            &Location::pointer("/data/relationships/todos/data/0/attributes/name")
        );
    }

    #[test]
    fn empty_array_clears() {
        let payload = build(
            "User",
            json!({
                "data": {
                    "type": "User",
                    "attributes": {},
                    "relationships": { "todos": { "data": [] } }
                }
            }),
            WriteMode::Update,
        )
        .unwrap();

        assert_eq!(
            payload.relationships,
            vec![("todos".to_string(), RelationshipLink::Many(Vec::new()))]
        );
    }

    #[test]
    fn client_id_is_coerced() {
        let errors = build(
            "Tag",
            json!({ "data": { "type": "Tag", "id": 12, "attributes": { "name": "x" } } }),
            WriteMode::Create,
        )
        .unwrap_err();
        assert_eq!(errors[0].location(), &Location::pointer("/data/id"));
    }
}
