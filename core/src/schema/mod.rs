//! Declarative resource schemas.
//!
//! A [`Schema`] names a resource, its primary key, its attributes (in
//! declaration order) and its relationships. Schemas are assembled into an
//! immutable [`Registry`], which also resolves every relationship into an
//! [`Association`].

mod association;
mod registry;
mod relationship;

pub use association::{Association, AssociationKind, AssociationLookup, Cardinality, JoinTable};
pub use registry::{ForeignKey, Registry, RegistryBuilder, RegistryError};
pub use relationship::Relationship;

use heck::{ToKebabCase, ToSnakeCase};
use serde_json::Value;

use crate::error::{HatchifyError, Location};

/// Semantic attribute type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp, stored normalised to UTC
    Datetime,
    Uuid,
    /// String restricted to the listed values
    Enum(Vec<String>),
}

impl AttributeType {
    pub fn name(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Text => "text",
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::Boolean => "boolean",
            AttributeType::Datetime => "datetime",
            AttributeType::Uuid => "uuid",
            AttributeType::Enum(_) => "enum",
        }
    }
}

/// A single attribute of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub ty: AttributeType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<Value>,
    /// Lower bound: numeric value for numbers, length for strings
    pub min: Option<f64>,
    /// Upper bound: numeric value for numbers, length for strings
    pub max: Option<f64>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            unique: false,
            default: None,
            min: None,
            max: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::String)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Datetime)
    }

    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Uuid)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            AttributeType::Enum(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Marks the attribute as non-nullable.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }
}

/// Primary key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdType {
    /// Client- or engine-generated v4 UUID
    #[default]
    Uuid,
    /// Store-assigned integer
    Integer,
}

/// A resource schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub namespace: Option<String>,
    pub plural_name: Option<String>,
    pub id_field: String,
    pub id_type: IdType,
    pub attributes: Vec<Attribute>,
    pub relationships: Vec<(String, Relationship)>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            plural_name: None,
            id_field: "id".to_string(),
            id_type: IdType::default(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural_name = Some(plural.into());
        self
    }

    pub fn id(mut self, field: impl Into<String>, ty: IdType) -> Self {
        self.id_field = field.into();
        self.id_type = ty;
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, relationship: Relationship) -> Self {
        self.relationships.push((name.into(), relationship));
        self
    }

    /// Registry key: `Namespace_Name` for namespaced schemas, `Name` otherwise.
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}_{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Store table name.
    pub fn table_name(&self) -> String {
        self.full_name().to_snake_case()
    }

    /// Path segment the resource is served under.
    pub fn endpoint(&self) -> String {
        let plural = self
            .plural_name
            .clone()
            .unwrap_or_else(|| format!("{}s", self.name));
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns.to_kebab_case(), plural.to_kebab_case()),
            None => plural.to_kebab_case(),
        }
    }

    pub fn attribute_named(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Whether `name` is a selectable column: the primary key or a declared attribute.
    pub fn has_field(&self, name: &str) -> bool {
        name == self.id_field || self.attribute_named(name).is_some()
    }

    /// Declared attribute names, in declaration order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    pub fn relationship_names(&self) -> impl Iterator<Item = &str> {
        self.relationships.iter().map(|(n, _)| n.as_str())
    }

    /// Primary key followed by every declared attribute.
    pub fn all_fields(&self) -> Vec<&str> {
        std::iter::once(self.id_field.as_str())
            .chain(self.attribute_names())
            .collect()
    }

    /// Coerces an identifier taken from a path or query string to the primary key type.
    pub fn parse_id(&self, raw: &str) -> Result<Value, HatchifyError> {
        match self.id_type {
            IdType::Uuid => uuid::Uuid::parse_str(raw)
                .map(|_| Value::String(raw.to_string()))
                .map_err(|_| {
                    HatchifyError::unexpected_value(
                        format!("'{raw}' is not a valid {} identifier.", self.name),
                        Location::parameter(self.id_field.clone()),
                    )
                }),
            IdType::Integer => raw.parse::<i64>().map(Value::from).map_err(|_| {
                HatchifyError::unexpected_value(
                    format!("'{raw}' is not a valid {} identifier.", self.name),
                    Location::parameter(self.id_field.clone()),
                )
            }),
        }
    }
}

/// Store column name for an attribute name.
pub fn column_name(attribute: &str) -> String {
    attribute.to_snake_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_follows_namespace_and_plural() {
        let plain = Schema::new("TodoItem");
        assert_eq!(plain.full_name(), "TodoItem");
        assert_eq!(plain.table_name(), "todo_item");
        assert_eq!(plain.endpoint(), "todo-items");

        let ns = Schema::new("Person").namespace("Admin").plural("People");
        assert_eq!(ns.full_name(), "Admin_Person");
        assert_eq!(ns.table_name(), "admin_person");
        assert_eq!(ns.endpoint(), "admin/people");
    }

    #[test]
    fn parse_id_respects_id_type() {
        let uuid_schema = Schema::new("Todo");
        assert!(uuid_schema.parse_id("not-a-uuid").is_err());
        assert_eq!(
            uuid_schema
                .parse_id("6b0c1a3e-5b7f-4a55-9d3c-0d6b5a1f2e3d")
                .unwrap(),
            Value::String("6b0c1a3e-5b7f-4a55-9d3c-0d6b5a1f2e3d".into())
        );

        let int_schema = Schema::new("Counter").id("id", IdType::Integer);
        assert_eq!(int_schema.parse_id("42").unwrap(), Value::from(42));
        assert!(int_schema.parse_id("4x2").is_err());
    }

    #[test]
    fn column_names_are_snake_case() {
        assert_eq!(column_name("dueDate"), "due_date");
        assert_eq!(column_name("userId"), "user_id");
        assert_eq!(column_name("id"), "id");
    }
}
