//! Registry assembly.
//!
//! The registry is built once, validated as a whole, and immutable afterwards.
//! Every relationship target is resolved here, so nothing downstream has to
//! handle a dangling reference.

use hashbrown::{HashMap, HashSet};
use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use thiserror::Error;

use super::{Association, AssociationKind, AssociationLookup, JoinTable, Relationship, Schema};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Schema '{0}' is registered more than once")]
    DuplicateSchema(String),

    #[error("Schema '{schema}' declares '{name}' more than once")]
    DuplicateField { schema: String, name: String },

    #[error("Schema '{schema}' uses '{name}' as both an attribute and a relationship")]
    NameClash { schema: String, name: String },

    #[error("Relationship '{schema}.{relationship}' targets unknown schema '{target}'")]
    UnknownTarget {
        schema: String,
        relationship: String,
        target: String,
    },

    #[error("Relationship '{schema}.{relationship}' uses '{key}' as both join table keys")]
    JoinKeyClash {
        schema: String,
        relationship: String,
        key: String,
    },
}

/// Foreign-key column a table must carry for some association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub attribute: String,
    /// Full name of the referenced schema
    pub references: String,
}

/// Collects schemas before assembly.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    schemas: Vec<Schema>,
}

impl RegistryBuilder {
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Validates every schema and resolves all relationships.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut index = HashMap::new();
        for (i, schema) in self.schemas.iter().enumerate() {
            if index.insert(schema.full_name(), i).is_some() {
                return Err(RegistryError::DuplicateSchema(schema.full_name()));
            }
        }

        for schema in &self.schemas {
            check_names(schema)?;
        }

        let mut associations = AssociationLookup::default();
        let mut foreign_keys: HashMap<String, Vec<ForeignKey>> = HashMap::new();

        for schema in &self.schemas {
            let source = schema.full_name();
            for (name, relationship) in &schema.relationships {
                let target = relationship.target();
                let Some(&target_idx) = index.get(target) else {
                    return Err(RegistryError::UnknownTarget {
                        schema: source.clone(),
                        relationship: name.clone(),
                        target: target.to_string(),
                    });
                };
                let target_schema = &self.schemas[target_idx];

                let kind = resolve_kind(schema, target_schema, name, relationship)?;
                match &kind {
                    AssociationKind::BelongsTo { source_key } => push_foreign_key(
                        &mut foreign_keys,
                        schema,
                        source_key,
                        target_schema.full_name(),
                    ),
                    AssociationKind::HasOne { target_key }
                    | AssociationKind::HasMany { target_key } => push_foreign_key(
                        &mut foreign_keys,
                        target_schema,
                        target_key,
                        source.clone(),
                    ),
                    AssociationKind::HasManyThrough { .. } => {}
                }

                associations.insert(Association {
                    name: name.clone(),
                    source: source.clone(),
                    target: target_schema.full_name(),
                    kind,
                });
            }
        }

        Ok(Registry {
            schemas: self.schemas,
            index,
            associations,
            foreign_keys,
        })
    }
}

fn check_names(schema: &Schema) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    seen.insert(schema.id_field.as_str());
    for attribute in &schema.attributes {
        if !seen.insert(attribute.name.as_str()) {
            return Err(RegistryError::DuplicateField {
                schema: schema.full_name(),
                name: attribute.name.clone(),
            });
        }
    }
    let mut relationships = HashSet::new();
    for name in schema.relationship_names() {
        if seen.contains(name) {
            return Err(RegistryError::NameClash {
                schema: schema.full_name(),
                name: name.to_string(),
            });
        }
        if !relationships.insert(name) {
            return Err(RegistryError::DuplicateField {
                schema: schema.full_name(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn resolve_kind(
    source: &Schema,
    target: &Schema,
    name: &str,
    relationship: &Relationship,
) -> Result<AssociationKind, RegistryError> {
    let source_ref = format!("{}_id", source.name).to_lower_camel_case();
    let kind = match relationship {
        Relationship::BelongsTo {
            source_attribute, ..
        } => AssociationKind::BelongsTo {
            source_key: source_attribute
                .clone()
                .unwrap_or_else(|| format!("{name}_id").to_lower_camel_case()),
        },
        Relationship::HasOne {
            target_attribute, ..
        } => AssociationKind::HasOne {
            target_key: target_attribute.clone().unwrap_or(source_ref),
        },
        Relationship::HasMany {
            target_attribute, ..
        } => AssociationKind::HasMany {
            target_key: target_attribute.clone().unwrap_or(source_ref),
        },
        Relationship::HasManyThrough {
            through,
            through_source_attribute,
            through_target_attribute,
            ..
        } => {
            let join_name = through
                .clone()
                .unwrap_or_else(|| format!("{}{}", source.name, name.to_upper_camel_case()));
            let table = match &source.namespace {
                Some(ns) => format!("{ns}_{join_name}").to_snake_case(),
                None => join_name.to_snake_case(),
            };
            let source_key = through_source_attribute.clone().unwrap_or(source_ref);
            let target_key = through_target_attribute.clone().unwrap_or_else(|| {
                let key = format!("{}_id", target.name).to_lower_camel_case();
                // Self-referential joins name the far side after the relationship
                if key == source_key {
                    format!("{name}_id").to_lower_camel_case()
                } else {
                    key
                }
            });
            if source_key == target_key {
                return Err(RegistryError::JoinKeyClash {
                    schema: source.full_name(),
                    relationship: name.to_string(),
                    key: source_key,
                });
            }
            AssociationKind::HasManyThrough {
                join: JoinTable {
                    name: join_name,
                    table,
                    source_key,
                    target_key,
                },
            }
        }
    };
    Ok(kind)
}

fn push_foreign_key(
    foreign_keys: &mut HashMap<String, Vec<ForeignKey>>,
    owner: &Schema,
    attribute: &str,
    references: String,
) {
    // A declared attribute already provides the column.
    if owner.has_field(attribute) {
        return;
    }
    let keys = foreign_keys.entry(owner.full_name()).or_default();
    if !keys.iter().any(|k| k.attribute == attribute) {
        keys.push(ForeignKey {
            attribute: attribute.to_string(),
            references,
        });
    }
}

/// Immutable set of schemas and their resolved associations.
#[derive(Debug, Clone)]
pub struct Registry {
    schemas: Vec<Schema>,
    index: HashMap<String, usize>,
    associations: AssociationLookup,
    foreign_keys: HashMap<String, Vec<ForeignKey>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Schemas in registration order.
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn schema(&self, full_name: &str) -> Option<&Schema> {
        self.index.get(full_name).map(|&i| &self.schemas[i])
    }

    pub fn associations(&self) -> &AssociationLookup {
        &self.associations
    }

    /// Target schema of an association resolved by this registry.
    ///
    /// # Panics
    ///
    /// If `association` was not produced by this registry.
    pub fn target(&self, association: &Association) -> &Schema {
        &self.schemas[self.index[&association.target]]
    }

    /// Foreign-key columns `schema` carries beyond its declared attributes.
    pub fn foreign_keys(&self, schema: &str) -> &[ForeignKey] {
        self.foreign_keys
            .get(schema)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `hasManyThrough` associations, one per distinct join table.
    pub fn join_associations(&self) -> Vec<&Association> {
        let mut seen = HashSet::new();
        self.schemas
            .iter()
            .flat_map(|s| self.associations.for_schema(&s.full_name()))
            .filter(|a| match &a.kind {
                AssociationKind::HasManyThrough { join } => seen.insert(join.table.clone()),
                _ => false,
            })
            .collect()
    }

    /// Resolves an endpoint path (without prefix), e.g. `todos` or `admin/people`.
    pub fn by_endpoint(&self, endpoint: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.endpoint() == endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Cardinality};

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
                    .relationship("user", Relationship::belongs_to("User"))
                    .relationship("tags", Relationship::has_many_through("Tag")),
            )
            .schema(Schema::new("Tag").attribute(Attribute::string("name")))
            .build()
            .unwrap()
    }

    #[test]
    fn derives_default_keys() {
        let registry = registry();
        let lookup = registry.associations();

        assert_eq!(
            lookup.get("Todo", "user").unwrap().kind,
            AssociationKind::BelongsTo {
                source_key: "userId".into()
            }
        );
        assert_eq!(
            lookup.get("User", "todos").unwrap().kind,
            AssociationKind::HasMany {
                target_key: "userId".into()
            }
        );
        assert_eq!(
            lookup.get("Todo", "tags").unwrap().kind,
            AssociationKind::HasManyThrough {
                join: JoinTable {
                    name: "TodoTags".into(),
                    table: "todo_tags".into(),
                    source_key: "todoId".into(),
                    target_key: "tagId".into(),
                }
            }
        );
        assert_eq!(
            lookup.get("Todo", "tags").unwrap().cardinality(),
            Cardinality::Many
        );
    }

    #[test]
    fn foreign_keys_are_deduplicated() {
        let registry = registry();
        // belongsTo on Todo and hasMany on User both need todo.userId.
        assert_eq!(
            registry.foreign_keys("Todo"),
            &[ForeignKey {
                attribute: "userId".into(),
                references: "User".into()
            }]
        );
        assert!(registry.foreign_keys("User").is_empty());
        assert_eq!(registry.join_associations().len(), 1);
    }

    #[test]
    fn rejects_unknown_target() {
        let err = Registry::builder()
            .schema(Schema::new("Todo").relationship("owner", Relationship::belongs_to("Person")))
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::UnknownTarget {
                schema: "Todo".into(),
                relationship: "owner".into(),
                target: "Person".into()
            }
        );
    }

    #[test]
    fn rejects_name_clash_and_duplicates() {
        let clash = Registry::builder()
            .schema(
                Schema::new("Todo")
                    .attribute(Attribute::string("user"))
                    .relationship("user", Relationship::belongs_to("Todo")),
            )
            .build();
        assert!(matches!(clash, Err(RegistryError::NameClash { .. })));

        let dup = Registry::builder()
            .schema(Schema::new("Todo"))
            .schema(Schema::new("Todo"))
            .build();
        assert_eq!(dup.unwrap_err(), RegistryError::DuplicateSchema("Todo".into()));
    }

    #[test]
    fn self_referential_join_keys_stay_distinct() {
        let registry = Registry::builder()
            .schema(Schema::new("User").relationship("friends", Relationship::has_many_through("User")))
            .build()
            .unwrap();
        let AssociationKind::HasManyThrough { join } =
            &registry.associations().get("User", "friends").unwrap().kind
        else {
            panic!("expected a join association");
        };
        assert_eq!(join.source_key, "userId");
        assert_eq!(join.target_key, "friendsId");

        let clash = Registry::builder()
            .schema(Schema::new("Tag").relationship(
                "links",
                Relationship::has_many_through("Tag").through("TagLink", "tagId", "tagId"),
            ))
            .build();
        assert_eq!(
            clash.unwrap_err(),
            RegistryError::JoinKeyClash {
                schema: "Tag".into(),
                relationship: "links".into(),
                key: "tagId".into()
            }
        );
    }

    #[test]
    fn resolves_endpoints() {
        let registry = registry();
        assert_eq!(registry.by_endpoint("todos").unwrap().name, "Todo");
        assert!(registry.by_endpoint("todo").is_none());
    }
}
