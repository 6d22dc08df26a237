use hatchify_core::error::{HatchifyError, Location};
use hatchify_core::schema::{Association, AssociationKind, Cardinality, Registry, Schema};
use hatchify_core::store::Row;
use hatchify_core::write::{LinkTarget, RelationshipLink, WritePayload};
use serde_json::Value;

/// A payload split by where each part is stored.
#[derive(Debug)]
pub(crate) struct Partition<'p, 'r> {
    /// Columns of the written row itself
    pub own: Row,
    /// belongsTo keys: the related id is inlined into `own`. `None` clears it.
    pub belongs_to: Vec<(&'r Association, Option<&'p Value>)>,
    /// hasOne / hasMany / hasManyThrough keys, linked after the row is written
    pub external: Vec<(&'r Association, &'p RelationshipLink)>,
}

impl Partition<'_, '_> {
    pub fn has_relationships(&self) -> bool {
        !self.belongs_to.is_empty() || !self.external.is_empty()
    }
}

fn pointer(name: &str) -> Location {
    Location::pointer(format!("/data/relationships/{name}/data"))
}

pub(crate) fn partition<'p, 'r>(
    registry: &'r Registry,
    schema: &Schema,
    payload: &'p WritePayload,
) -> Result<Partition<'p, 'r>, HatchifyError> {
    let lookup = registry.associations();
    let mut out = Partition {
        own: payload.attributes.clone(),
        belongs_to: Vec::new(),
        external: Vec::new(),
    };

    for (name, link) in &payload.relationships {
        let Some(association) = lookup.get(&schema.full_name(), name) else {
            return Err(HatchifyError::relationship_path(
                format!("'{}' has no relationship '{name}'.", schema.name),
                Location::pointer(format!("/data/relationships/{name}")),
            ));
        };

        match (link, association.cardinality()) {
            (RelationshipLink::Many(_), Cardinality::One) => {
                return Err(HatchifyError::unexpected_value(
                    format!(
                        "Relationship '{name}' is {} and must not have 'data' as an array.",
                        association.kind.name()
                    ),
                    pointer(name),
                ));
            }
            (RelationshipLink::One(_), Cardinality::Many) => {
                return Err(HatchifyError::unexpected_value(
                    format!(
                        "Relationship '{name}' is {} and must have 'data' as an array.",
                        association.kind.name()
                    ),
                    pointer(name),
                ));
            }
            _ => {}
        }

        match (&association.kind, link) {
            (AssociationKind::BelongsTo { .. }, RelationshipLink::One(target)) => {
                let id = match target {
                    None => None,
                    Some(LinkTarget::ById(id)) => Some(id),
                    Some(LinkTarget::Create(_)) => {
                        return Err(HatchifyError::unexpected_value(
                            format!(
                                "A belongsTo relationship must reference an existing '{}' by 'id'.",
                                registry.target(association).name
                            ),
                            pointer(name),
                        ));
                    }
                };
                out.belongs_to.push((association, id));
            }
            _ => out.external.push((association, link)),
        }
    }

    Ok(out)
}
