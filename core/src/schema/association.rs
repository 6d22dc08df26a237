use hashbrown::HashMap;

/// Join table backing a `hasManyThrough` association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    /// Join resource name, e.g. `TodoTags`
    pub name: String,
    /// Store table name, e.g. `todo_tags`
    pub table: String,
    /// Attribute pointing at the source row
    pub source_key: String,
    /// Attribute pointing at the target row
    pub target_key: String,
}

/// How an association is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    BelongsTo { source_key: String },
    HasOne { target_key: String },
    HasMany { target_key: String },
    HasManyThrough { join: JoinTable },
}

/// Whether a relationship carries one identifier or an array of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

impl AssociationKind {
    pub fn cardinality(&self) -> Cardinality {
        match self {
            AssociationKind::BelongsTo { .. } | AssociationKind::HasOne { .. } => Cardinality::One,
            AssociationKind::HasMany { .. } | AssociationKind::HasManyThrough { .. } => {
                Cardinality::Many
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AssociationKind::BelongsTo { .. } => "belongsTo",
            AssociationKind::HasOne { .. } => "hasOne",
            AssociationKind::HasMany { .. } => "hasMany",
            AssociationKind::HasManyThrough { .. } => "hasManyThrough",
        }
    }
}

/// A relationship resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Relationship name on the source schema
    pub name: String,
    /// Source schema full name
    pub source: String,
    /// Target schema full name
    pub target: String,
    pub kind: AssociationKind,
}

impl Association {
    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }
}

/// Per-schema relationship name → association map.
///
/// Built once at registry assembly and shared read-only by the compiler and the
/// persistence engine.
#[derive(Debug, Clone, Default)]
pub struct AssociationLookup {
    by_schema: HashMap<String, Vec<Association>>,
}

impl AssociationLookup {
    pub(crate) fn insert(&mut self, association: Association) {
        self.by_schema
            .entry(association.source.clone())
            .or_default()
            .push(association);
    }

    /// Associations of `schema`, in declaration order.
    pub fn for_schema(&self, schema: &str) -> &[Association] {
        self.by_schema
            .get(schema)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, schema: &str, relationship: &str) -> Option<&Association> {
        self.for_schema(schema)
            .iter()
            .find(|a| a.name == relationship)
    }

    pub fn has_relationships(&self, schema: &str) -> bool {
        !self.for_schema(schema).is_empty()
    }
}
