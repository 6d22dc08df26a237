/// Declared relationship from one schema to another.
///
/// Key columns are optional; when omitted the registry derives them from the
/// relationship and schema names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relationship {
    /// The source row holds the foreign key (`source_attribute`).
    BelongsTo {
        target: String,
        source_attribute: Option<String>,
    },
    /// One target row holds a foreign key back to the source.
    HasOne {
        target: String,
        target_attribute: Option<String>,
    },
    /// Many target rows hold a foreign key back to the source.
    HasMany {
        target: String,
        target_attribute: Option<String>,
    },
    /// Rows are linked through a join table.
    HasManyThrough {
        target: String,
        through: Option<String>,
        through_source_attribute: Option<String>,
        through_target_attribute: Option<String>,
    },
}

impl Relationship {
    pub fn belongs_to(target: impl Into<String>) -> Self {
        Relationship::BelongsTo {
            target: target.into(),
            source_attribute: None,
        }
    }

    pub fn has_one(target: impl Into<String>) -> Self {
        Relationship::HasOne {
            target: target.into(),
            target_attribute: None,
        }
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Relationship::HasMany {
            target: target.into(),
            target_attribute: None,
        }
    }

    pub fn has_many_through(target: impl Into<String>) -> Self {
        Relationship::HasManyThrough {
            target: target.into(),
            through: None,
            through_source_attribute: None,
            through_target_attribute: None,
        }
    }

    /// Overrides the foreign-key attribute.
    ///
    /// For `belongsTo` this is the column on the source; for `hasOne`/`hasMany`
    /// the column on the target; for `hasManyThrough` the join-table column
    /// pointing at the source.
    pub fn foreign_key(mut self, attribute: impl Into<String>) -> Self {
        let attribute = Some(attribute.into());
        match &mut self {
            Relationship::BelongsTo {
                source_attribute, ..
            } => *source_attribute = attribute,
            Relationship::HasOne {
                target_attribute, ..
            }
            | Relationship::HasMany {
                target_attribute, ..
            } => *target_attribute = attribute,
            Relationship::HasManyThrough {
                through_source_attribute,
                ..
            } => *through_source_attribute = attribute,
        }
        self
    }

    /// Names the join resource and its two key columns. No-op for the other variants.
    pub fn through(
        mut self,
        name: impl Into<String>,
        source_attribute: impl Into<String>,
        target_attribute: impl Into<String>,
    ) -> Self {
        if let Relationship::HasManyThrough {
            through,
            through_source_attribute,
            through_target_attribute,
            ..
        } = &mut self
        {
            *through = Some(name.into());
            *through_source_attribute = Some(source_attribute.into());
            *through_target_attribute = Some(target_attribute.into());
        }
        self
    }

    pub fn target(&self) -> &str {
        match self {
            Relationship::BelongsTo { target, .. }
            | Relationship::HasOne { target, .. }
            | Relationship::HasMany { target, .. }
            | Relationship::HasManyThrough { target, .. } => target,
        }
    }
}
