//! Compiled query plan.

use serde_json::Value;

use crate::schema::Schema;

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
    ILike,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::Nin,
        Operator::Like,
        Operator::ILike,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Operator::ALL.into_iter().find(|op| op.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Like => "$like",
            Operator::ILike => "$ilike",
        }
    }

    /// `$in` and `$nin` take an array value.
    pub fn takes_array(&self) -> bool {
        matches!(self, Operator::In | Operator::Nin)
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Operator::Like | Operator::ILike)
    }
}

/// A single comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Bare attribute or dotted relationship path (`user.name`)
    pub path: String,
    pub operator: Operator,
    /// Scalar, or an array for `$in`/`$nin`
    pub value: Value,
}

/// Predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    Leaf(Condition),
    And(Vec<PredicateNode>),
    Or(Vec<PredicateNode>),
}

impl PredicateNode {
    /// Matches every row.
    pub fn all() -> Self {
        PredicateNode::And(Vec::new())
    }

    pub fn leaf(path: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        PredicateNode::Leaf(Condition {
            path: path.into(),
            operator,
            value: value.into(),
        })
    }

    /// `id = value` on the schema's primary key.
    pub fn id_eq(schema: &Schema, id: Value) -> Self {
        PredicateNode::leaf(schema.id_field.clone(), Operator::Eq, id)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PredicateNode::Leaf(_) => false,
            PredicateNode::And(nodes) | PredicateNode::Or(nodes) => nodes.is_empty(),
        }
    }
}

/// Attribute selection for a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Primary key plus every declared attribute
    All,
    /// Explicit allowlist, always containing the primary key
    Only(Vec<String>),
}

impl Selection {
    /// Resolved attribute names for `schema`.
    pub fn names<'s>(&'s self, schema: &'s Schema) -> Vec<&'s str> {
        match self {
            Selection::All => schema.all_fields(),
            Selection::Only(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// One node of the include tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeNode {
    pub relationship: String,
    /// Full name of the related schema
    pub target: String,
    pub attributes: Selection,
    pub nested: Vec<IncludeNode>,
}

impl IncludeNode {
    pub fn new(relationship: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
            target: target.into(),
            attributes: Selection::All,
            nested: Vec::new(),
        }
    }

    /// Finds the node addressed by a dotted relationship path below `nodes`.
    pub fn find<'n>(nodes: &'n [IncludeNode], path: &[&str]) -> Option<&'n IncludeNode> {
        let (first, rest) = path.split_first()?;
        let node = nodes.iter().find(|n| n.relationship == *first)?;
        if rest.is_empty() {
            Some(node)
        } else {
            IncludeNode::find(&node.nested, rest)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Bare attribute or dotted relationship path
    pub path: String,
    pub direction: Direction,
}

/// Validated, schema-resolved query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub attributes: Selection,
    pub filter: PredicateNode,
    pub include: Vec<IncludeNode>,
    pub sort: Vec<SortKey>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Default for QueryPlan {
    fn default() -> Self {
        Self {
            attributes: Selection::All,
            filter: PredicateNode::all(),
            include: Vec::new(),
            sort: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

impl QueryPlan {
    /// Plan reading a single row, every attribute, by primary key.
    pub fn for_id(schema: &Schema, id: Value) -> Self {
        Self {
            filter: PredicateNode::And(vec![PredicateNode::id_eq(schema, id)]),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_round_trip_through_their_names() {
        for op in Operator::ALL {
            assert_eq!(Operator::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operator::parse("$between"), None);
        assert_eq!(Operator::parse("eq"), None);
    }

    #[test]
    fn find_walks_nested_includes() {
        let mut user = IncludeNode::new("user", "User");
        user.nested.push(IncludeNode::new("company", "Company"));
        let nodes = vec![IncludeNode::new("tags", "Tag"), user];

        assert_eq!(
            IncludeNode::find(&nodes, &["user", "company"]).unwrap().target,
            "Company"
        );
        assert!(IncludeNode::find(&nodes, &["company"]).is_none());
        assert!(IncludeNode::find(&nodes, &[]).is_none());
    }
}
