//! Plan validation and compilation.
//!
//! Cross-references a [`RawParams`] tree against the registry and produces a
//! [`QueryPlan`]. Every section is checked independently and all errors are
//! returned together, ordered fields, filter, include, sort, then page.

use serde_json::Value;

use super::grammar::{RawFields, RawFilter, RawPage, RawParams, RawSort};
use super::plan::{IncludeNode, PredicateNode, QueryPlan, Selection, SortKey};
use crate::coerce::coerce_text;
use crate::error::{Errors, HatchifyError, Location, quoted_list};
use crate::schema::{Registry, Schema};

/// Compiles `params` for `schema`.
///
/// `id`, when given, restricts the plan to the row with that primary key.
pub fn compile(
    registry: &Registry,
    schema: &Schema,
    params: &RawParams,
    id: Option<&str>,
) -> Result<QueryPlan, Errors> {
    let mut include_errors = Vec::new();
    let mut include = compile_include(registry, schema, &params.include, &mut include_errors);

    let mut errors = Vec::new();
    let attributes = compile_fields(registry, schema, &params.fields, &mut include, &mut errors);
    let filter = compile_filter(registry, schema, &params.filters, id, &mut errors);
    errors.append(&mut include_errors);
    let sort = compile_sort(registry, schema, &params.sort, &include, &mut errors);
    let (limit, offset) = compile_page(&params.page, &mut errors);

    if !errors.is_empty() {
        crate::hatchify_trace_rejected!("compile", errors.len());
        return Err(errors);
    }

    Ok(QueryPlan {
        attributes,
        filter,
        include,
        sort,
        limit,
        offset,
    })
}

/// Every selectable name, primary key first.
fn attribute_list(schema: &Schema) -> String {
    quoted_list(schema.all_fields())
}

fn relationship_list(schema: &Schema) -> String {
    quoted_list(schema.relationship_names())
}

/// Walks the relationship segments of a dotted path, returning the schema that
/// owns the final segment. The error names the first unresolved relationship.
fn resolve_path<'r>(
    registry: &'r Registry,
    schema: &'r Schema,
    relationships: &[&str],
    parameter: &str,
) -> Result<&'r Schema, HatchifyError> {
    let mut current = schema;
    for segment in relationships {
        let Some(association) = registry
            .associations()
            .get(&current.full_name(), segment)
        else {
            let detail = if current.relationships.is_empty() {
                format!("'{segment}' is not a relationship of '{}'.", current.name)
            } else {
                format!(
                    "'{segment}' is not a relationship of '{}'; expected one of {}.",
                    current.name,
                    relationship_list(current)
                )
            };
            return Err(HatchifyError::relationship_path(
                detail,
                Location::parameter(parameter),
            ));
        };
        current = registry.target(association);
    }
    Ok(current)
}

// =============================================================================
// fields
// =============================================================================

fn compile_fields(
    registry: &Registry,
    schema: &Schema,
    fields: &[RawFields],
    include: &mut [IncludeNode],
    errors: &mut Errors,
) -> Selection {
    let mut root = Selection::All;

    for raw in fields {
        let parameter = format!("fields[{}]", raw.type_name);
        let Some(target) = registry.schema(&raw.type_name) else {
            errors.push(HatchifyError::unexpected_value(
                format!(
                    "URL must have 'fields[x]' where 'x' is one of {}.",
                    quoted_list(registry.schemas().iter().map(|s| s.name.as_str()))
                ),
                Location::parameter(parameter),
            ));
            continue;
        };

        let mut names: Vec<String> = Vec::new();
        let mut valid = true;
        for name in &raw.names {
            if !target.has_field(name) {
                valid = false;
                errors.push(HatchifyError::unexpected_value(
                    format!(
                        "URL must have '{parameter}' as comma separated values containing one or more of {}.",
                        attribute_list(target)
                    ),
                    Location::parameter(parameter.clone()),
                ));
            } else if !names.contains(name) {
                names.push(name.clone());
            }
        }
        if !valid {
            continue;
        }
        if !names.iter().any(|n| *n == target.id_field) {
            names.push(target.id_field.clone());
        }

        let target_name = target.full_name();
        if target_name == schema.full_name() {
            root = Selection::Only(names.clone());
        }
        apply_fields(include, &target_name, &names);
    }

    root
}

fn apply_fields(nodes: &mut [IncludeNode], target: &str, names: &[String]) {
    for node in nodes {
        if node.target == target {
            node.attributes = Selection::Only(names.to_vec());
        }
        apply_fields(&mut node.nested, target, names);
    }
}

// =============================================================================
// filter
// =============================================================================

fn compile_filter(
    registry: &Registry,
    schema: &Schema,
    filters: &[RawFilter],
    id: Option<&str>,
    errors: &mut Errors,
) -> PredicateNode {
    let mut leaves = Vec::new();

    if let Some(raw) = id {
        match schema.parse_id(raw) {
            Ok(value) => leaves.push(PredicateNode::id_eq(schema, value)),
            Err(err) => errors.push(err),
        }
    }

    for filter in filters {
        match compile_condition(registry, schema, filter) {
            Ok(leaf) => leaves.push(leaf),
            Err(err) => errors.push(err),
        }
    }

    PredicateNode::And(leaves)
}

fn compile_condition(
    registry: &Registry,
    schema: &Schema,
    filter: &RawFilter,
) -> Result<PredicateNode, HatchifyError> {
    let parameter = format!("filter[{}]", filter.field);
    let segments: Vec<&str> = filter.field.split('.').collect();
    let (attribute, relationships) = segments
        .split_last()
        .ok_or_else(|| HatchifyError::unexpected_value("Empty filter field.", Location::None))?;

    let owner = resolve_path(registry, schema, relationships, &parameter)?;
    if !owner.has_field(attribute) {
        return Err(HatchifyError::unexpected_value(
            format!(
                "URL must have 'filter[x]' where 'x' is one of {}.",
                attribute_list(owner)
            ),
            Location::parameter(parameter),
        ));
    }

    let operator = filter.operator;
    let coerce = |raw: &str| {
        if operator.is_pattern() {
            Ok(Value::String(raw.to_string()))
        } else {
            coerce_text(owner, attribute, raw)
                .map_err(|detail| HatchifyError::unexpected_value(detail, Location::parameter(parameter.clone())))
        }
    };

    let value = if operator.takes_array() {
        // `$in=a,b` and repeated `$in[]=a&$in[]=b` both list values
        Value::Array(
            filter
                .values
                .iter()
                .flat_map(|v| v.split(','))
                .filter(|v| !v.is_empty())
                .map(coerce)
                .collect::<Result<_, _>>()?,
        )
    } else {
        match filter.values.as_slice() {
            [single] => coerce(single.as_str())?,
            _ => {
                return Err(HatchifyError::unexpected_value(
                    format!(
                        "Operator '{}' on '{}' takes a single value.",
                        operator.as_str(),
                        filter.field
                    ),
                    Location::parameter(parameter),
                ));
            }
        }
    };

    Ok(PredicateNode::leaf(filter.field.clone(), operator, value))
}

// =============================================================================
// include
// =============================================================================

fn compile_include(
    registry: &Registry,
    schema: &Schema,
    paths: &[String],
    errors: &mut Errors,
) -> Vec<IncludeNode> {
    let mut tree: Vec<IncludeNode> = Vec::new();
    if paths.is_empty() {
        return tree;
    }
    if !registry.associations().has_relationships(&schema.full_name()) {
        errors.push(HatchifyError::unexpected_value(
            "URL must not have 'include' as parameter.",
            Location::parameter("include"),
        ));
        return tree;
    }

    'paths: for path in paths {
        let mut nodes = &mut tree;
        let mut current = schema;
        for segment in path.split('.') {
            let Some(association) = registry
                .associations()
                .get(&current.full_name(), segment)
            else {
                let detail = if current.relationships.is_empty() {
                    format!(
                        "URL must have 'include' as valid relationship paths; '{}' has no relationship '{segment}' in '{path}'.",
                        current.name
                    )
                } else {
                    format!(
                        "URL must have 'include' as one or more of {} for '{}'; '{segment}' in '{path}' is unknown.",
                        relationship_list(current),
                        current.name
                    )
                };
                errors.push(HatchifyError::relationship_path(
                    detail,
                    Location::parameter("include"),
                ));
                continue 'paths;
            };
            let target = registry.target(association);

            let idx = match nodes.iter().position(|n| n.relationship == segment) {
                Some(idx) => idx,
                None => {
                    nodes.push(IncludeNode::new(segment, target.full_name()));
                    nodes.len() - 1
                }
            };
            nodes = &mut nodes[idx].nested;
            current = target;
        }
    }

    tree
}

// =============================================================================
// sort
// =============================================================================

fn compile_sort(
    registry: &Registry,
    schema: &Schema,
    sort: &[RawSort],
    include: &[IncludeNode],
    errors: &mut Errors,
) -> Vec<SortKey> {
    let mut keys = Vec::new();
    for raw in sort {
        match compile_sort_key(registry, schema, raw, include) {
            Ok(key) => keys.push(key),
            Err(err) => errors.push(err),
        }
    }
    keys
}

fn compile_sort_key(
    registry: &Registry,
    schema: &Schema,
    raw: &RawSort,
    include: &[IncludeNode],
) -> Result<SortKey, HatchifyError> {
    let segments: Vec<&str> = raw.field.split('.').collect();
    let (attribute, relationships) = segments
        .split_last()
        .ok_or_else(|| HatchifyError::unexpected_value("Empty sort field.", Location::None))?;

    let owner = resolve_path(registry, schema, relationships, "sort")?;
    if !relationships.is_empty() && IncludeNode::find(include, relationships).is_none() {
        return Err(HatchifyError::unexpected_value(
            format!(
                "URL must have 'include' containing '{}' to sort by '{}'.",
                relationships.join("."),
                raw.field
            ),
            Location::parameter("sort"),
        ));
    }
    if !owner.has_field(attribute) {
        return Err(HatchifyError::unexpected_value(
            format!(
                "URL must have 'sort' as comma separated values containing one or more of {}.",
                attribute_list(owner)
            ),
            Location::parameter("sort"),
        ));
    }

    Ok(SortKey {
        path: raw.field.clone(),
        direction: raw.direction,
    })
}

// =============================================================================
// page
// =============================================================================

/// Largest window bound a store can take as a signed 64-bit integer.
const MAX_WINDOW: u64 = i64::MAX as u64;

fn positive(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|n| *n > 0)
}

fn compile_page(page: &RawPage, errors: &mut Errors) -> (Option<u64>, Option<u64>) {
    match (&page.number, &page.size) {
        (None, None) => (None, None),
        (Some(_), None) => {
            errors.push(HatchifyError::unexpected_value(
                "Page number was provided but page size was not provided.",
                Location::parameter("page[size]"),
            ));
            (None, None)
        }
        (None, Some(_)) => {
            errors.push(HatchifyError::unexpected_value(
                "Page size was provided but page number was not provided.",
                Location::parameter("page[number]"),
            ));
            (None, None)
        }
        (Some(number), Some(size)) => {
            let number = positive(number);
            if number.is_none() {
                errors.push(HatchifyError::unexpected_value(
                    "Page number should be a positive integer.",
                    Location::parameter("page[number]"),
                ));
            }
            let size = positive(size);
            if size.is_none() {
                errors.push(HatchifyError::unexpected_value(
                    "Page size should be a positive integer.",
                    Location::parameter("page[size]"),
                ));
            }
            match (number, size) {
                // Windows past the largest representable row select nothing
                (Some(number), Some(size)) => {
                    let offset = (number - 1)
                        .checked_mul(size)
                        .map_or(MAX_WINDOW, |offset| offset.min(MAX_WINDOW));
                    (Some(size.min(MAX_WINDOW)), Some(offset))
                }
                _ => (None, None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::query::grammar::parse;
    use crate::query::plan::{Direction, Operator};
    use crate::schema::{Attribute, Relationship};
    use serde_json::json;

    fn registry() -> Registry {
        Registry::builder()
            .schema(
                Schema::new("User")
                    .attribute(Attribute::string("name").required())
                    .attribute(Attribute::string("email").unique())
                    .relationship("todos", Relationship::has_many("Todo"))
                    .relationship("company", Relationship::belongs_to("Company")),
            )
            .schema(
                Schema::new("Todo")
                    .attribute(Attribute::string("name").required())
                    .attribute(Attribute::datetime("dueDate"))
                    .attribute(Attribute::integer("importance"))
                    .attribute(Attribute::enumeration("status", ["open", "done"]))
                    .relationship("user", Relationship::belongs_to("User"))
                    .relationship("tags", Relationship::has_many_through("Tag")),
            )
            .schema(Schema::new("Tag").attribute(Attribute::string("name")))
            .schema(Schema::new("Company").attribute(Attribute::string("name")))
            .build()
            .unwrap()
    }

    fn run(query: &str) -> Result<QueryPlan, Errors> {
        let registry = registry();
        let schema = registry.schema("Todo").unwrap();
        compile(&registry, schema, &parse(query).unwrap(), None)
    }

    fn run_on(schema: &str, query: &str) -> Result<QueryPlan, Errors> {
        let registry = registry();
        let schema = registry.schema(schema).unwrap();
        compile(&registry, schema, &parse(query).unwrap(), None)
    }

    #[test]
    fn fields_and_page_compile_to_window() {
        let plan = run("fields[Todo]=name,dueDate&page[number]=2&page[size]=5").unwrap();

        assert_eq!(
            plan.attributes,
            Selection::Only(vec!["name".into(), "dueDate".into(), "id".into()])
        );
        assert_eq!(plan.limit, Some(5));
        assert_eq!(plan.offset, Some(5));
    }

    #[test]
    fn empty_query_selects_everything() {
        let plan = run("").unwrap();
        assert_eq!(plan, QueryPlan::default());
    }

    #[test]
    fn unknown_field_lists_attributes_in_order() {
        let errors = run("fields[Todo]=name,bogus").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::UnexpectedValue);
        assert_eq!(
            errors[0].detail(),
            "URL must have 'fields[Todo]' as comma separated values containing one or more of 'id', 'name', 'dueDate', 'importance', 'status'."
        );
        assert_eq!(errors[0].location(), &Location::parameter("fields[Todo]"));
    }

    #[test]
    fn fields_apply_to_included_types() {
        let plan = run("include=user&fields[User]=name&fields[Tag]=name").unwrap();

        assert_eq!(plan.attributes, Selection::All);
        assert_eq!(
            plan.include[0].attributes,
            Selection::Only(vec!["name".into(), "id".into()])
        );
        assert!(run("fields[Nope]=name").is_err());
    }

    #[test]
    fn filters_are_coerced_and_anded() {
        let plan = run(
            "filter[importance][$gte]=3&filter[status][$in]=open&filter[user.name][$ilike]=%25ann%25",
        )
        .unwrap();

        assert_eq!(
            plan.filter,
            PredicateNode::And(vec![
                PredicateNode::leaf("importance", Operator::Gte, 3),
                PredicateNode::leaf("status", Operator::In, json!(["open"])),
                PredicateNode::leaf("user.name", Operator::ILike, "%ann%"),
            ])
        );
    }

    #[test]
    fn unknown_filter_field_and_relationship_are_distinct() {
        let errors = run("filter[bogus]=1&filter[owner.name]=x").unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind(), ErrorKind::UnexpectedValue);
        assert_eq!(
            errors[0].detail(),
            "URL must have 'filter[x]' where 'x' is one of 'id', 'name', 'dueDate', 'importance', 'status'."
        );
        assert_eq!(errors[1].kind(), ErrorKind::RelationshipPath);
        assert_eq!(errors[1].location(), &Location::parameter("filter[owner.name]"));
    }

    #[test]
    fn filter_values_must_match_type() {
        let errors = run("filter[importance]=high&filter[status]=later&filter[name]=a&filter[name]=b")
            .unwrap_err();

        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.kind() == ErrorKind::UnexpectedValue));
    }

    #[test]
    fn id_override_is_prepended() {
        let registry = registry();
        let schema = registry.schema("Todo").unwrap();
        let id = "6b0c1a3e-5b7f-4a55-9d3c-0d6b5a1f2e3d";
        let plan = compile(&registry, schema, &parse("filter[name]=x").unwrap(), Some(id)).unwrap();

        assert_eq!(
            plan.filter,
            PredicateNode::And(vec![
                PredicateNode::leaf("id", Operator::Eq, id),
                PredicateNode::leaf("name", Operator::Eq, "x"),
            ])
        );
        assert!(compile(&registry, schema, &RawParams::default(), Some("7")).is_err());
    }

    #[test]
    fn include_builds_nested_tree() {
        let plan = run_on("User", "include=company,todos.tags,todos.user").unwrap();

        assert_eq!(plan.include.len(), 2);
        assert_eq!(plan.include[0].relationship, "company");
        let todos = &plan.include[1];
        assert_eq!(todos.target, "Todo");
        assert_eq!(
            todos
                .nested
                .iter()
                .map(|n| n.relationship.as_str())
                .collect::<Vec<_>>(),
            vec!["tags", "user"]
        );
    }

    #[test]
    fn unknown_include_segment_is_relationship_path() {
        let errors = run_on("User", "include=todos.owner,bogus").unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind() == ErrorKind::RelationshipPath));
    }

    #[test]
    fn include_on_schema_without_relationships() {
        let errors = run_on("Tag", "include=anything").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::UnexpectedValue);
        assert_eq!(errors[0].detail(), "URL must not have 'include' as parameter.");
    }

    #[test]
    fn sort_by_relationship_requires_include() {
        let plan = run("include=user&sort=-user.name,name").unwrap();
        assert_eq!(
            plan.sort,
            vec![
                SortKey {
                    path: "user.name".into(),
                    direction: Direction::Desc
                },
                SortKey {
                    path: "name".into(),
                    direction: Direction::Asc
                },
            ]
        );

        let errors = run("sort=user.name").unwrap_err();
        assert_eq!(
            errors[0].detail(),
            "URL must have 'include' containing 'user' to sort by 'user.name'."
        );

        let errors = run("sort=bogus,owner.name").unwrap_err();
        assert_eq!(errors[0].kind(), ErrorKind::UnexpectedValue);
        assert_eq!(errors[1].kind(), ErrorKind::RelationshipPath);
    }

    #[test]
    fn page_pair_must_be_complete() {
        let errors = run("page[number]=1").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location(), &Location::parameter("page[size]"));

        let errors = run("page[size]=1").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location(), &Location::parameter("page[number]"));
    }

    #[test]
    fn page_values_must_be_positive() {
        let errors = run("page[number]=0&page[size]=abc").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].detail(), "Page number should be a positive integer.");
        assert_eq!(errors[1].detail(), "Page size should be a positive integer.");

        assert!(run("page[number]=-1&page[size]=5").is_err());
        assert!(run("page[number]=1.5&page[size]=5").is_err());
    }

    #[test]
    fn oversized_pages_clamp_to_signed_range() {
        let plan = run("page[number]=3000000000&page[size]=10000000000").unwrap();
        assert_eq!(plan.limit, Some(10_000_000_000));
        assert_eq!(plan.offset, Some(i64::MAX as u64));

        let plan = run("page[number]=1&page[size]=10000000000000000000").unwrap();
        assert_eq!(plan.limit, Some(i64::MAX as u64));
        assert_eq!(plan.offset, Some(0));
    }

    #[test]
    fn errors_come_in_section_order() {
        let errors = run("page[number]=1&sort=bogus&include=owner&filter[bogus]=1&fields[Todo]=bogus")
            .unwrap_err();

        let params: Vec<_> = errors
            .iter()
            .map(|e| match e.location() {
                Location::Parameter(p) => p.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(
            params,
            vec!["fields[Todo]", "filter[bogus]", "include", "sort", "page[size]"]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let query = "include=user,tags&filter[name]=a&sort=-importance&fields[Todo]=name";
        assert_eq!(run(query).unwrap(), run(query).unwrap());
    }
}
