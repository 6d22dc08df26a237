//! Read side: query-string grammar, plan compilation and the plan types.

mod compile;
mod grammar;
mod plan;

pub use compile::compile;
pub use grammar::{RawFields, RawFilter, RawPage, RawParams, RawSort, parse};
pub use plan::{
    Condition, Direction, IncludeNode, Operator, PredicateNode, QueryPlan, Selection, SortKey,
};

use crate::error::Errors;
use crate::schema::{Registry, Schema};

/// Parses and compiles a raw query string in one step.
///
/// Grammar failures are returned as a single-element list.
pub fn parse_and_compile(
    registry: &Registry,
    schema: &Schema,
    query: &str,
    id: Option<&str>,
) -> Result<QueryPlan, Errors> {
    let params = parse(query).map_err(|err| {
        crate::hatchify_trace_rejected!("parse", 1);
        vec![err]
    })?;
    compile(registry, schema, &params, id)
}
