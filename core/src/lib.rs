pub mod coerce;
pub mod error;
pub mod query;
pub mod schema;
pub mod store;
#[doc(hidden)]
pub mod tracing;
pub mod write;

// Re-export key types and traits
pub use error::{ErrorKind, ErrorObject, ErrorSource, Errors, HatchifyError, Location, to_document};
pub use query::{
    Direction, IncludeNode, Operator, PredicateNode, QueryPlan, RawParams, Selection, SortKey,
    compile, parse, parse_and_compile,
};
pub use schema::{
    Association, AssociationKind, AssociationLookup, Attribute, AttributeType, Cardinality, IdType,
    JoinTable, Registry, RegistryError, Relationship, Schema,
};
pub use store::{Executor, Row, Store, StoreError, Transaction};
pub use write::{LinkTarget, RelationshipLink, WriteMode, WritePayload, validate_structure};
