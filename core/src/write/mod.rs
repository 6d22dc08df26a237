//! Write side: document structure checks and payload construction.

mod payload;
mod structure;

pub use payload::{LinkTarget, RelationshipLink, WriteMode, WritePayload};
pub use structure::validate_structure;
