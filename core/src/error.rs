//! Typed failures shared by the compiler, the validators and the persistence engine.
//!
//! Every error carries a [`Location`] so it can be rendered as a JSON:API error
//! object without looking anything else up.

use serde::Serialize;
use thiserror::Error;

/// Where in the request an error originated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Location {
    /// A query-string parameter, e.g. `filter[name]` or `page[size]`.
    Parameter(String),
    /// A JSON pointer into the request document, e.g. `/data/attributes/name`.
    Pointer(String),
    #[default]
    None,
}

impl Location {
    pub fn parameter(name: impl Into<String>) -> Self {
        Location::Parameter(name.into())
    }

    pub fn pointer(pointer: impl Into<String>) -> Self {
        Location::Pointer(pointer.into())
    }
}

/// Error kind, independent of the message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValueRequired,
    UnexpectedValue,
    RelationshipPath,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HatchifyError {
    /// A mandatory field or parameter is absent
    #[error("Value required: {detail}")]
    ValueRequired { detail: String, location: Location },

    /// A present value fails a type, shape, enum, range or cardinality check
    #[error("Unexpected value: {detail}")]
    UnexpectedValue { detail: String, location: Location },

    /// An include or relationship name cannot be resolved
    #[error("Relationship path could not be identified: {detail}")]
    RelationshipPath { detail: String, location: Location },

    /// A referenced row does not exist
    #[error("Not found: {detail}")]
    NotFound { detail: String, location: Location },

    /// Uniqueness or overlapping-constraint violation
    #[error("Conflict: {detail}")]
    Conflict { detail: String, location: Location },

    /// Anything else, including unclassified store failures
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl HatchifyError {
    pub fn value_required(detail: impl Into<String>, location: Location) -> Self {
        HatchifyError::ValueRequired {
            detail: detail.into(),
            location,
        }
    }

    pub fn unexpected_value(detail: impl Into<String>, location: Location) -> Self {
        HatchifyError::UnexpectedValue {
            detail: detail.into(),
            location,
        }
    }

    pub fn relationship_path(detail: impl Into<String>, location: Location) -> Self {
        HatchifyError::RelationshipPath {
            detail: detail.into(),
            location,
        }
    }

    pub fn not_found(detail: impl Into<String>, location: Location) -> Self {
        HatchifyError::NotFound {
            detail: detail.into(),
            location,
        }
    }

    pub fn conflict(detail: impl Into<String>, location: Location) -> Self {
        HatchifyError::Conflict {
            detail: detail.into(),
            location,
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        HatchifyError::Internal {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HatchifyError::ValueRequired { .. } => ErrorKind::ValueRequired,
            HatchifyError::UnexpectedValue { .. } => ErrorKind::UnexpectedValue,
            HatchifyError::RelationshipPath { .. } => ErrorKind::RelationshipPath,
            HatchifyError::NotFound { .. } => ErrorKind::NotFound,
            HatchifyError::Conflict { .. } => ErrorKind::Conflict,
            HatchifyError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            HatchifyError::ValueRequired { detail, .. }
            | HatchifyError::UnexpectedValue { detail, .. }
            | HatchifyError::RelationshipPath { detail, .. }
            | HatchifyError::NotFound { detail, .. }
            | HatchifyError::Conflict { detail, .. }
            | HatchifyError::Internal { detail } => detail,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            HatchifyError::ValueRequired { location, .. }
            | HatchifyError::UnexpectedValue { location, .. }
            | HatchifyError::RelationshipPath { location, .. }
            | HatchifyError::NotFound { location, .. }
            | HatchifyError::Conflict { location, .. } => location,
            HatchifyError::Internal { .. } => &Location::None,
        }
    }

    /// HTTP status the error maps to.
    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::ValueRequired | ErrorKind::UnexpectedValue | ErrorKind::RelationshipPath => {
                422
            }
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    pub fn title(&self) -> &'static str {
        match self.kind() {
            ErrorKind::ValueRequired => "Payload is missing a required value.",
            ErrorKind::UnexpectedValue => "Unexpected value.",
            ErrorKind::RelationshipPath => "Relationship path could not be identified.",
            ErrorKind::NotFound => "Resource not found.",
            ErrorKind::Conflict => "Record with the same value already exists.",
            ErrorKind::Internal => "Internal server error.",
        }
    }

    fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::ValueRequired => "value-required",
            ErrorKind::UnexpectedValue => "unexpected-value",
            ErrorKind::RelationshipPath => "relationship-path",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }

    /// Renders the error as a JSON:API error object.
    pub fn to_object(&self) -> ErrorObject {
        let source = match self.location() {
            Location::Parameter(name) => Some(ErrorSource {
                parameter: Some(name.clone()),
                pointer: None,
            }),
            Location::Pointer(pointer) => Some(ErrorSource {
                parameter: None,
                pointer: Some(pointer.clone()),
            }),
            Location::None => None,
        };

        ErrorObject {
            status: self.status(),
            code: self.code(),
            title: self.title(),
            detail: self.detail().to_string(),
            source,
        }
    }
}

/// JSON:API error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    pub status: u16,
    pub code: &'static str,
    pub title: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

/// Ordered, non-empty list of errors returned by accumulating phases.
pub type Errors = Vec<HatchifyError>;

/// Renders an error list as a JSON:API `errors` document.
pub fn to_document(errors: &[HatchifyError]) -> serde_json::Value {
    serde_json::json!({
        "errors": errors.iter().map(HatchifyError::to_object).collect::<Vec<_>>()
    })
}

/// Formats names as `'a', 'b', 'c'` for error details.
pub(crate) fn quoted_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_object_carries_parameter_source() {
        let err = HatchifyError::unexpected_value("bad", Location::parameter("page[size]"));
        let obj = serde_json::to_value(err.to_object()).unwrap();

        assert_eq!(obj["status"], 422);
        assert_eq!(obj["code"], "unexpected-value");
        assert_eq!(obj["source"]["parameter"], "page[size]");
        assert!(obj["source"].get("pointer").is_none());
    }

    #[test]
    fn internal_errors_have_no_source() {
        let err = HatchifyError::internal("boom");
        let obj = serde_json::to_value(err.to_object()).unwrap();

        assert_eq!(obj["status"], 500);
        assert!(obj.get("source").is_none());
    }

    #[test]
    fn document_keeps_error_order() {
        let errors = vec![
            HatchifyError::not_found("a", Location::None),
            HatchifyError::conflict("b", Location::pointer("/data/attributes/email")),
        ];
        let doc = to_document(&errors);

        assert_eq!(doc["errors"][0]["status"], 404);
        assert_eq!(doc["errors"][1]["status"], 409);
        assert_eq!(doc["errors"][1]["source"]["pointer"], "/data/attributes/email");
    }
}
