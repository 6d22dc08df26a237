//! Request descriptors and route resolution.

use hatchify_core::schema::{Registry, Schema};
use serde_json::Value;

/// HTTP method of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
    Other,
}

impl Method {
    /// Parses a method name, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            _ => Method::Other,
        }
    }
}

/// Normalised inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: String,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (path, String::new()),
        };
        Self {
            method,
            path,
            query,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Operation a request resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Route<'r> {
    FindAll { schema: &'r Schema },
    FindOne { schema: &'r Schema, id: String },
    Create { schema: &'r Schema },
    Update { schema: &'r Schema, id: String },
    Destroy { schema: &'r Schema, id: String },
}

impl<'r> Route<'r> {
    pub fn schema(&self) -> &'r Schema {
        match self {
            Route::FindAll { schema }
            | Route::FindOne { schema, .. }
            | Route::Create { schema }
            | Route::Update { schema, .. }
            | Route::Destroy { schema, .. } => schema,
        }
    }
}

/// Resolves `{prefix}/{endpoint}` and `{prefix}/{endpoint}/{id}`.
///
/// Returns `None` when the path is outside the prefix, names no registered
/// endpoint, or the method does not apply; the caller hands the request on.
pub fn resolve<'r>(
    registry: &'r Registry,
    prefix: &str,
    method: Method,
    path: &str,
) -> Option<Route<'r>> {
    let rest = path.strip_prefix(prefix.trim_end_matches('/'))?;
    let rest = rest.strip_prefix('/')?.trim_end_matches('/');
    if rest.is_empty() {
        return None;
    }

    if let Some(schema) = registry.by_endpoint(rest) {
        return match method {
            Method::Get => Some(Route::FindAll { schema }),
            Method::Post => Some(Route::Create { schema }),
            _ => None,
        };
    }

    let (endpoint, id) = rest.rsplit_once('/')?;
    let schema = registry.by_endpoint(endpoint)?;
    let id = percent_encoding::percent_decode_str(id)
        .decode_utf8()
        .ok()?
        .into_owned();
    match method {
        Method::Get => Some(Route::FindOne { schema, id }),
        Method::Patch => Some(Route::Update { schema, id }),
        Method::Delete => Some(Route::Destroy { schema, id }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatchify_core::schema::Schema;

    fn registry() -> Registry {
        Registry::builder()
            .schema(Schema::new("Todo"))
            .schema(Schema::new("Person").namespace("Admin").plural("People"))
            .build()
            .unwrap()
    }

    #[test]
    fn resolves_collection_and_member_routes() {
        let registry = registry();

        let route = resolve(&registry, "/api", Method::Get, "/api/todos").unwrap();
        assert!(matches!(route, Route::FindAll { schema } if schema.name == "Todo"));

        let route = resolve(&registry, "/api", Method::Patch, "/api/todos/abc").unwrap();
        assert_eq!(
            route,
            Route::Update {
                schema: registry.schema("Todo").unwrap(),
                id: "abc".into()
            }
        );

        let route = resolve(&registry, "/api", Method::Delete, "/api/admin/people/7").unwrap();
        assert!(matches!(route, Route::Destroy { schema, id } if schema.name == "Person" && id == "7"));
    }

    #[test]
    fn defers_unknown_paths_and_methods() {
        let registry = registry();

        assert!(resolve(&registry, "/api", Method::Get, "/health").is_none());
        assert!(resolve(&registry, "/api", Method::Get, "/api/projects").is_none());
        assert!(resolve(&registry, "/api", Method::Get, "/apitodos").is_none());
        assert!(resolve(&registry, "/api", Method::Patch, "/api/todos").is_none());
        assert!(resolve(&registry, "/api", Method::Post, "/api/todos/abc").is_none());
        assert!(resolve(&registry, "/api", Method::Other, "/api/todos").is_none());
    }

    #[test]
    fn request_splits_query_string() {
        let request = Request::get("/api/todos?include=user&page[size]=2");
        assert_eq!(request.path, "/api/todos");
        assert_eq!(request.query, "include=user&page[size]=2");
        assert_eq!(Method::parse("patch"), Method::Patch);
    }
}
