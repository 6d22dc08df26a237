#![cfg(feature = "rusqlite")]
#![allow(dead_code)]

use std::sync::Arc;

use hatchify::prelude::*;
use hatchify::sqlite::{SqliteConfig, SqliteStore};
use serde_json::{Value, json};

pub const ALICE: &str = "0b1e8b8e-4f2a-4c3e-9d61-3c2f9a7b1e01";
pub const BOB: &str = "0b1e8b8e-4f2a-4c3e-9d61-3c2f9a7b1e02";
pub const MISSING: &str = "0b1e8b8e-4f2a-4c3e-9d61-3c2f9a7b1eff";

/// User ⟶ hasMany Todo, Todo ⟶ belongsTo User, Todo ⟶ hasManyThrough Tag.
pub fn registry() -> Registry {
    Registry::builder()
        .schema(
            Schema::new("User")
                .attribute(Attribute::string("name").required())
                .attribute(Attribute::string("email").unique())
                .relationship("todos", Relationship::has_many("Todo")),
        )
        .schema(
            Schema::new("Todo")
                .attribute(Attribute::string("name").required().max(40.0))
                .attribute(Attribute::datetime("dueDate"))
                .attribute(Attribute::integer("importance").min(0.0))
                .attribute(
                    Attribute::enumeration("status", ["open", "done"]).default_value("open"),
                )
                .relationship("user", Relationship::belongs_to("User"))
                .relationship("tags", Relationship::has_many_through("Tag")),
        )
        .schema(Schema::new("Tag").attribute(Attribute::string("name").required()))
        .build()
        .expect("fixture registry is valid")
}

pub async fn setup_store() -> (Hatchify, SqliteStore) {
    let registry = Arc::new(registry());
    let store = SqliteStore::open(&SqliteConfig::in_memory(), registry.clone())
        .expect("Failed to create in-memory database");
    store.create_tables().await.expect("Failed to create tables");
    (Hatchify::new(registry), store)
}

/// Creates the fixture store and returns `(app, store)`.
#[macro_export]
macro_rules! setup_store {
    () => {{ $crate::common::setup_store().await }};
}

/// Dispatches a request that must match a route.
#[macro_export]
macro_rules! dispatch {
    ($app:expr, $store:expr, $request:expr) => {{
        $app.dispatch(&$store, &$request)
            .await
            .expect("request should match a resource route")
    }};
}

pub fn user_document(id: &str, name: &str) -> Value {
    json!({
        "data": {
            "type": "User",
            "id": id,
            "attributes": {"name": name, "email": format!("{}@example.com", name.to_lowercase())}
        }
    })
}

pub async fn seed_user(app: &Hatchify, store: &SqliteStore, id: &str, name: &str) {
    let outcome = app
        .dispatch(store, &Request::post("/api/users", user_document(id, name)))
        .await
        .expect("route");
    assert!(matches!(outcome, Ok(Outcome::Created(_))), "{outcome:?}");
}

pub async fn seed_todo(app: &Hatchify, store: &SqliteStore, name: &str, user: Option<&str>) -> Value {
    let mut body = json!({"data": {"type": "Todo", "attributes": {"name": name}}});
    if let Some(user) = user {
        body["data"]["relationships"] = json!({"user": {"data": {"type": "User", "id": user}}});
    }
    match app.dispatch(store, &Request::post("/api/todos", body)).await {
        Some(Ok(Outcome::Created(record))) => record.id,
        other => panic!("seeding todo failed: {other:?}"),
    }
}

pub fn found(outcome: Result<Outcome, Errors>) -> (Vec<hatchify::hatchify_core::Row>, u64) {
    match outcome {
        Ok(Outcome::Found { rows, count, .. }) => (rows, count),
        other => panic!("expected rows, got {other:?}"),
    }
}

pub fn errors(outcome: Result<Outcome, Errors>) -> Errors {
    match outcome {
        Err(errors) => errors,
        Ok(other) => panic!("expected errors, got {other:?}"),
    }
}
