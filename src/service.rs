//! Request handling facade.

use std::sync::Arc;

use hatchify_core::error::{Errors, HatchifyError, Location};
use hatchify_core::query::{QueryPlan, parse_and_compile};
use hatchify_core::schema::{Registry, Schema};
use hatchify_core::store::{Row, Store};
use hatchify_core::write::{WriteMode, WritePayload};
use serde_json::Value;

use crate::config::HatchifyConfig;
use crate::engine::{Engine, Record};
use crate::route::{Request, Route, resolve};

/// Successful result of a dispatched request, ready for serialisation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rows of one page plus the total number of matching rows
    Found {
        rows: Vec<Row>,
        count: u64,
        plan: QueryPlan,
    },
    FoundOne { row: Row, plan: QueryPlan },
    Created(Record),
    Updated(Record),
    Destroyed,
}

/// Registry plus routing configuration, shared across requests.
#[derive(Debug, Clone)]
pub struct Hatchify {
    registry: Arc<Registry>,
    api_prefix: String,
}

impl Hatchify {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::from_config(registry, &HatchifyConfig::default())
    }

    pub fn from_config(registry: Arc<Registry>, config: &HatchifyConfig) -> Self {
        Self {
            registry,
            api_prefix: config.api_prefix.clone(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn engine(&self) -> Engine<'_> {
        Engine::new(&self.registry)
    }

    pub fn route(&self, request: &Request) -> Option<Route<'_>> {
        resolve(&self.registry, &self.api_prefix, request.method, &request.path)
    }

    /// Runs `request` against `store`.
    ///
    /// `None` means no resource route matched and the request belongs to the
    /// next handler.
    pub async fn dispatch<S: Store>(
        &self,
        store: &S,
        request: &Request,
    ) -> Option<Result<Outcome, Errors>> {
        let route = self.route(request)?;
        Some(self.run(store, route, request).await)
    }

    async fn run<S: Store>(
        &self,
        store: &S,
        route: Route<'_>,
        request: &Request,
    ) -> Result<Outcome, Errors> {
        let engine = self.engine();
        let body = request.body.as_ref().unwrap_or(&Value::Null);

        match route {
            Route::FindAll { schema } => {
                let plan = parse_and_compile(&self.registry, schema, &request.query, None)?;
                let (rows, count) = engine.find_all(store, schema, &plan).await.map_err(one)?;
                Ok(Outcome::Found { rows, count, plan })
            }
            Route::FindOne { schema, id } => {
                let plan = parse_and_compile(&self.registry, schema, &request.query, Some(&id))?;
                let id = parse_path_id(schema, &id)?;
                let row = engine
                    .find_one(store, schema, &id, &plan)
                    .await
                    .map_err(one)?;
                Ok(Outcome::FoundOne { row, plan })
            }
            Route::Create { schema } => {
                let payload =
                    WritePayload::from_document(&self.registry, schema, body, WriteMode::Create)?;
                let record = engine.create(store, schema, &payload).await.map_err(one)?;
                Ok(Outcome::Created(record))
            }
            Route::Update { schema, id } => {
                let id = parse_path_id(schema, &id)?;
                let payload =
                    WritePayload::from_document(&self.registry, schema, body, WriteMode::Update)?;
                let record = engine
                    .update(store, schema, &id, &payload)
                    .await
                    .map_err(one)?;
                Ok(Outcome::Updated(record))
            }
            Route::Destroy { schema, id } => {
                let id = parse_path_id(schema, &id)?;
                engine.destroy(store, schema, &id).await.map_err(one)?;
                Ok(Outcome::Destroyed)
            }
        }
    }
}

fn one(err: HatchifyError) -> Errors {
    vec![err]
}

fn parse_path_id(schema: &Schema, raw: &str) -> Result<Value, Errors> {
    schema.parse_id(raw).map_err(|err| {
        vec![HatchifyError::unexpected_value(
            err.detail().to_string(),
            Location::parameter("id"),
        )]
    })
}
