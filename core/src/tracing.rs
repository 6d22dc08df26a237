//! Tracing utilities for query, write and transaction observability.
//!
//! Enable the `tracing` feature to emit spans and events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// hatchify_trace_query!(&sql, params.len());
/// ```
#[macro_export]
macro_rules! hatchify_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(sql = %$sql, params = $param_count, "hatchify.query");
    };
}

/// Emit an info-level tracing event for transaction lifecycle (begin, commit, rollback).
///
/// ```ignore
/// hatchify_trace_tx!("begin", "sqlite.rusqlite");
/// ```
#[macro_export]
macro_rules! hatchify_trace_tx {
    ($event:literal, $driver:literal) => {
        #[cfg(feature = "tracing")]
        ::tracing::info!(event = $event, driver = $driver, "hatchify.transaction");
    };
}

/// Emit a debug-level tracing event when input is rejected by a validation phase.
///
/// ```ignore
/// hatchify_trace_rejected!("compile", errors.len());
/// ```
#[macro_export]
macro_rules! hatchify_trace_rejected {
    ($phase:literal, $error_count:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(phase = $phase, errors = $error_count, "hatchify.rejected");
    };
}
