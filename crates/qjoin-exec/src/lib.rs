#![forbid(unsafe_code)]
//! qjoin-exec: run a chosen join plan against a `RelationStore`.
//!
//! This is a reference executor, used to check that every plan the
//! optimizer can pick returns the same rows. Everything is materialized in
//! memory; there is no spilling and no parallelism.

pub mod runtime;

pub use runtime::{ExecError, Executor, RunSummary};
