#![forbid(unsafe_code)]
//! qjoin-core: shared vocabulary for the join-order optimizer.
//!
//! Responsibilities:
//! - Strongly-typed ids, schemas and the lightweight `Scalar`/`Row` values
//!   sampled during cardinality estimation.
//! - `EnumerationConfig`: the single, explicit configuration value threaded
//!   into every optimization request.
//! - The `Catalog` and `RelationStore` interfaces consumed by the planner, plus
//!   an immutable in-memory catalog snapshot.
//! - A cooperative `CancelToken`.
//!
//! **No I/O, no async** here. Concrete stores live in `qjoin-io`.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod store;
pub mod types;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
