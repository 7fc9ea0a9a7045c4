#![forbid(unsafe_code)]
//! qjoin-planner: equi-join stages → join graph → cost-based join order.
//!
//! Pipeline (data flows strictly downward):
//! - `graph`: validate the request and build the join graph, adding implicit
//!   edges from the transitive closure of field equalities.
//! - `estimate`: resolve catalog statistics and estimate every edge once
//!   (unique-index exact bound, bounded sampling, or a heuristic).
//! - `enumerate`: bottom-up dynamic programming over connected subsets in the
//!   configured tree shape, keeping the cheapest plan per subset.
//! - `cost`: the cost formulas the enumerator ranks candidates by.
//! - `explain`: winning and rejected plans as JSON or Markdown.
//!
//! `optimize` ties these together and always returns a usable plan unless
//! the request itself is malformed.

pub mod cost;
pub mod dsl;
pub mod enumerate;
pub mod error;
pub mod estimate;
pub mod explain;
pub mod graph;
pub mod optimizer;
pub mod plan;
pub mod request;
pub mod subset;

pub use dsl::yaml::{parse_yaml_request, ConfigOverrides, ParsedRequest};
pub use error::{PlannerError, Result};
pub use explain::{ExplainReport, FallbackReason};
pub use graph::JoinGraph;
pub use optimizer::{default_plan, optimize, Optimized};
pub use plan::{JoinMethod, JoinPlan, PlanTree};
pub use request::{Flatten, JoinRequest, JoinStage, RelationDecl};
