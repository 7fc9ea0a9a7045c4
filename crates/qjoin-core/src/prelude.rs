//! Convenient re-exports for downstream crates.

pub use crate::cancel::CancelToken;
pub use crate::catalog::{Catalog, CatalogSnapshot, InMemoryCatalog, IndexDef};
pub use crate::config::{CostCoefficients, EnumerationConfig, ReorderMode, TreeShape};
pub use crate::error::{Error, Result};
pub use crate::id::{EdgeId, NodeId, PlanId, RequestId};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::store::{NoRows, RelationStore, Table};
pub use crate::types::{Row, Scalar};
