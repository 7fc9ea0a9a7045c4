//! Row access used by sampling-based estimation and reference execution.
//!
//! Implementations live in `qjoin-io`. Sampling is the only place the
//! optimizer touches data; it is bounded by `sampling_size` per relation.

use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::Row;

/// A materialized relation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub trait RelationStore: Send + Sync {
    /// Schema of a stored relation, if present.
    fn schema(&self, relation: &str) -> Option<Schema>;

    /// Number of stored rows, or `None` when the relation has no data here.
    fn row_count(&self, relation: &str) -> Option<usize>;

    /// Draw up to `n` rows uniformly without replacement.
    fn sample(&self, relation: &str, n: usize, rng: &mut dyn RngCore) -> Result<Vec<Row>>;

    /// Full relation, for execution.
    fn scan(&self, relation: &str) -> Result<Arc<Table>>;
}

/// A store with no data at all. Estimation falls back to heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRows;

impl RelationStore for NoRows {
    fn schema(&self, _relation: &str) -> Option<Schema> {
        None
    }

    fn row_count(&self, _relation: &str) -> Option<usize> {
        None
    }

    fn sample(&self, relation: &str, _n: usize, _rng: &mut dyn RngCore) -> Result<Vec<Row>> {
        Err(Error::Storage(format!("no rows available for '{relation}'")))
    }

    fn scan(&self, relation: &str) -> Result<Arc<Table>> {
        Err(Error::Storage(format!("no rows available for '{relation}'")))
    }
}
