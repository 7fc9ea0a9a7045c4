//! Catalog interface consumed by the optimizer.
//!
//! The catalog answers two questions per relation: how many rows it has and
//! which indexes exist. It is read-only from the optimizer's point of view;
//! a request holds a [`CatalogSnapshot`] for its whole duration, and a refresh
//! only affects requests started afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One index definition as reported by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new(fields: &[&str], unique: bool) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique,
        }
    }

    /// Unique on exactly `field`. A compound unique index does not make any
    /// single member unique, so it never qualifies.
    pub fn guarantees_unique(&self, field: &str) -> bool {
        self.unique && self.fields.len() == 1 && self.fields[0] == field
    }

    /// Usable for point lookups on `field`.
    pub fn leads_with(&self, field: &str) -> bool {
        self.fields.first().map(|f| f == field).unwrap_or(false)
    }
}

pub trait Catalog: Send + Sync {
    fn indexes_for(&self, relation: &str) -> Result<Vec<IndexDef>>;
    fn base_cardinality(&self, relation: &str) -> Result<u64>;
}

/// Shared, immutable catalog handle for one or more concurrent requests.
pub type CatalogSnapshot = Arc<dyn Catalog>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationStats {
    pub base_cardinality: u64,
    pub indexes: Vec<IndexDef>,
}

/// In-memory catalog for tests and for snapshots taken from a `MemoryStore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    relations: BTreeMap<String, RelationStats>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_relation(&mut self, name: impl Into<String>, base_cardinality: u64) -> &mut Self {
        self.relations
            .entry(name.into())
            .or_default()
            .base_cardinality = base_cardinality;
        self
    }

    pub fn add_index(&mut self, relation: &str, index: IndexDef) -> &mut Self {
        self.relations
            .entry(relation.to_string())
            .or_default()
            .indexes
            .push(index);
        self
    }

    pub fn into_snapshot(self) -> CatalogSnapshot {
        Arc::new(self)
    }
}

impl Catalog for InMemoryCatalog {
    fn indexes_for(&self, relation: &str) -> Result<Vec<IndexDef>> {
        self.relations
            .get(relation)
            .map(|s| s.indexes.clone())
            .ok_or_else(|| Error::catalog_unavailable(relation, "unknown relation"))
    }

    fn base_cardinality(&self, relation: &str) -> Result<u64> {
        self.relations
            .get(relation)
            .map(|s| s.base_cardinality)
            .ok_or_else(|| Error::catalog_unavailable(relation, "unknown relation"))
    }
}
