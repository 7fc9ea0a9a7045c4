//! In-memory relation store.
//!
//! Holds each relation's rows plus its index definitions. Unique indexes are
//! enforced when created and whenever the relation's rows are replaced, so a
//! catalog snapshot never advertises uniqueness the data does not have.
//! Snapshots copy the statistics out; later writes to the store do not affect
//! requests already holding one.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::RngCore;

use qjoin_core::catalog::{CatalogSnapshot, InMemoryCatalog, IndexDef};
use qjoin_core::error::{Error, Result};
use qjoin_core::schema::Schema;
use qjoin_core::store::{RelationStore, Table};
use qjoin_core::types::{Row, Scalar};

#[derive(Debug, Clone)]
struct StoredRelation {
    table: Arc<Table>,
    indexes: Vec<IndexDef>,
}

/// Thread-safe in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    relations: Arc<RwLock<BTreeMap<String, StoredRelation>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredRelation>>> {
        self.relations
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredRelation>>> {
        self.relations
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }

    /// Insert or replace a relation. Existing indexes are kept and re-checked.
    pub fn insert_table(&self, relation: impl Into<String>, table: Table) -> Result<()> {
        let relation = relation.into();
        let width = table.schema.fields.len();
        if let Some(i) = table.rows.iter().position(|row| row.len() != width) {
            return Err(Error::Schema(format!(
                "row {i} of '{relation}' has {} values, schema has {width}",
                table.rows[i].len()
            )));
        }
        let mut guard = self.write()?;
        let indexes = guard
            .get(&relation)
            .map(|r| r.indexes.clone())
            .unwrap_or_default();
        for index in indexes.iter().filter(|i| i.unique) {
            check_unique(&relation, &table, index)?;
        }
        guard.insert(
            relation,
            StoredRelation {
                table: Arc::new(table),
                indexes,
            },
        );
        Ok(())
    }

    /// Convenience for tests: a relation of `Int64` columns.
    pub fn insert_rows(&self, relation: &str, fields: &[&str], rows: Vec<Vec<i64>>) -> Result<()> {
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(Scalar::I64).collect())
            .collect();
        self.insert_table(relation, Table::new(Schema::int64(fields), rows))
    }

    pub fn create_index(&self, relation: &str, index: IndexDef) -> Result<()> {
        let mut guard = self.write()?;
        let stored = guard
            .get_mut(relation)
            .ok_or_else(|| Error::Storage(format!("unknown relation '{relation}'")))?;
        if index.fields.is_empty() {
            return Err(Error::Schema(format!("index on '{relation}' has no fields")));
        }
        for f in &index.fields {
            if !stored.table.schema.contains(f) {
                return Err(Error::Schema(format!(
                    "index field '{f}' not in schema of '{relation}'"
                )));
            }
        }
        if index.unique {
            check_unique(relation, &stored.table, &index)?;
        }
        if !stored.indexes.contains(&index) {
            stored.indexes.push(index);
        }
        Ok(())
    }

    /// Statistics for every stored relation at this instant.
    pub fn snapshot(&self) -> Result<InMemoryCatalog> {
        let guard = self.read()?;
        let mut catalog = InMemoryCatalog::new();
        for (name, stored) in guard.iter() {
            catalog.add_relation(name.clone(), stored.table.len() as u64);
            for index in &stored.indexes {
                catalog.add_index(name, index.clone());
            }
        }
        Ok(catalog)
    }

    pub fn catalog_snapshot(&self) -> Result<CatalogSnapshot> {
        Ok(self.snapshot()?.into_snapshot())
    }
}

fn check_unique(relation: &str, table: &Table, index: &IndexDef) -> Result<()> {
    let positions = index
        .fields
        .iter()
        .map(|f| {
            table.schema.index_of(f).ok_or_else(|| {
                Error::Schema(format!("index field '{f}' not in schema of '{relation}'"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut seen: HashSet<Vec<&Scalar>> = HashSet::with_capacity(table.len());
    for row in &table.rows {
        let key: Vec<&Scalar> = match positions.iter().map(|&p| row.get(p)).collect::<Option<_>>() {
            Some(key) => key,
            None => continue,
        };
        if key.iter().any(|s| !s.is_join_key()) {
            continue;
        }
        if !seen.insert(key.clone()) {
            let rendered: Vec<String> = key.iter().map(|s| s.to_string()).collect();
            return Err(Error::DuplicateKey {
                relation: relation.to_string(),
                field: index.fields.join(","),
                key: rendered.join(","),
            });
        }
    }
    Ok(())
}

impl RelationStore for MemoryStore {
    fn schema(&self, relation: &str) -> Option<Schema> {
        self.read()
            .ok()?
            .get(relation)
            .map(|r| r.table.schema.clone())
    }

    fn row_count(&self, relation: &str) -> Option<usize> {
        self.read().ok()?.get(relation).map(|r| r.table.len())
    }

    fn sample(&self, relation: &str, n: usize, rng: &mut dyn RngCore) -> Result<Vec<Row>> {
        let table = self.scan(relation)?;
        let amount = n.min(table.len());
        let picked = rand::seq::index::sample(rng, table.len(), amount);
        tracing::trace!(relation, requested = n, drawn = amount, "sampled rows");
        Ok(picked.into_iter().map(|i| table.rows[i].clone()).collect())
    }

    fn scan(&self, relation: &str) -> Result<Arc<Table>> {
        self.read()?
            .get(relation)
            .map(|r| Arc::clone(&r.table))
            .ok_or_else(|| Error::Storage(format!("unknown relation '{relation}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qjoin_core::catalog::Catalog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn store_with_keys(keys: &[i64]) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_rows("t", &["b"], keys.iter().map(|k| vec![*k]).collect())
            .unwrap();
        store
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let store = store_with_keys(&[1, 2, 2]);
        let err = store.create_index("t", IndexDef::new(&["b"], true));
        assert!(matches!(err, Err(Error::DuplicateKey { .. })));
        // Non-unique index on the same data is fine.
        store.create_index("t", IndexDef::new(&["b"], false)).unwrap();
    }

    #[test]
    fn replacing_rows_rechecks_unique_indexes() {
        let store = store_with_keys(&[1, 2, 3]);
        store.create_index("t", IndexDef::new(&["b"], true)).unwrap();
        let err = store.insert_rows("t", &["b"], vec![vec![5], vec![5]]);
        assert!(matches!(err, Err(Error::DuplicateKey { .. })));
        assert_eq!(store.row_count("t"), Some(3));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let store = MemoryStore::new();
        let err = store.insert_rows("t", &["a", "b"], vec![vec![1, 2], vec![3]]);
        assert!(matches!(err, Err(Error::Schema(_))));
        assert_eq!(store.row_count("t"), None);

        store.insert_rows("t", &["a", "b"], vec![vec![1, 2], vec![3, 4]]).unwrap();
        store.create_index("t", IndexDef::new(&["b"], true)).unwrap();
        let err = store.insert_rows("t", &["a", "b"], vec![vec![5, 6], vec![7]]);
        assert!(matches!(err, Err(Error::Schema(_))));
        assert_eq!(store.row_count("t"), Some(2));
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let store = store_with_keys(&[1, 2, 3]);
        let snap = store.catalog_snapshot().unwrap();
        store.insert_rows("t", &["b"], vec![vec![1]]).unwrap();
        assert_eq!(snap.base_cardinality("t").unwrap(), 3);
        assert_eq!(
            store.catalog_snapshot().unwrap().base_cardinality("t").unwrap(),
            1
        );
    }

    #[test]
    fn sample_is_bounded_and_seeded() {
        let store = store_with_keys(&(0..50).collect::<Vec<_>>());
        let mut a = StdRng::seed_from_u64(3);
        let mut b = StdRng::seed_from_u64(3);
        let s1 = store.sample("t", 10, &mut a).unwrap();
        let s2 = store.sample("t", 10, &mut b).unwrap();
        assert_eq!(s1.len(), 10);
        assert_eq!(s1, s2);
        let all = store.sample("t", 500, &mut a).unwrap();
        assert_eq!(all.len(), 50);
    }
}
