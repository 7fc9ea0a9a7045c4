//! Cardinality estimation.
//!
//! Base cardinalities and index metadata are resolved once per request from
//! the catalog snapshot. Every edge then gets one [`EdgeEstimate`], computed
//! eagerly before enumeration:
//!
//! - **exact**: a single-field unique index covers one endpoint, so each row
//!   of the other side matches at most one row (`|L|·|R| / |unique side|`);
//! - **sampled**: up to `sampling_size` rows drawn from each side and matched
//!   on the join key;
//! - **heuristic**: `1 / max(|L|, |R|)`, when sampling is impossible or found
//!   no match;
//! - **empty**: one side has no rows, so the join has none either.
//!
//! Subset cardinalities are canonical: they depend only on the subset, never
//! on the enumeration path that reached it.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use qjoin_core::cancel::CancelToken;
use qjoin_core::catalog::{Catalog, IndexDef};
use qjoin_core::config::EnumerationConfig;
use qjoin_core::hash::derive_seed;
use qjoin_core::id::{EdgeId, NodeId};
use qjoin_core::store::RelationStore;
use qjoin_core::types::Scalar;

use crate::error::{PlannerError, Result};
use crate::graph::{JoinEdge, JoinGraph};
use crate::request::Flatten;
use crate::subset::RelSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardinalitySource {
    Catalog,
    Hint,
    Default,
}

/// Catalog facts about one relation, fixed for the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationInfo {
    pub base_cardinality: u64,
    pub source: CardinalitySource,
    pub indexes: Vec<IndexDef>,
}

impl RelationInfo {
    /// An index usable for point lookups on `field`.
    pub fn has_lookup_index(&self, field: &str) -> bool {
        self.indexes.iter().any(|i| i.leads_with(field))
    }

    pub fn is_unique_on(&self, field: &str) -> bool {
        self.indexes.iter().any(|i| i.guarantees_unique(field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EstimateMethod {
    Exact,
    Sampled,
    Heuristic,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleCounts {
    pub probe_rows: usize,
    pub foreign_rows: usize,
    pub matches: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeEstimate {
    pub edge: EdgeId,
    pub method: EstimateMethod,
    /// Fraction of the cross product expected to survive the predicate.
    pub selectivity: f64,
    /// Relation whose unique index made the estimate exact.
    pub unique_side: Option<NodeId>,
    pub sample: Option<SampleCounts>,
}

pub struct CardinalityEstimator<'g> {
    graph: &'g JoinGraph,
    relations: Vec<RelationInfo>,
    edges: Vec<EdgeEstimate>,
    memo: HashMap<RelSet, f64>,
}

impl<'g> CardinalityEstimator<'g> {
    /// Resolve catalog data and estimate every edge of `graph`.
    ///
    /// Fails only with [`PlannerError::Cancelled`] when `cancel` trips between
    /// two edges.
    pub fn new(
        graph: &'g JoinGraph,
        catalog: &dyn Catalog,
        store: &dyn RelationStore,
        cfg: &EnumerationConfig,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let relations = resolve_relations(graph, catalog, cfg);
        let mut estimator = Self {
            graph,
            relations,
            edges: Vec::with_capacity(graph.edges().len()),
            memo: HashMap::new(),
        };
        for edge in graph.edges() {
            if cancel.is_cancelled() {
                return Err(PlannerError::Cancelled { levels_completed: 0 });
            }
            let estimate = estimator.estimate_edge(edge, store, cfg);
            tracing::debug!(
                edge = %graph.describe_edge(edge),
                method = ?estimate.method,
                selectivity = estimate.selectivity,
                "estimated edge"
            );
            estimator.edges.push(estimate);
        }
        Ok(estimator)
    }

    pub fn graph(&self) -> &'g JoinGraph {
        self.graph
    }

    pub fn relation(&self, node: NodeId) -> &RelationInfo {
        &self.relations[node.index()]
    }

    pub fn base_cardinality(&self, node: NodeId) -> f64 {
        self.relations[node.index()].base_cardinality as f64
    }

    pub fn edge_estimate(&self, edge: EdgeId) -> &EdgeEstimate {
        &self.edges[edge.index()]
    }

    pub fn edge_estimates(&self) -> &[EdgeEstimate] {
        &self.edges
    }

    /// Relations whose cardinality did not come from the catalog.
    pub fn degraded_relations(&self) -> Vec<String> {
        self.graph
            .nodes()
            .iter()
            .zip(&self.relations)
            .filter(|(_, info)| info.source != CardinalitySource::Catalog)
            .map(|(node, _)| node.name.clone())
            .collect()
    }

    /// Output cardinality of joining inputs of `left` and `right` rows over `edge`.
    pub fn join_cardinality(&self, edge: EdgeId, left: f64, right: f64) -> f64 {
        let est = &self.edges[edge.index()];
        match est.method {
            EstimateMethod::Empty => 0.0,
            EstimateMethod::Exact => match est.unique_side {
                Some(unique) => {
                    let base = self.base_cardinality(unique);
                    if base == 0.0 {
                        0.0
                    } else {
                        left * right / base
                    }
                }
                None => left * right * est.selectivity,
            },
            EstimateMethod::Sampled | EstimateMethod::Heuristic => left * right * est.selectivity,
        }
    }

    /// Estimated rows produced by joining all of `set`.
    ///
    /// Peels off the highest-index relation whose removal leaves the rest
    /// connected, and joins it back over the lowest-id edge to the rest.
    pub fn subset_cardinality(&mut self, set: RelSet) -> f64 {
        if let Some(c) = self.memo.get(&set) {
            return *c;
        }
        let card = if set.len() <= 1 {
            set.lowest().map(|n| self.base_cardinality(n)).unwrap_or(0.0)
        } else {
            let members: Vec<NodeId> = set.iter().collect();
            let peeled = members
                .iter()
                .rev()
                .copied()
                .find(|r| self.graph.is_connected(set.without(*r)));
            match peeled {
                Some(r) => {
                    let rest = set.without(r);
                    let rest_card = self.subset_cardinality(rest);
                    match self.graph.connecting_edge(rest, RelSet::single(r)) {
                        Some(edge) => {
                            let id = edge.id;
                            self.join_cardinality(id, rest_card, self.base_cardinality(r))
                        }
                        None => rest_card * self.base_cardinality(r),
                    }
                }
                // Only reachable for disconnected sets, which are never enumerated.
                None => members.iter().map(|n| self.base_cardinality(*n)).product(),
            }
        };
        self.memo.insert(set, card);
        card
    }

    fn estimate_edge(&self, edge: &JoinEdge, store: &dyn RelationStore, cfg: &EnumerationConfig) -> EdgeEstimate {
        let probe = self.relation(edge.left.node);
        let foreign = self.relation(edge.right.node);
        let (bp, bf) = (probe.base_cardinality, foreign.base_cardinality);

        let make = |method, selectivity, unique_side, sample| EdgeEstimate {
            edge: edge.id,
            method,
            selectivity,
            unique_side,
            sample,
        };

        if bp == 0 || bf == 0 {
            return make(EstimateMethod::Empty, 0.0, None, None);
        }

        if cfg.use_index_uniqueness {
            let unique_side = if foreign.is_unique_on(&edge.right.field) {
                Some(edge.right.node)
            } else if probe.is_unique_on(&edge.left.field) {
                Some(edge.left.node)
            } else {
                None
            };
            if let Some(side) = unique_side {
                let base = self.base_cardinality(side);
                return make(EstimateMethod::Exact, 1.0 / base, Some(side), None);
            }
        }

        let heuristic = 1.0 / bp.max(bf) as f64;
        let label = self.graph.describe_edge(edge);
        let mut rng = StdRng::seed_from_u64(derive_seed(cfg.sampling_base_seed(), &label));

        let probe_keys = sample_keys(store, &self.graph.node(edge.left.node).name, &edge.left.field, cfg.sampling_size, &mut rng);
        let foreign_keys = sample_keys(store, &self.graph.node(edge.right.node).name, &edge.right.field, cfg.sampling_size, &mut rng);
        let (probe_keys, foreign_keys) = match (probe_keys, foreign_keys) {
            (Some(p), Some(f)) => (p, f),
            _ => return make(EstimateMethod::Heuristic, heuristic, None, None),
        };

        let matches = count_matches(&probe_keys, &foreign_keys);
        let sample = SampleCounts {
            probe_rows: probe_keys.len(),
            foreign_rows: foreign_keys.len(),
            matches,
        };
        if matches == 0 {
            return make(EstimateMethod::Heuristic, heuristic, None, Some(sample));
        }

        let mut selectivity = matches as f64 / (probe_keys.len() as f64 * foreign_keys.len() as f64);
        if edge.flatten == Flatten::OneToOne {
            selectivity = selectivity.min(1.0 / bf as f64);
        }
        make(EstimateMethod::Sampled, selectivity, None, Some(sample))
    }
}

fn resolve_relations(graph: &JoinGraph, catalog: &dyn Catalog, cfg: &EnumerationConfig) -> Vec<RelationInfo> {
    graph
        .nodes()
        .iter()
        .map(|node| {
            let (base_cardinality, source) = match catalog.base_cardinality(&node.name) {
                Ok(n) => (n, CardinalitySource::Catalog),
                Err(err) => {
                    let (n, source) = match node.cardinality_hint {
                        Some(hint) => (hint, CardinalitySource::Hint),
                        None => (cfg.default_cardinality, CardinalitySource::Default),
                    };
                    tracing::warn!(
                        relation = %node.name,
                        error = %err,
                        substituted = n,
                        "catalog cardinality unavailable"
                    );
                    (n, source)
                }
            };
            let indexes = catalog.indexes_for(&node.name).unwrap_or_else(|err| {
                tracing::debug!(relation = %node.name, error = %err, "no index metadata");
                Vec::new()
            });
            RelationInfo {
                base_cardinality,
                source,
                indexes,
            }
        })
        .collect()
}

/// Join-key column of a bounded sample, or `None` when the store cannot supply one.
fn sample_keys(store: &dyn RelationStore, relation: &str, field: &str, n: usize, rng: &mut StdRng) -> Option<Vec<Scalar>> {
    let pos = store.schema(relation)?.index_of(field)?;
    if store.row_count(relation)? == 0 {
        return None;
    }
    match store.sample(relation, n, rng) {
        Ok(rows) if !rows.is_empty() => Some(
            rows.into_iter()
                .map(|mut row| {
                    if pos < row.len() {
                        row.swap_remove(pos)
                    } else {
                        Scalar::Null
                    }
                })
                .collect(),
        ),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(relation, error = %err, "sampling unavailable");
            None
        }
    }
}

/// Matching key pairs between two samples. Nulls never match.
fn count_matches(probe: &[Scalar], foreign: &[Scalar]) -> u64 {
    let mut counts: HashMap<&Scalar, u64> = HashMap::new();
    for key in foreign.iter().filter(|k| k.is_join_key()) {
        *counts.entry(key).or_insert(0) += 1;
    }
    probe
        .iter()
        .filter(|k| k.is_join_key())
        .map(|k| counts.get(k).copied().unwrap_or(0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{JoinRequest, JoinStage, RelationDecl};
    use qjoin_core::catalog::InMemoryCatalog;
    use qjoin_core::store::NoRows;
    use qjoin_io::MemoryStore;

    fn two_way(one_to_one: bool) -> JoinRequest {
        let stage = JoinStage::new("big", "b", "small", "b");
        JoinRequest::new()
            .relation(RelationDecl::new("big", &["b"]))
            .relation(RelationDecl::new("small", &["b"]))
            .stage(if one_to_one { stage.one_to_one() } else { stage })
    }

    fn store_1000_100() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_rows("big", &["b"], (0..1000).map(|i| vec![i % 100]).collect())
            .unwrap();
        store
            .insert_rows("small", &["b"], (0..100).map(|i| vec![i]).collect())
            .unwrap();
        store
    }

    fn seeded() -> EnumerationConfig {
        EnumerationConfig {
            sampling_seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn unique_index_gives_exact_estimate() {
        let store = store_1000_100();
        store.create_index("small", IndexDef::new(&["b"], true)).unwrap();
        let catalog = store.snapshot().unwrap();
        let graph = JoinGraph::build(&two_way(true)).unwrap();
        let mut est =
            CardinalityEstimator::new(&graph, &catalog, &store, &seeded(), &CancelToken::new()).unwrap();
        let e = &est.edge_estimates()[0];
        assert_eq!(e.method, EstimateMethod::Exact);
        assert_eq!(e.unique_side, Some(NodeId::new(1)));
        assert_eq!(est.subset_cardinality(graph.all()), 1000.0);
    }

    #[test]
    fn compound_unique_index_falls_back_to_sampling() {
        let store = store_1000_100();
        let mut catalog = store.snapshot().unwrap();
        catalog.add_index("small", IndexDef::new(&["b", "c"], true));
        let graph = JoinGraph::build(&two_way(false)).unwrap();
        let est = CardinalityEstimator::new(&graph, &catalog, &store, &seeded(), &CancelToken::new()).unwrap();
        assert_eq!(est.edge_estimates()[0].method, EstimateMethod::Sampled);
    }

    #[test]
    fn sampled_estimate_is_reproducible_with_a_seed() {
        let store = store_1000_100();
        let catalog = store.snapshot().unwrap();
        let graph = JoinGraph::build(&two_way(false)).unwrap();
        let cfg = EnumerationConfig {
            sampling_size: 50,
            ..seeded()
        };
        let run = || {
            let mut est =
                CardinalityEstimator::new(&graph, &catalog, &store, &cfg, &CancelToken::new()).unwrap();
            est.subset_cardinality(graph.all())
        };
        assert_eq!(run(), run());
        let est = CardinalityEstimator::new(&graph, &catalog, &store, &cfg, &CancelToken::new()).unwrap();
        let sample = est.edge_estimates()[0].sample.unwrap();
        assert_eq!(sample.probe_rows, 50);
        assert_eq!(sample.foreign_rows, 50);
    }

    #[test]
    fn unseeded_sampling_is_still_reproducible() {
        let store = store_1000_100();
        let catalog = store.snapshot().unwrap();
        let graph = JoinGraph::build(&two_way(false)).unwrap();
        let cfg = EnumerationConfig {
            sampling_size: 16,
            ..Default::default()
        };
        assert_eq!(cfg.sampling_seed, None);
        let selectivity = || {
            CardinalityEstimator::new(&graph, &catalog, &store, &cfg, &CancelToken::new())
                .unwrap()
                .edge_estimates()[0]
                .selectivity
        };
        let first = selectivity();
        for _ in 0..5 {
            assert_eq!(selectivity(), first);
        }
    }

    #[test]
    fn one_to_one_clamps_selectivity() {
        let store = MemoryStore::new();
        // Every key is the same, so the raw sample selectivity is 1.
        store.insert_rows("big", &["b"], vec![vec![7]; 10]).unwrap();
        store.insert_rows("small", &["b"], vec![vec![7]; 4]).unwrap();
        let catalog = store.snapshot().unwrap();
        let cfg = EnumerationConfig {
            use_index_uniqueness: false,
            ..seeded()
        };
        let graph = JoinGraph::build(&two_way(true)).unwrap();
        let est = CardinalityEstimator::new(&graph, &catalog, &store, &cfg, &CancelToken::new()).unwrap();
        assert_eq!(est.edge_estimates()[0].selectivity, 0.25);

        let graph = JoinGraph::build(&two_way(false)).unwrap();
        let est = CardinalityEstimator::new(&graph, &catalog, &store, &cfg, &CancelToken::new()).unwrap();
        assert_eq!(est.edge_estimates()[0].selectivity, 1.0);
    }

    #[test]
    fn nulls_never_match() {
        assert_eq!(count_matches(&[Scalar::Null, Scalar::I64(1)], &[Scalar::Null, Scalar::I64(1), Scalar::I64(1)]), 2);
        assert_eq!(count_matches(&[Scalar::Null], &[Scalar::Null]), 0);
    }

    #[test]
    fn empty_relation_yields_empty_estimate() {
        let mut catalog = InMemoryCatalog::new();
        catalog.add_relation("big", 1000).add_relation("small", 0);
        let graph = JoinGraph::build(&two_way(false)).unwrap();
        let mut est =
            CardinalityEstimator::new(&graph, &catalog, &NoRows, &seeded(), &CancelToken::new()).unwrap();
        assert_eq!(est.edge_estimates()[0].method, EstimateMethod::Empty);
        assert_eq!(est.subset_cardinality(graph.all()), 0.0);
    }

    #[test]
    fn stored_relation_emptied_after_snapshot_uses_heuristic() {
        let store = store_1000_100();
        let catalog = store.snapshot().unwrap();
        store.insert_rows("small", &["b"], Vec::new()).unwrap();
        assert_eq!(store.row_count("small"), Some(0));
        let graph = JoinGraph::build(&two_way(false)).unwrap();
        let est = CardinalityEstimator::new(&graph, &catalog, &store, &seeded(), &CancelToken::new()).unwrap();
        let e = &est.edge_estimates()[0];
        assert_eq!(e.method, EstimateMethod::Heuristic);
        assert_eq!(e.sample, None);
        assert_eq!(e.selectivity, 1.0 / 1000.0);
    }

    #[test]
    fn missing_catalog_uses_hint_then_default() {
        let req = JoinRequest::new()
            .relation(RelationDecl::new("a", &["k"]).with_hint(40))
            .relation(RelationDecl::new("b", &["k"]))
            .stage(JoinStage::new("a", "k", "b", "k"));
        let graph = JoinGraph::build(&req).unwrap();
        let est = CardinalityEstimator::new(
            &graph,
            &InMemoryCatalog::new(),
            &NoRows,
            &seeded(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(est.relation(NodeId::new(0)).source, CardinalitySource::Hint);
        assert_eq!(est.base_cardinality(NodeId::new(0)), 40.0);
        assert_eq!(est.relation(NodeId::new(1)).source, CardinalitySource::Default);
        assert_eq!(est.base_cardinality(NodeId::new(1)), 1000.0);
        assert_eq!(est.edge_estimates()[0].method, EstimateMethod::Heuristic);
        assert_eq!(est.degraded_relations(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn cancelled_before_estimation() {
        let graph = JoinGraph::build(&two_way(false)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let res = CardinalityEstimator::new(&graph, &InMemoryCatalog::new(), &NoRows, &seeded(), &cancel);
        assert!(matches!(res, Err(PlannerError::Cancelled { levels_completed: 0 })));
    }
}
