//! Bottom-up join enumeration.
//!
//! Level `k` holds the connected subsets of `k + 1` relations. Each level is
//! built from the winners of the level below, so only connected subsets are
//! ever considered and no cross product is ever costed.
//!
//! Levels inside the configured `[min_subset_level, max_subset_level]`
//! window run in ALL-plans mode and keep a bounded list of runner-ups per
//! subset; the remaining levels keep only the winner. Both modes pick the
//! winner from the same candidate set, so the final plan does not depend on
//! the window.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use qjoin_core::cancel::CancelToken;
use qjoin_core::config::{EnumerationConfig, TreeShape};
use qjoin_core::error::Error;
use qjoin_core::id::{EdgeId, NodeId, PlanId};

use crate::cost::CostModel;
use crate::error::{PlannerError, Result};
use crate::estimate::CardinalityEstimator;
use crate::graph::JoinGraph;
use crate::plan::{JoinMethod, PlanArena, PlanNode, PlanShape};
use crate::subset::RelSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerationStats {
    pub subsets_explored: usize,
    pub candidates_generated: usize,
    /// Number of subset levels fully built, level 0 included.
    pub levels_completed: usize,
    /// False when enumeration was cut short and the plan was completed greedily.
    pub complete: bool,
}

/// Winner per subset plus the retained runner-ups.
#[derive(Debug, Default)]
pub struct PlanTable {
    winners: BTreeMap<RelSet, PlanId>,
    rejected: BTreeMap<RelSet, Vec<PlanId>>,
}

impl PlanTable {
    pub fn best(&self, set: RelSet) -> Option<PlanId> {
        self.winners.get(&set).copied()
    }

    pub fn rejected(&self, set: RelSet) -> &[PlanId] {
        self.rejected.get(&set).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn winners(&self) -> impl Iterator<Item = (RelSet, PlanId)> + '_ {
        self.winners.iter().map(|(s, p)| (*s, *p))
    }

    /// Every retained runner-up, ascending by subset.
    pub fn all_rejected(&self) -> impl Iterator<Item = (RelSet, PlanId)> + '_ {
        self.rejected
            .iter()
            .flat_map(|(s, ids)| ids.iter().map(move |p| (*s, *p)))
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }
}

#[derive(Debug)]
pub struct Enumeration {
    pub arena: PlanArena,
    pub table: PlanTable,
    /// Plan covering every relation.
    pub best: PlanId,
    pub stats: EnumerationStats,
}

struct Candidate {
    left: PlanId,
    right: PlanId,
    edge: EdgeId,
    method: JoinMethod,
    order: Vec<NodeId>,
    cost: f64,
}

/// Run the enumeration over every relation of the estimator's graph.
pub fn enumerate(
    estimator: &mut CardinalityEstimator<'_>,
    cfg: &EnumerationConfig,
    cancel: &CancelToken,
) -> Result<Enumeration> {
    let graph = estimator.graph();
    let top = graph.len() - 1;
    if cfg.min_subset_level > top {
        return Err(PlannerError::UnreachablePlan {
            min: cfg.min_subset_level,
            max: cfg.max_subset_level,
            relations: graph.len(),
        });
    }

    let mut e = Enumerator::new(estimator, cfg);
    let mut frontier = e.seed();
    for level in 1..=top {
        if cancel.is_cancelled() {
            tracing::info!(level, "enumeration cancelled at level boundary");
            return e.complete_greedily();
        }
        frontier = e.build_level(level, &frontier)?;
    }
    e.finish()
}

struct Enumerator<'a, 'g> {
    graph: &'g JoinGraph,
    estimator: &'a mut CardinalityEstimator<'g>,
    cfg: &'a EnumerationConfig,
    cost: CostModel,
    arena: PlanArena,
    table: PlanTable,
    stats: EnumerationStats,
}

impl<'a, 'g> Enumerator<'a, 'g> {
    fn new(estimator: &'a mut CardinalityEstimator<'g>, cfg: &'a EnumerationConfig) -> Self {
        Self {
            graph: estimator.graph(),
            estimator,
            cfg,
            cost: CostModel::new(cfg.cost),
            arena: PlanArena::new(),
            table: PlanTable::default(),
            stats: EnumerationStats::default(),
        }
    }

    /// Level 0: one scan per relation.
    fn seed(&mut self) -> Vec<RelSet> {
        let mut frontier = Vec::with_capacity(self.graph.len());
        for node in self.graph.all().iter() {
            let set = RelSet::single(node);
            let card = self.estimator.subset_cardinality(set);
            let id = self.arena.push(PlanNode {
                set,
                shape: PlanShape::Scan(node),
                order: vec![node],
                cardinality: card,
                cost: self.cost.scan(card),
            });
            self.table.winners.insert(set, id);
            frontier.push(set);
        }
        self.stats.subsets_explored += frontier.len();
        self.stats.candidates_generated += frontier.len();
        self.stats.levels_completed = 1;
        frontier
    }

    /// Every connected subset one relation larger than a `frontier` member.
    fn build_level(&mut self, level: usize, frontier: &[RelSet]) -> Result<Vec<RelSet>> {
        let graph = self.graph;
        let sets: BTreeSet<RelSet> = frontier
            .iter()
            .flat_map(|t| graph.neighbors(*t).iter().map(move |r| t.with(r)))
            .collect();
        let all_plans = self.cfg.level_in_window(level);
        for set in &sets {
            self.enumerate_subset(*set, level, all_plans)?;
        }
        tracing::debug!(level, subsets = sets.len(), all_plans, "enumerated level");
        self.stats.levels_completed += 1;
        Ok(sets.into_iter().collect())
    }

    fn finish(mut self) -> Result<Enumeration> {
        let best = self
            .table
            .best(self.graph.all())
            .ok_or_else(|| Error::Invariant("full relation set has no plan".into()))?;
        self.stats.complete = true;
        Ok(Enumeration {
            arena: self.arena,
            table: self.table,
            best,
            stats: self.stats,
        })
    }

    fn enumerate_subset(&mut self, set: RelSet, level: usize, all_plans: bool) -> Result<()> {
        if !self.graph.is_connected(set) {
            return Err(Error::Invariant(format!("enumerated disconnected subset {set}")).into());
        }
        let output = self.estimator.subset_cardinality(set);

        let mut candidates = Vec::new();
        match self.cfg.tree_shape {
            TreeShape::LeftDeep | TreeShape::ZigZag => {
                for r in set.iter() {
                    let rest = set.without(r);
                    let (Some(outer), Some(inner)) =
                        (self.table.best(rest), self.table.best(RelSet::single(r)))
                    else {
                        continue;
                    };
                    self.join_candidates(outer, inner, output, &mut candidates);
                    if self.cfg.tree_shape == TreeShape::ZigZag && rest.len() > 1 {
                        self.join_candidates(inner, outer, output, &mut candidates);
                    }
                }
            }
            TreeShape::Bushy => {
                for left in set.proper_subsets() {
                    let right = set.minus(left);
                    if let (Some(l), Some(r)) = (self.table.best(left), self.table.best(right)) {
                        self.join_candidates(l, r, output, &mut candidates);
                    }
                }
            }
        }

        if candidates.is_empty() {
            return Err(Error::Invariant(format!("connected subset {set} produced no candidate")).into());
        }
        candidates.sort_by(|a, b| self.compare(a, b));
        self.stats.subsets_explored += 1;
        self.stats.candidates_generated += candidates.len();

        let keep = if all_plans {
            1 + self.cfg.max_rejected_per_subset
        } else {
            1
        };
        let mut ids = candidates
            .into_iter()
            .take(keep)
            .map(|c| {
                self.arena.push(PlanNode {
                    set,
                    shape: PlanShape::Join {
                        left: c.left,
                        right: c.right,
                        edge: c.edge,
                        method: c.method,
                    },
                    order: c.order,
                    cardinality: output,
                    cost: c.cost,
                })
            })
            .collect::<Vec<_>>();
        let winner = ids.remove(0);
        tracing::trace!(
            subset = %set,
            level,
            plan = %self.arena.render(winner, self.graph),
            cost = self.arena.get(winner).cost,
            "subset winner"
        );
        self.table.winners.insert(set, winner);
        if !ids.is_empty() {
            self.table.rejected.insert(set, ids);
        }
        Ok(())
    }

    /// Hash join always; indexed nested-loop when `right` is a base relation
    /// with an index leading on a join field.
    fn join_candidates(&self, left: PlanId, right: PlanId, output: f64, out: &mut Vec<Candidate>) {
        let (l, r) = (self.arena.get(left), self.arena.get(right));
        let Some(edge) = self.graph.connecting_edge(l.set, r.set) else {
            return;
        };
        let order: Vec<NodeId> = l.order.iter().chain(&r.order).copied().collect();

        out.push(Candidate {
            left,
            right,
            edge: edge.id,
            method: JoinMethod::Hash,
            order: order.clone(),
            cost: self.cost.hash_join(l, r, output),
        });

        if let PlanShape::Scan(inner) = r.shape {
            let info = self.estimator.relation(inner);
            let lookup = self.graph.edges_between(l.set, r.set).find(|e| {
                e.endpoint_on(inner)
                    .map(|ep| info.has_lookup_index(&ep.field))
                    .unwrap_or(false)
            });
            if let Some(edge) = lookup {
                out.push(Candidate {
                    left,
                    right,
                    edge: edge.id,
                    method: JoinMethod::IndexedNestedLoop,
                    order,
                    cost: self.cost.indexed_nested_loop(l, output),
                });
            }
        }
    }

    /// Cost, then join order, then rendered tree.
    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        a.cost
            .total_cmp(&b.cost)
            .then_with(|| a.order.cmp(&b.order))
            .then_with(|| self.render(a).cmp(&self.render(b)))
    }

    fn render(&self, c: &Candidate) -> String {
        format!(
            "{}({}, {})",
            c.method.tag(),
            self.arena.render(c.left, self.graph),
            self.arena.render(c.right, self.graph)
        )
    }

    /// Extend the cheapest plan of the highest completed level one relation
    /// at a time, always taking the cheapest connected hash join.
    fn complete_greedily(mut self) -> Result<Enumeration> {
        let levels_completed = self.stats.levels_completed;
        let level = levels_completed.saturating_sub(1);
        if level == 0 {
            return Err(PlannerError::Cancelled { levels_completed });
        }

        let start = self
            .table
            .winners()
            .filter(|(s, _)| s.level() == level)
            .min_by(|(sa, a), (sb, b)| {
                self.arena
                    .get(*a)
                    .cost
                    .total_cmp(&self.arena.get(*b).cost)
                    .then_with(|| sa.cmp(sb))
            })
            .map(|(_, id)| id)
            .ok_or_else(|| Error::Invariant(format!("no winners at completed level {level}")))?;

        let all = self.graph.all();
        let mut current = start;
        loop {
            let set = self.arena.get(current).set;
            if set == all {
                break;
            }
            let mut best: Option<(NodeId, Candidate)> = None;
            for r in self.graph.neighbors(set).iter() {
                let output = self.estimator.subset_cardinality(set.with(r));
                let Some(scan) = self.table.best(RelSet::single(r)) else {
                    continue;
                };
                let mut found = Vec::new();
                self.join_candidates(current, scan, output, &mut found);
                for c in found.into_iter().filter(|c| c.method == JoinMethod::Hash) {
                    if best.as_ref().map(|(_, b)| c.cost < b.cost).unwrap_or(true) {
                        best = Some((r, c));
                    }
                }
            }
            let (r, c) =
                best.ok_or_else(|| Error::Invariant(format!("subset {set} cannot be extended")))?;
            let next = set.with(r);
            let output = self.estimator.subset_cardinality(next);
            current = self.arena.push(PlanNode {
                set: next,
                shape: PlanShape::Join {
                    left: c.left,
                    right: c.right,
                    edge: c.edge,
                    method: c.method,
                },
                order: c.order,
                cardinality: output,
                cost: c.cost,
            });
        }

        tracing::info!(
            levels_completed,
            plan = %self.arena.render(current, self.graph),
            "completed plan greedily after cancellation"
        );
        self.stats.complete = false;
        Ok(Enumeration {
            arena: self.arena,
            table: self.table,
            best: current,
            stats: self.stats,
        })
    }
}
