//! Runtime: evaluate a `PlanTree` bottom-up and summarize the run.
//!
//! Every join applies *all* graph edges crossing its two inputs, not just the
//! edge the plan names, so the result does not depend on join order or
//! method. Rows with a null join key never match.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use qjoin_core::id::NodeId;
use qjoin_core::schema::{Field, Schema};
use qjoin_core::store::{RelationStore, Table};
use qjoin_core::types::{Row, Scalar};

use qjoin_planner::graph::JoinGraph;
use qjoin_planner::plan::{JoinMethod, JoinPlan, PlanTree};
use qjoin_planner::subset::RelSet;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid plan: {0}")]
    Invalid(String),
    #[error("storage: {0}")]
    Storage(#[from] qjoin_core::error::Error),
}

/// What a run produced, tied to the plan that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub plan: String,
    pub plan_fingerprint: String,
    pub rows: usize,
    pub started_ms: u64,
    pub finished_ms: u64,
    #[serde(skip)]
    pub output: Table,
}

impl RunSummary {
    /// Wall-clock time of the run. A clock that stepped backwards reads as zero.
    pub fn duration_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}

/// Intermediate result: concatenated rows plus where each relation's
/// columns start.
struct Batch {
    relations: RelSet,
    layout: Vec<(NodeId, usize, Arc<Table>)>,
    rows: Vec<Row>,
}

impl Batch {
    fn column(&self, graph: &JoinGraph, node: NodeId, field: &str) -> Result<usize, ExecError> {
        let (_, offset, table) = self
            .layout
            .iter()
            .find(|(n, _, _)| *n == node)
            .ok_or_else(|| ExecError::Invalid(format!("{} not in join input", graph.node(node).name)))?;
        let pos = table.schema.index_of(field).ok_or_else(|| {
            ExecError::Invalid(format!(
                "stored relation '{}' has no field '{field}'",
                graph.node(node).name
            ))
        })?;
        Ok(offset + pos)
    }

    fn width(&self) -> usize {
        self.layout.iter().map(|(_, _, t)| t.schema.fields.len()).sum()
    }

    fn schema(&self, graph: &JoinGraph) -> Schema {
        let fields = self
            .layout
            .iter()
            .flat_map(|(n, _, t)| {
                let rel = graph.node(*n).name.clone();
                t.schema.fields.iter().map(move |f| {
                    Field::new(format!("{rel}.{}", f.name), f.data_type, f.nullable)
                })
            })
            .collect();
        Schema::new(fields)
    }
}

pub struct Executor<'s> {
    store: &'s dyn RelationStore,
}

impl<'s> Executor<'s> {
    pub fn new(store: &'s dyn RelationStore) -> Self {
        Self { store }
    }

    pub fn run(&self, graph: &JoinGraph, plan: &JoinPlan) -> Result<RunSummary, ExecError> {
        let started_ms = now_millis();
        let batch = self.eval(graph, &plan.tree)?;
        if batch.relations != graph.all() {
            return Err(ExecError::Invalid(format!(
                "plan covers {} but the graph has {} relations",
                batch.relations,
                graph.len()
            )));
        }
        let output = Table::new(batch.schema(graph), batch.rows);
        tracing::debug!(plan = %plan.tree, rows = output.len(), "executed plan");
        Ok(RunSummary {
            plan: plan.tree.to_string(),
            plan_fingerprint: plan.fingerprint().to_hex(),
            rows: output.len(),
            started_ms,
            finished_ms: now_millis(),
            output,
        })
    }

    fn eval(&self, graph: &JoinGraph, tree: &PlanTree) -> Result<Batch, ExecError> {
        match tree {
            PlanTree::Scan { node, relation } => {
                let table = self.store.scan(relation)?;
                Ok(Batch {
                    relations: RelSet::single(*node),
                    rows: table.rows.clone(),
                    layout: vec![(*node, 0, table)],
                })
            }
            PlanTree::Join {
                method,
                left,
                right,
                ..
            } => {
                let l = self.eval(graph, left)?;
                let r = self.eval(graph, right)?;
                if !l.relations.is_disjoint(r.relations) {
                    return Err(ExecError::Invalid(format!("{tree} joins a relation twice")));
                }
                if *method == JoinMethod::IndexedNestedLoop && r.relations.len() != 1 {
                    return Err(ExecError::Invalid(format!(
                        "{tree}: indexed nested-loop needs a base relation on the right"
                    )));
                }
                let out = join(graph, l, r)?;
                tracing::trace!(join = %tree, rows = out.rows.len(), "joined");
                Ok(out)
            }
        }
    }
}

/// Equi-join on every edge crossing the inputs; left-major output order.
fn join(graph: &JoinGraph, left: Batch, right: Batch) -> Result<Batch, ExecError> {
    let mut keys: Vec<(usize, usize)> = Vec::new();
    for edge in graph.edges_between(left.relations, right.relations) {
        let (l_ep, r_ep) = if left.relations.contains(edge.left.node) {
            (&edge.left, &edge.right)
        } else {
            (&edge.right, &edge.left)
        };
        keys.push((
            left.column(graph, l_ep.node, &l_ep.field)?,
            right.column(graph, r_ep.node, &r_ep.field)?,
        ));
    }
    if keys.is_empty() {
        return Err(ExecError::Invalid(format!(
            "no join predicate between {} and {}",
            left.relations, right.relations
        )));
    }

    let mut built: HashMap<Vec<&Scalar>, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows.iter().enumerate() {
        if let Some(key) = key_of(row, keys.iter().map(|k| k.1)) {
            built.entry(key).or_default().push(i);
        }
    }

    let offset = left.width();
    let mut rows = Vec::new();
    for lrow in &left.rows {
        let Some(key) = key_of(lrow, keys.iter().map(|k| k.0)) else {
            continue;
        };
        if let Some(matches) = built.get(&key) {
            for &i in matches {
                let mut out = Vec::with_capacity(offset + right.rows[i].len());
                out.extend_from_slice(lrow);
                out.extend_from_slice(&right.rows[i]);
                rows.push(out);
            }
        }
    }

    let mut layout = left.layout;
    layout.extend(right.layout.into_iter().map(|(n, o, t)| (n, o + offset, t)));
    Ok(Batch {
        relations: left.relations.union(right.relations),
        layout,
        rows,
    })
}

fn key_of(row: &Row, positions: impl Iterator<Item = usize>) -> Option<Vec<&Scalar>> {
    positions
        .map(|p| row.get(p).filter(|s| s.is_join_key()))
        .collect()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
