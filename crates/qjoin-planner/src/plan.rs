//! Plan candidates.
//!
//! During enumeration candidates live in a [`PlanArena`] and refer to their
//! inputs by `PlanId`; nothing points back up the tree. Once a winner is
//! chosen it is materialized into an owned [`JoinPlan`] for reporting and
//! execution.

use std::fmt;

use serde::{Deserialize, Serialize};

use qjoin_core::hash::{hash_str, Hash256};
use qjoin_core::id::{EdgeId, NodeId, PlanId};

use crate::graph::JoinGraph;
use crate::subset::RelSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinMethod {
    /// Build a hash table on the right input, probe with the left.
    Hash,
    /// Look up each left row through an index on the right base relation.
    IndexedNestedLoop,
}

impl JoinMethod {
    pub fn tag(self) -> &'static str {
        match self {
            JoinMethod::Hash => "HJ",
            JoinMethod::IndexedNestedLoop => "INLJ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanShape {
    Scan(NodeId),
    Join {
        left: PlanId,
        right: PlanId,
        edge: EdgeId,
        method: JoinMethod,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub set: RelSet,
    pub shape: PlanShape,
    /// Relations in the order the tree reads them, left to right.
    pub order: Vec<NodeId>,
    pub cardinality: f64,
    pub cost: f64,
}

#[derive(Debug, Default)]
pub struct PlanArena {
    nodes: Vec<PlanNode>,
}

impl PlanArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: PlanNode) -> PlanId {
        let id = PlanId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: PlanId) -> &PlanNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `HJ(INLJ(orders, customers), items)`
    pub fn render(&self, id: PlanId, graph: &JoinGraph) -> String {
        let node = self.get(id);
        match node.shape {
            PlanShape::Scan(n) => graph.node(n).name.clone(),
            PlanShape::Join {
                left, right, method, ..
            } => format!(
                "{}({}, {})",
                method.tag(),
                self.render(left, graph),
                self.render(right, graph)
            ),
        }
    }

    pub fn to_tree(&self, id: PlanId, graph: &JoinGraph) -> PlanTree {
        let node = self.get(id);
        match node.shape {
            PlanShape::Scan(n) => PlanTree::Scan {
                node: n,
                relation: graph.node(n).name.clone(),
            },
            PlanShape::Join {
                left,
                right,
                edge,
                method,
            } => PlanTree::Join {
                method,
                edge,
                predicate: graph.describe_edge(graph.edge(edge)),
                left: Box::new(self.to_tree(left, graph)),
                right: Box::new(self.to_tree(right, graph)),
            },
        }
    }

    pub fn to_plan(&self, id: PlanId, graph: &JoinGraph) -> JoinPlan {
        let node = self.get(id);
        JoinPlan {
            tree: self.to_tree(id, graph),
            cardinality: Some(node.cardinality),
            cost: Some(node.cost),
        }
    }
}

/// Owned join tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum PlanTree {
    Scan {
        node: NodeId,
        relation: String,
    },
    Join {
        method: JoinMethod,
        edge: EdgeId,
        predicate: String,
        left: Box<PlanTree>,
        right: Box<PlanTree>,
    },
}

impl PlanTree {
    pub fn scan(graph: &JoinGraph, node: NodeId) -> Self {
        PlanTree::Scan {
            node,
            relation: graph.node(node).name.clone(),
        }
    }

    pub fn relations(&self) -> RelSet {
        match self {
            PlanTree::Scan { node, .. } => RelSet::single(*node),
            PlanTree::Join { left, right, .. } => left.relations().union(right.relations()),
        }
    }

    /// Relation names, left to right.
    pub fn join_order(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_order(&mut out);
        out
    }

    fn collect_order(&self, out: &mut Vec<String>) {
        match self {
            PlanTree::Scan { relation, .. } => out.push(relation.clone()),
            PlanTree::Join { left, right, .. } => {
                left.collect_order(out);
                right.collect_order(out);
            }
        }
    }
}

impl fmt::Display for PlanTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanTree::Scan { relation, .. } => f.write_str(relation),
            PlanTree::Join {
                method, left, right, ..
            } => write!(f, "{}({}, {})", method.tag(), left, right),
        }
    }
}

/// A complete plan. Estimates are absent for plans built without
/// cardinality estimation (the non-optimized default plan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPlan {
    pub tree: PlanTree,
    pub cardinality: Option<f64>,
    pub cost: Option<f64>,
}

impl JoinPlan {
    pub fn unestimated(tree: PlanTree) -> Self {
        Self {
            tree,
            cardinality: None,
            cost: None,
        }
    }

    pub fn join_order(&self) -> Vec<String> {
        self.tree.join_order()
    }

    /// Stable identity of the tree shape, methods and relations.
    pub fn fingerprint(&self) -> Hash256 {
        hash_str(&self.tree.to_string())
    }
}
