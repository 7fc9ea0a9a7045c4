//! Join graph construction.
//!
//! Nodes are relations in declaration order (a node's id is its bit in a
//! [`RelSet`]). Edges are equi-join predicates: one per explicit stage, plus
//! implicit edges from the transitive closure of field equalities.
//! Explicit edges are numbered first, in stage order, then implicit edges in
//! ascending endpoint order, so "lowest edge id" is a stable tie-break.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use qjoin_core::id::{EdgeId, NodeId};

use crate::error::{PlannerError, Result};
use crate::request::{Flatten, JoinRequest};
use crate::subset::{RelSet, MAX_RELATIONS};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: NodeId,
    pub field: String,
}

impl Endpoint {
    fn new(node: NodeId, field: &str) -> Self {
        Self {
            node,
            field: field.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinEdge {
    pub id: EdgeId,
    /// Probe side of the originating stage.
    pub left: Endpoint,
    /// Foreign side of the originating stage.
    pub right: Endpoint,
    pub implicit: bool,
    /// Index into `JoinRequest::stages`, for explicit edges.
    pub stage: Option<usize>,
    pub flatten: Flatten,
}

impl JoinEdge {
    /// The endpoint on `node`'s side, if the edge touches it.
    pub fn endpoint_on(&self, node: NodeId) -> Option<&Endpoint> {
        if self.left.node == node {
            Some(&self.left)
        } else if self.right.node == node {
            Some(&self.right)
        } else {
            None
        }
    }

    /// Whether the edge crosses between two disjoint subsets.
    pub fn crosses(&self, a: RelSet, b: RelSet) -> bool {
        (a.contains(self.left.node) && b.contains(self.right.node))
            || (b.contains(self.left.node) && a.contains(self.right.node))
    }

    fn key(&self) -> (Endpoint, Endpoint) {
        pair_key(&self.left, &self.right)
    }
}

fn pair_key(a: &Endpoint, b: &Endpoint) -> (Endpoint, Endpoint) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationNode {
    pub id: NodeId,
    pub name: String,
    pub fields: Vec<String>,
    pub cardinality_hint: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGraph {
    nodes: Vec<RelationNode>,
    edges: Vec<JoinEdge>,
    /// Per-node neighbour masks.
    adjacency: Vec<u64>,
    /// Node ids in order of first appearance across the stages.
    stage_order: Vec<NodeId>,
}

impl JoinGraph {
    /// Validate a request and build its graph.
    pub fn build(request: &JoinRequest) -> Result<Self> {
        if request.relations.is_empty() {
            return Err(PlannerError::malformed("request declares no relations"));
        }
        if request.relations.len() > MAX_RELATIONS {
            return Err(PlannerError::malformed(format!(
                "{} relations declared; at most {MAX_RELATIONS} are supported",
                request.relations.len()
            )));
        }

        let mut by_name: HashMap<&str, NodeId> = HashMap::new();
        let mut nodes = Vec::with_capacity(request.relations.len());
        for (i, decl) in request.relations.iter().enumerate() {
            let id = NodeId::new(i as u32);
            if by_name.insert(decl.name.as_str(), id).is_some() {
                return Err(PlannerError::malformed(format!(
                    "relation '{}' declared more than once",
                    decl.name
                )));
            }
            nodes.push(RelationNode {
                id,
                name: decl.name.clone(),
                fields: decl.fields.clone(),
                cardinality_hint: decl.cardinality_hint,
            });
        }

        let resolve = |relation: &str, field: &str, stage: usize| -> Result<Endpoint> {
            let id = *by_name.get(relation).ok_or_else(|| {
                PlannerError::malformed(format!(
                    "stage {stage} references undeclared relation '{relation}'"
                ))
            })?;
            if !nodes[id.index()].fields.iter().any(|f| f == field) {
                return Err(PlannerError::malformed(format!(
                    "stage {stage} references field '{field}' not declared on '{relation}'"
                )));
            }
            Ok(Endpoint::new(id, field))
        };

        let mut edges: Vec<JoinEdge> = Vec::new();
        let mut seen: BTreeSet<(Endpoint, Endpoint)> = BTreeSet::new();
        let mut stage_order: Vec<NodeId> = Vec::new();

        for (i, stage) in request.stages.iter().enumerate() {
            let left = resolve(&stage.left_relation, &stage.left_field, i)?;
            let right = resolve(&stage.right_relation, &stage.right_field, i)?;
            if left.node == right.node {
                return Err(PlannerError::malformed(format!(
                    "stage {i} joins '{}' to itself",
                    stage.left_relation
                )));
            }
            for n in [left.node, right.node] {
                if !stage_order.contains(&n) {
                    stage_order.push(n);
                }
            }
            let edge = JoinEdge {
                id: EdgeId::new(edges.len() as u32),
                left,
                right,
                implicit: false,
                stage: Some(i),
                flatten: stage.flatten,
            };
            if seen.insert(edge.key()) {
                edges.push(edge);
            }
        }

        for (a, b) in implied_pairs(&edges) {
            if seen.insert(pair_key(&a, &b)) {
                edges.push(JoinEdge {
                    id: EdgeId::new(edges.len() as u32),
                    left: a,
                    right: b,
                    implicit: true,
                    stage: None,
                    flatten: Flatten::OneToMany,
                });
            }
        }

        let mut adjacency = vec![0u64; nodes.len()];
        for e in &edges {
            adjacency[e.left.node.index()] |= 1u64 << e.right.node.get();
            adjacency[e.right.node.index()] |= 1u64 << e.left.node.get();
        }

        // Declared but never joined relations still need a slot in the default order.
        for n in &nodes {
            if !stage_order.contains(&n.id) {
                stage_order.push(n.id);
            }
        }

        let graph = Self {
            nodes,
            edges,
            adjacency,
            stage_order,
        };

        if !graph.is_connected(graph.all()) {
            let reachable = graph.component_of(NodeId::new(0));
            let stranded: Vec<&str> = graph
                .all()
                .minus(reachable)
                .iter()
                .map(|n| graph.node(n).name.as_str())
                .collect();
            return Err(PlannerError::malformed(format!(
                "join graph is disconnected; not reachable from '{}': {}",
                graph.nodes[0].name,
                stranded.join(", ")
            )));
        }

        tracing::debug!(
            relations = graph.len(),
            edges = graph.edges.len(),
            implicit = graph.edges.iter().filter(|e| e.implicit).count(),
            "built join graph"
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RelationNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &RelationNode {
        &self.nodes[id.index()]
    }

    pub fn edges(&self) -> &[JoinEdge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> &JoinEdge {
        &self.edges[id.index()]
    }

    pub fn stage_order(&self) -> &[NodeId] {
        &self.stage_order
    }

    pub fn all(&self) -> RelSet {
        RelSet::first_n(self.nodes.len())
    }

    /// Nodes adjacent to `set` but outside it.
    pub fn neighbors(&self, set: RelSet) -> RelSet {
        let mask = set
            .iter()
            .fold(0u64, |acc, n| acc | self.adjacency[n.index()]);
        RelSet::from_mask(mask).minus(set)
    }

    fn component_of(&self, start: NodeId) -> RelSet {
        self.flood(start, self.all())
    }

    fn flood(&self, start: NodeId, within: RelSet) -> RelSet {
        let mut reached = RelSet::single(start);
        loop {
            let next = reached.union(self.neighbors(reached).intersect(within));
            if next == reached {
                return reached;
            }
            reached = next;
        }
    }

    /// True for non-empty sets whose induced subgraph is connected.
    pub fn is_connected(&self, set: RelSet) -> bool {
        match set.lowest() {
            Some(start) => self.flood(start, set) == set,
            None => false,
        }
    }

    /// Edges crossing between `a` and `b`, ascending by id.
    pub fn edges_between(&self, a: RelSet, b: RelSet) -> impl Iterator<Item = &JoinEdge> {
        self.edges.iter().filter(move |e| e.crosses(a, b))
    }

    /// Lowest-id edge crossing between `a` and `b`.
    pub fn connecting_edge(&self, a: RelSet, b: RelSet) -> Option<&JoinEdge> {
        self.edges_between(a, b).next()
    }

    /// `orders.cust = customers.id`
    pub fn describe_edge(&self, edge: &JoinEdge) -> String {
        format!(
            "{}.{} = {}.{}",
            self.node(edge.left.node).name,
            edge.left.field,
            self.node(edge.right.node).name,
            edge.right.field
        )
    }
}

/// Endpoint pairs implied by transitivity, ascending, across distinct relations.
fn implied_pairs(edges: &[JoinEdge]) -> Vec<(Endpoint, Endpoint)> {
    let mut index: BTreeMap<Endpoint, usize> = BTreeMap::new();
    for e in edges {
        for ep in [&e.left, &e.right] {
            let next = index.len();
            index.entry(ep.clone()).or_insert(next);
        }
    }
    let mut parent: Vec<usize> = (0..index.len()).collect();
    for e in edges {
        let (a, b) = (index[&e.left], index[&e.right]);
        union(&mut parent, a, b);
    }

    let mut classes: BTreeMap<usize, Vec<Endpoint>> = BTreeMap::new();
    for (ep, i) in &index {
        let root = find(&mut parent, *i);
        classes.entry(root).or_default().push(ep.clone());
    }

    let mut out = Vec::new();
    for members in classes.values() {
        // BTreeMap iteration keeps each class sorted.
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if a.node != b.node {
                    out.push((a.clone(), b.clone()));
                }
            }
        }
    }
    out.sort();
    out
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}
