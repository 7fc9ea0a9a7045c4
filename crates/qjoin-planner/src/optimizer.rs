//! Request entry point.
//!
//! `optimize` never fails because of the optimizer itself: an unreachable
//! enumeration window or a cancellation degrades to *some* valid plan and
//! the report says which. Only malformed input and invalid configuration
//! are surfaced as errors.

use std::time::Duration;

use qjoin_core::cancel::CancelToken;
use qjoin_core::catalog::Catalog;
use qjoin_core::config::EnumerationConfig;
use qjoin_core::error::Error;
use qjoin_core::id::{NodeId, RequestId};
use qjoin_core::store::RelationStore;

use crate::enumerate::enumerate;
use crate::error::{PlannerError, Result};
use crate::estimate::CardinalityEstimator;
use crate::explain::{ExplainReport, FallbackReason};
use crate::graph::JoinGraph;
use crate::plan::{JoinMethod, JoinPlan, PlanTree};
use crate::request::JoinRequest;
use crate::subset::RelSet;

/// Result of one optimization request.
#[derive(Debug, Clone)]
pub struct Optimized {
    pub graph: JoinGraph,
    pub plan: JoinPlan,
    pub report: ExplainReport,
}

pub fn optimize(
    request: &JoinRequest,
    catalog: &dyn Catalog,
    store: &dyn RelationStore,
    cfg: &EnumerationConfig,
    cancel: &CancelToken,
) -> Result<Optimized> {
    cfg.validate()
        .map_err(|e| PlannerError::InvalidConfig(e.to_string()))?;
    let graph = JoinGraph::build(request)?;

    let request_id = RequestId::new();
    let span = tracing::info_span!("optimize", request = %request_id, relations = graph.len());
    let _guard = span.enter();

    if !cfg.enabled {
        return fallback(request_id, graph, cfg, FallbackReason::Disabled);
    }
    if graph.len() == 1 {
        return fallback(request_id, graph, cfg, FallbackReason::SingleRelation);
    }

    let cancel = cancel.limited_to(cfg.timeout_ms.map(Duration::from_millis));
    let (plan, report) = plan_request(request_id, &graph, catalog, store, cfg, &cancel)?;
    Ok(Optimized { graph, plan, report })
}

fn plan_request(
    request_id: RequestId,
    graph: &JoinGraph,
    catalog: &dyn Catalog,
    store: &dyn RelationStore,
    cfg: &EnumerationConfig,
    cancel: &CancelToken,
) -> Result<(JoinPlan, ExplainReport)> {
    let mut estimator = match CardinalityEstimator::new(graph, catalog, store, cfg, cancel) {
        Ok(e) => e,
        Err(PlannerError::Cancelled { .. }) => {
            tracing::info!("cancelled during estimation; using default plan");
            return fallback_parts(request_id, graph, cfg, FallbackReason::Cancelled, None);
        }
        Err(e) => return Err(e),
    };

    match enumerate(&mut estimator, cfg, cancel) {
        Ok(enumeration) => {
            let plan = enumeration.arena.to_plan(enumeration.best, graph);
            let report = ExplainReport::from_enumeration(
                request_id,
                graph,
                &estimator,
                &enumeration,
                cfg.tree_shape,
            );
            tracing::debug!(
                plan = %plan.tree,
                cost = plan.cost,
                subsets = enumeration.stats.subsets_explored,
                "selected plan"
            );
            Ok((plan, report))
        }
        Err(err @ PlannerError::UnreachablePlan { .. }) => {
            tracing::info!(error = %err, "using default plan");
            fallback_parts(request_id, graph, cfg, FallbackReason::UnreachableWindow, Some(&estimator))
        }
        Err(err @ PlannerError::Cancelled { .. }) => {
            tracing::info!(error = %err, "using default plan");
            fallback_parts(request_id, graph, cfg, FallbackReason::Cancelled, Some(&estimator))
        }
        Err(e) => Err(e),
    }
}

fn fallback(
    request_id: RequestId,
    graph: JoinGraph,
    cfg: &EnumerationConfig,
    reason: FallbackReason,
) -> Result<Optimized> {
    let (plan, report) = fallback_parts(request_id, &graph, cfg, reason, None)?;
    Ok(Optimized { graph, plan, report })
}

fn fallback_parts(
    request_id: RequestId,
    graph: &JoinGraph,
    cfg: &EnumerationConfig,
    reason: FallbackReason,
    estimator: Option<&CardinalityEstimator<'_>>,
) -> Result<(JoinPlan, ExplainReport)> {
    let plan = default_plan(graph)?;
    let report = ExplainReport::fallback(request_id, graph, &plan, cfg.tree_shape, reason, estimator);
    Ok((plan, report))
}

/// Pipeline-order plan: a left-deep chain of hash joins over the relations
/// in order of first appearance in the stages. A relation with no edge to
/// the joined prefix yet is deferred until one exists.
pub fn default_plan(graph: &JoinGraph) -> Result<JoinPlan> {
    let mut pending: Vec<NodeId> = graph.stage_order().to_vec();
    if pending.is_empty() {
        return Err(Error::Invariant("join graph has no relations".into()).into());
    }
    let first = pending.remove(0);
    let mut set = RelSet::single(first);
    let mut tree = PlanTree::scan(graph, first);

    while !pending.is_empty() {
        let (pos, edge) = pending
            .iter()
            .enumerate()
            .find_map(|(i, n)| {
                graph
                    .connecting_edge(set, RelSet::single(*n))
                    .map(|e| (i, e))
            })
            .ok_or_else(|| Error::Invariant(format!("no relation connects to {set}")))?;
        let node = pending.remove(pos);
        tree = PlanTree::Join {
            method: JoinMethod::Hash,
            edge: edge.id,
            predicate: graph.describe_edge(edge),
            left: Box::new(tree),
            right: Box::new(PlanTree::scan(graph, node)),
        };
        set = set.with(node);
    }
    Ok(JoinPlan::unestimated(tree))
}
