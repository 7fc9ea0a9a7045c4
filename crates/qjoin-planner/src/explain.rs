//! Explain output: the winning plan, retained runner-ups and per-edge
//! estimates of one optimization request.
//!
//! Building a report only reads the plan table; the serialized shape is
//! camelCase JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use qjoin_core::config::TreeShape;
use qjoin_core::id::RequestId;

use crate::enumerate::{Enumeration, EnumerationStats};
use crate::error::Result;
use crate::estimate::{CardinalityEstimator, EstimateMethod, SampleCounts};
use crate::graph::JoinGraph;
use crate::plan::JoinPlan;

/// Why the winning plan did not come from a full enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackReason {
    /// Join optimization is switched off.
    Disabled,
    /// Nothing to reorder.
    SingleRelation,
    /// The ALL-plans window lies above the top subset level.
    UnreachableWindow,
    /// Cancelled or timed out before enumeration finished.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningPlan {
    pub join_order: Vec<String>,
    pub join_tree: String,
    pub tree_shape: TreeShape,
    pub cardinality_estimate: Option<u64>,
    pub cost: Option<f64>,
    pub join_optimization_used: bool,
    pub fallback_reason: Option<FallbackReason>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedPlan {
    pub join_order: Vec<String>,
    pub join_tree: String,
    /// Subset level (relations − 1) the candidate competed at.
    pub level: usize,
    pub cardinality_estimate: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeEstimateReport {
    pub edge: String,
    pub implicit: bool,
    pub method: EstimateMethod,
    pub selectivity: f64,
    pub unique_side: Option<String>,
    pub sample: Option<SampleCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainReport {
    pub request_id: RequestId,
    pub winning_plan: WinningPlan,
    pub rejected_plans: Vec<RejectedPlan>,
    pub edge_estimates: Vec<EdgeEstimateReport>,
    pub stats: EnumerationStats,
    /// Relations whose cardinality came from a hint or the configured default.
    pub catalog_fallbacks: Vec<String>,
}

fn rounded(cardinality: f64) -> u64 {
    if cardinality.is_finite() && cardinality > 0.0 {
        cardinality.round() as u64
    } else {
        0
    }
}

fn winning(plan: &JoinPlan, shape: TreeShape, used: bool, reason: Option<FallbackReason>) -> WinningPlan {
    WinningPlan {
        join_order: plan.join_order(),
        join_tree: plan.tree.to_string(),
        tree_shape: shape,
        cardinality_estimate: plan.cardinality.map(rounded),
        cost: plan.cost,
        join_optimization_used: used,
        fallback_reason: reason,
        fingerprint: plan.fingerprint().to_hex(),
    }
}

fn edge_reports(graph: &JoinGraph, estimator: &CardinalityEstimator<'_>) -> Vec<EdgeEstimateReport> {
    graph
        .edges()
        .iter()
        .zip(estimator.edge_estimates())
        .map(|(edge, est)| EdgeEstimateReport {
            edge: graph.describe_edge(edge),
            implicit: edge.implicit,
            method: est.method,
            selectivity: est.selectivity,
            unique_side: est.unique_side.map(|n| graph.node(n).name.clone()),
            sample: est.sample,
        })
        .collect()
}

impl ExplainReport {
    /// Report for a plan chosen by enumeration, complete or greedily finished.
    pub fn from_enumeration(
        request_id: RequestId,
        graph: &JoinGraph,
        estimator: &CardinalityEstimator<'_>,
        enumeration: &Enumeration,
        shape: TreeShape,
    ) -> Self {
        let arena = &enumeration.arena;
        let plan = arena.to_plan(enumeration.best, graph);
        let reason = (!enumeration.stats.complete).then_some(FallbackReason::Cancelled);

        let mut rejected: Vec<(usize, f64, Vec<u32>, RejectedPlan)> = enumeration
            .table
            .all_rejected()
            .map(|(set, id)| {
                let node = arena.get(id);
                let order: Vec<u32> = node.order.iter().map(|n| n.get()).collect();
                let tree = arena.render(id, graph);
                (
                    set.level(),
                    node.cost,
                    order,
                    RejectedPlan {
                        join_order: node.order.iter().map(|n| graph.node(*n).name.clone()).collect(),
                        join_tree: tree,
                        level: set.level(),
                        cardinality_estimate: rounded(node.cardinality),
                        cost: node.cost,
                    },
                )
            })
            .collect();
        rejected.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| a.3.join_tree.cmp(&b.3.join_tree))
        });

        Self {
            request_id,
            winning_plan: winning(&plan, shape, true, reason),
            rejected_plans: rejected.into_iter().map(|r| r.3).collect(),
            edge_estimates: edge_reports(graph, estimator),
            stats: enumeration.stats.clone(),
            catalog_fallbacks: estimator.degraded_relations(),
        }
    }

    /// Report for a plan that did not come from enumeration.
    pub fn fallback(
        request_id: RequestId,
        graph: &JoinGraph,
        plan: &JoinPlan,
        shape: TreeShape,
        reason: FallbackReason,
        estimator: Option<&CardinalityEstimator<'_>>,
    ) -> Self {
        Self {
            request_id,
            winning_plan: winning(plan, shape, false, Some(reason)),
            rejected_plans: Vec::new(),
            edge_estimates: estimator.map(|e| edge_reports(graph, e)).unwrap_or_default(),
            stats: EnumerationStats::default(),
            catalog_fallbacks: estimator.map(|e| e.degraded_relations()).unwrap_or_default(),
        }
    }

    /// Keep at most `max` rejected plans.
    pub fn truncate_rejected(&mut self, max: usize) {
        self.rejected_plans.truncate(max);
    }

    /// Pretty JSON with at most `max_rejected` rejected plans.
    pub fn to_json(&self, max_rejected: usize) -> Result<String> {
        let mut report = self.clone();
        report.truncate_rejected(max_rejected);
        Ok(serde_json::to_string_pretty(&report)?)
    }

    /// Markdown summary: the winning plan and the first `max_rejected`
    /// rejected plans.
    pub fn to_markdown(&self, max_rejected: usize) -> String {
        let mut md = String::new();
        // Writing into a String cannot fail.
        match self.write_markdown(&mut md, max_rejected) {
            Ok(()) => md,
            Err(fmt::Error) => String::new(),
        }
    }

    /// Streams the summary rendered by [`ExplainReport::to_markdown`] into `out`.
    pub fn write_markdown(&self, out: &mut impl fmt::Write, max_rejected: usize) -> fmt::Result {
        let w = &self.winning_plan;
        writeln!(out, "### Winning plan")?;
        writeln!(out)?;
        writeln!(out, "- join order: {}", w.join_order.join(", "))?;
        writeln!(out, "- join tree: `{}`", w.join_tree)?;
        writeln!(out, "- tree shape: {}", w.tree_shape)?;
        match w.cardinality_estimate {
            Some(c) => writeln!(out, "- cardinality estimate: {c}")?,
            None => writeln!(out, "- cardinality estimate: n/a")?,
        }
        if let Some(cost) = w.cost {
            writeln!(out, "- cost: {cost:.1}")?;
        }
        writeln!(out, "- join optimization used: {}", w.join_optimization_used)?;
        if let Some(reason) = w.fallback_reason {
            writeln!(out, "- fallback reason: {reason:?}")?;
        }
        writeln!(out)?;

        writeln!(out, "### Rejected plans (total: {})", self.rejected_plans.len())?;
        writeln!(out)?;
        for (i, r) in self.rejected_plans.iter().take(max_rejected).enumerate() {
            writeln!(
                out,
                "{}. `{}` level {}, cardinality {}, cost {:.1}",
                i + 1,
                r.join_tree,
                r.level,
                r.cardinality_estimate,
                r.cost
            )?;
        }
        if self.rejected_plans.len() > max_rejected {
            writeln!(out, "- ... {} more", self.rejected_plans.len() - max_rejected)?;
        }
        Ok(())
    }
}
