//! Cost model.
//!
//! Costs are abstract units; `cpu_factor` is the cost of touching one tuple
//! once. Every formula is monotone in the cardinalities it reads.

use qjoin_core::config::CostCoefficients;

use crate::plan::PlanNode;

#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    c: CostCoefficients,
}

impl CostModel {
    pub fn new(coefficients: CostCoefficients) -> Self {
        Self { c: coefficients }
    }

    pub fn scan(&self, cardinality: f64) -> f64 {
        self.c.cpu_factor * cardinality + self.c.access_overhead
    }

    /// Hash join building on `right`.
    pub fn hash_join(&self, left: &PlanNode, right: &PlanNode, output: f64) -> f64 {
        left.cost
            + right.cost
            + self.c.cpu_factor
                * (left.cardinality + self.c.hash_build_factor * right.cardinality + output)
            + self.c.join_step_overhead
    }

    /// Index lookups into a base relation; the inner side is never scanned.
    pub fn indexed_nested_loop(&self, left: &PlanNode, output: f64) -> f64 {
        left.cost
            + self.c.cpu_factor * (left.cardinality + output)
            + self.c.rand_io_factor * self.c.cpu_factor * output
            + self.c.access_overhead
            + self.c.join_step_overhead
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(CostCoefficients::default())
    }
}
