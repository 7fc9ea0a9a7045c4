//! Optimizer configuration that callers can serialize/deserialize.
//!
//! There is no process-wide mutable optimizer state: an `EnumerationConfig`
//! value is built once (defaults → environment → request → CLI), validated
//! with [`EnumerationConfig::validate`], and passed by reference into every
//! optimization call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Join-tree shape explored by the enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeShape {
    /// Extend one intermediate result by a base relation on either side.
    ZigZag,
    /// Extend one intermediate result by a base relation on the inner (right) side.
    LeftDeep,
    /// Also combine two multi-relation intermediates.
    Bushy,
}

impl fmt::Display for TreeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TreeShape::ZigZag => "zigZag",
            TreeShape::LeftDeep => "leftDeep",
            TreeShape::Bushy => "bushy",
        };
        f.write_str(s)
    }
}

impl FromStr for TreeShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zigZag" | "zigzag" | "zig_zag" => Ok(TreeShape::ZigZag),
            "leftDeep" | "leftdeep" | "left_deep" => Ok(TreeShape::LeftDeep),
            "bushy" => Ok(TreeShape::Bushy),
            other => Err(Error::Config(format!("unknown tree shape '{other}'"))),
        }
    }
}

/// Reordering strategy. Only bottom-up enumeration exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReorderMode {
    #[default]
    BottomUp,
}

impl FromStr for ReorderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bottomUp" | "bottomup" | "bottom_up" => Ok(ReorderMode::BottomUp),
            other => Err(Error::Config(format!("unknown reorder mode '{other}'"))),
        }
    }
}

/// Relative cost weights. `cpu_factor` is the unit: the cost of processing
/// one tuple once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostCoefficients {
    pub cpu_factor: f64,
    /// Extra per-row weight for inserting into a hash table.
    pub hash_build_factor: f64,
    /// Cost of fetching one document through an index, relative to a tuple.
    pub rand_io_factor: f64,
    /// Fixed weight charged for every relation access.
    pub access_overhead: f64,
    /// Fixed weight charged for every join step.
    pub join_step_overhead: f64,
}

impl Default for CostCoefficients {
    fn default() -> Self {
        Self {
            cpu_factor: 1.0,
            hash_build_factor: 2.0,
            rand_io_factor: 10.0,
            access_overhead: 1.0,
            join_step_overhead: 1.0,
        }
    }
}

impl CostCoefficients {
    fn validate(&self) -> Result<()> {
        let all = [
            ("cpuFactor", self.cpu_factor),
            ("hashBuildFactor", self.hash_build_factor),
            ("randIoFactor", self.rand_io_factor),
            ("accessOverhead", self.access_overhead),
            ("joinStepOverhead", self.join_step_overhead),
        ];
        for (name, v) in all {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::Config(format!(
                    "cost coefficient {name} must be finite and non-negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Base sampling seed used when `sampling_seed` is unset.
pub const DEFAULT_SAMPLING_SEED: u64 = 0x716a_6f69_6e5f_7364;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnumerationConfig {
    /// Master switch. When off, the default (pipeline-order) plan is used.
    pub enabled: bool,

    /// Use single-field unique indexes to compute exact join cardinalities.
    pub use_index_uniqueness: bool,

    /// Rows sampled per relation when estimating an edge's selectivity.
    pub sampling_size: usize,

    /// Inclusive window of subset levels (size − 1) enumerated in ALL-plans mode.
    pub min_subset_level: usize,
    pub max_subset_level: usize,

    pub reorder_mode: ReorderMode,
    pub tree_shape: TreeShape,

    /// Bound on runner-up candidates retained per subset in ALL-plans mode.
    pub max_rejected_per_subset: usize,

    /// Cardinality substituted when neither the catalog nor a hint knows a relation.
    pub default_cardinality: u64,

    /// Base seed for sampling. Unset means [`DEFAULT_SAMPLING_SEED`]; sampling
    /// is always reproducible so that every window sees the same estimates.
    pub sampling_seed: Option<u64>,

    /// Optional optimization deadline in milliseconds.
    pub timeout_ms: Option<u64>,

    pub cost: CostCoefficients,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_index_uniqueness: true,
            sampling_size: 1000,
            min_subset_level: 0,
            max_subset_level: 64,
            reorder_mode: ReorderMode::BottomUp,
            tree_shape: TreeShape::ZigZag,
            max_rejected_per_subset: 8,
            default_cardinality: 1000,
            sampling_seed: None,
            timeout_ms: None,
            cost: CostCoefficients::default(),
        }
    }
}

impl EnumerationConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `QJOIN_ENABLE_JOIN_OPTIMIZATION`: `true`/`false`
    /// - `QJOIN_USE_INDEX_UNIQUENESS`: `true`/`false`
    /// - `QJOIN_SAMPLING_SIZE`: rows sampled per relation
    /// - `QJOIN_MIN_SUBSET_LEVEL` / `QJOIN_MAX_SUBSET_LEVEL`: ALL-plans window
    /// - `QJOIN_TREE_SHAPE`: `zigZag`, `leftDeep` or `bushy`
    /// - `QJOIN_REORDER_MODE`: `bottomUp`
    /// - `QJOIN_MAX_REJECTED_PER_SUBSET`, `QJOIN_DEFAULT_CARDINALITY`
    /// - `QJOIN_SAMPLING_SEED`, `QJOIN_TIMEOUT_MS`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<bool>("QJOIN_ENABLE_JOIN_OPTIMIZATION") {
            cfg.enabled = v;
        }
        if let Some(v) = env_parse::<bool>("QJOIN_USE_INDEX_UNIQUENESS") {
            cfg.use_index_uniqueness = v;
        }
        if let Some(v) = env_parse::<usize>("QJOIN_SAMPLING_SIZE") {
            cfg.sampling_size = v;
        }
        if let Some(v) = env_parse::<usize>("QJOIN_MIN_SUBSET_LEVEL") {
            cfg.min_subset_level = v;
        }
        if let Some(v) = env_parse::<usize>("QJOIN_MAX_SUBSET_LEVEL") {
            cfg.max_subset_level = v;
        }
        if let Some(v) = env_parse::<TreeShape>("QJOIN_TREE_SHAPE") {
            cfg.tree_shape = v;
        }
        if let Some(v) = env_parse::<ReorderMode>("QJOIN_REORDER_MODE") {
            cfg.reorder_mode = v;
        }
        if let Some(v) = env_parse::<usize>("QJOIN_MAX_REJECTED_PER_SUBSET") {
            cfg.max_rejected_per_subset = v;
        }
        if let Some(v) = env_parse::<u64>("QJOIN_DEFAULT_CARDINALITY") {
            cfg.default_cardinality = v;
        }
        if let Some(v) = env_parse::<u64>("QJOIN_SAMPLING_SEED") {
            cfg.sampling_seed = Some(v);
        }
        if let Some(v) = env_parse::<u64>("QJOIN_TIMEOUT_MS") {
            cfg.timeout_ms = Some(v);
        }

        cfg
    }

    /// Check option ranges once at request entry.
    pub fn validate(&self) -> Result<()> {
        if self.sampling_size == 0 {
            return Err(Error::Config("samplingSize must be > 0".into()));
        }
        if self.max_subset_level < self.min_subset_level {
            return Err(Error::Config(format!(
                "maxSubsetLevel ({}) must be >= minSubsetLevel ({})",
                self.max_subset_level, self.min_subset_level
            )));
        }
        self.cost.validate()
    }

    /// Whether subset `level` (size − 1) is enumerated in ALL-plans mode.
    pub fn level_in_window(&self, level: usize) -> bool {
        (self.min_subset_level..=self.max_subset_level).contains(&level)
    }

    pub fn sampling_base_seed(&self) -> u64 {
        self.sampling_seed.unwrap_or(DEFAULT_SAMPLING_SEED)
    }

    pub fn with_window(mut self, min: usize, max: usize) -> Self {
        self.min_subset_level = min;
        self.max_subset_level = max;
        self
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EnumerationConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_sampling_and_inverted_window() {
        let cfg = EnumerationConfig {
            sampling_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = EnumerationConfig::default().with_window(3, 2);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_cost_coefficient() {
        let mut cfg = EnumerationConfig::default();
        cfg.cost.rand_io_factor = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: EnumerationConfig =
            serde_json::from_str(r#"{"treeShape":"leftDeep","samplingSize":100}"#).unwrap();
        assert_eq!(cfg.tree_shape, TreeShape::LeftDeep);
        assert_eq!(cfg.sampling_size, 100);
        assert!(cfg.use_index_uniqueness);
    }

    #[test]
    fn window_is_inclusive() {
        let cfg = EnumerationConfig::default().with_window(1, 2);
        assert!(!cfg.level_in_window(0));
        assert!(cfg.level_in_window(1));
        assert!(cfg.level_in_window(2));
        assert!(!cfg.level_in_window(3));
    }
}
