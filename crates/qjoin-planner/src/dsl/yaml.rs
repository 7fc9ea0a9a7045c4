//! YAML form of a join request.
//!
//! Example:
//! ```yaml
//! config:
//!   treeShape: bushy
//!   samplingSeed: 7
//! relations:
//!   - name: orders
//!     fields: [id, cust]
//!     source: data/orders.csv
//!   - name: customers
//!     fields: [id]
//!     cardinalityHint: 100
//!     indexes:
//!       - { fields: [id], unique: true }
//! stages:
//!   - on: orders.cust = customers.id
//!     flatten: oneToOne
//!   - { leftRelation: orders, leftField: id, rightRelation: items, rightField: order }
//! ```
//!
//! `source` and `indexes` describe where the data lives; they are consumed by
//! whoever loads the relations, not by the optimizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qjoin_core::catalog::IndexDef;
use qjoin_core::config::{CostCoefficients, EnumerationConfig, ReorderMode, TreeShape};

use crate::error::{PlannerError, Result};
use crate::request::{Flatten, JoinRequest, JoinStage, RelationDecl};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDoc {
    #[serde(default)]
    pub config: Option<ConfigOverrides>,
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub stages: Vec<StageDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub cardinality_hint: Option<u64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageDef {
    /// `on: "left.field = right.field"`
    Predicate {
        on: String,
        #[serde(default)]
        flatten: Flatten,
    },
    Explicit(JoinStage),
}

/// Partial configuration; unset fields leave the base value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverrides {
    pub enabled: Option<bool>,
    pub use_index_uniqueness: Option<bool>,
    pub sampling_size: Option<usize>,
    pub min_subset_level: Option<usize>,
    pub max_subset_level: Option<usize>,
    pub reorder_mode: Option<ReorderMode>,
    pub tree_shape: Option<TreeShape>,
    pub max_rejected_per_subset: Option<usize>,
    pub default_cardinality: Option<u64>,
    pub sampling_seed: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub cost: Option<CostCoefficients>,
}

impl ConfigOverrides {
    pub fn apply(&self, cfg: &mut EnumerationConfig) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field {
                    cfg.$field = v;
                })*
            };
        }
        set!(
            enabled,
            use_index_uniqueness,
            sampling_size,
            min_subset_level,
            max_subset_level,
            reorder_mode,
            tree_shape,
            max_rejected_per_subset,
            default_cardinality,
            cost
        );
        if self.sampling_seed.is_some() {
            cfg.sampling_seed = self.sampling_seed;
        }
        if self.timeout_ms.is_some() {
            cfg.timeout_ms = self.timeout_ms;
        }
    }

    pub fn applied_to(&self, mut cfg: EnumerationConfig) -> EnumerationConfig {
        self.apply(&mut cfg);
        cfg
    }
}

/// A parsed request plus the loading hints that travel with it.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub request: JoinRequest,
    pub config: ConfigOverrides,
    /// Relation name → data file.
    pub sources: BTreeMap<String, String>,
    pub indexes: BTreeMap<String, Vec<IndexDef>>,
}

fn split_qualified(s: &str) -> Option<(&str, &str)> {
    let (rel, field) = s.trim().split_once('.')?;
    let (rel, field) = (rel.trim(), field.trim());
    (!rel.is_empty() && !field.is_empty()).then_some((rel, field))
}

fn parse_predicate(on: &str) -> Result<(String, String, String, String)> {
    let (lhs, rhs) = on
        .split_once('=')
        .ok_or_else(|| PlannerError::malformed(format!("expected 'a.x = b.y', got '{on}'")))?;
    let bad = || PlannerError::malformed(format!("expected 'a.x = b.y', got '{on}'"));
    let (lr, lf) = split_qualified(lhs).ok_or_else(bad)?;
    let (rr, rf) = split_qualified(rhs.trim_start_matches('=')).ok_or_else(bad)?;
    Ok((lr.into(), lf.into(), rr.into(), rf.into()))
}

impl StageDef {
    fn into_stage(self) -> Result<JoinStage> {
        match self {
            StageDef::Explicit(stage) => Ok(stage),
            StageDef::Predicate { on, flatten } => {
                let (lr, lf, rr, rf) = parse_predicate(&on)?;
                let mut stage = JoinStage::new(&lr, &lf, &rr, &rf);
                stage.flatten = flatten;
                Ok(stage)
            }
        }
    }
}

/// Parse a YAML request document.
pub fn parse_yaml_request(yaml_src: &str) -> Result<ParsedRequest> {
    let doc: RequestDoc = serde_yaml::from_str(yaml_src)?;

    let mut sources = BTreeMap::new();
    let mut indexes = BTreeMap::new();
    let mut request = JoinRequest::new();
    for rel in doc.relations {
        if let Some(src) = rel.source {
            sources.insert(rel.name.clone(), src);
        }
        if !rel.indexes.is_empty() {
            indexes.insert(rel.name.clone(), rel.indexes);
        }
        request.relations.push(RelationDecl {
            name: rel.name,
            fields: rel.fields,
            cardinality_hint: rel.cardinality_hint,
        });
    }
    for stage in doc.stages {
        request.stages.push(stage.into_stage()?);
    }

    Ok(ParsedRequest {
        request,
        config: doc.config.unwrap_or_default(),
        sources,
        indexes,
    })
}
