//! Input contract: normalized equi-join stage descriptors.
//!
//! A request lists the participating relations (with their declared fields
//! and an optional cardinality hint) and the ordered equi-join stages, as
//! produced by an upstream pipeline normalizer.

use serde::{Deserialize, Serialize};

/// What the flattening step after a join asserts about match multiplicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Flatten {
    /// Each probe row may match any number of foreign rows.
    #[default]
    OneToMany,
    /// Each probe row matches at most one foreign row.
    OneToOne,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDecl {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub cardinality_hint: Option<u64>,
}

impl RelationDecl {
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            cardinality_hint: None,
        }
    }

    pub fn with_hint(mut self, rows: u64) -> Self {
        self.cardinality_hint = Some(rows);
        self
    }
}

/// `left_relation.left_field = right_relation.right_field`. The right side
/// is the foreign (looked-up) relation of the original stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinStage {
    pub left_relation: String,
    pub right_relation: String,
    pub left_field: String,
    pub right_field: String,
    #[serde(default)]
    pub flatten: Flatten,
}

impl JoinStage {
    pub fn new(left: &str, left_field: &str, right: &str, right_field: &str) -> Self {
        Self {
            left_relation: left.to_string(),
            right_relation: right.to_string(),
            left_field: left_field.to_string(),
            right_field: right_field.to_string(),
            flatten: Flatten::OneToMany,
        }
    }

    pub fn one_to_one(mut self) -> Self {
        self.flatten = Flatten::OneToOne;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub relations: Vec<RelationDecl>,
    pub stages: Vec<JoinStage>,
}

impl JoinRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, decl: RelationDecl) -> Self {
        self.relations.push(decl);
        self
    }

    pub fn stage(mut self, stage: JoinStage) -> Self {
        self.stages.push(stage);
        self
    }
}
