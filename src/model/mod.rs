//! Semantic model types.
//!
//! A [`SemanticModel`] names a dataset and describes it in analytical terms:
//! dimensions to group by, measures to aggregate, joins to related models,
//! and an optional high-cardinality policy that pre-selects partitioned
//! execution. Models are loaded once by the registry and are immutable
//! during compilation.

mod dataset;
mod dimension;
mod join;
mod measure;

pub use dataset::{Dataset, DatasetSource};
pub use dimension::{Dimension, DimensionKind, TimeGrain};
pub use join::{Join, Relationship};
pub use measure::{Aggregation, Measure, NonAdditiveDimension, WindowChoice};

use serde::{Deserialize, Serialize};

/// Tag that marks a model as high-cardinality without a policy table.
pub const HIGH_CARDINALITY_TAG: &str = "high_cardinality";

/// Partitioning policy overrides for a high-cardinality model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighCardinalityPolicy {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub target_per_bucket: Option<u64>,
    #[serde(default)]
    pub threshold: Option<u64>,
    #[serde(default)]
    pub limit_multiplier: Option<u64>,
}

/// Static high-cardinality setting: a bare flag, or a policy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HighCardinality {
    Flag(bool),
    Policy(HighCardinalityPolicy),
}

impl HighCardinality {
    /// Whether this setting pre-selects partitioned execution.
    pub fn is_enabled(&self) -> bool {
        match self {
            HighCardinality::Flag(enabled) => *enabled,
            // A policy table means "on" unless it says enabled = false.
            HighCardinality::Policy(policy) => policy.enabled != Some(false),
        }
    }

    pub fn policy(&self) -> Option<&HighCardinalityPolicy> {
        match self {
            HighCardinality::Flag(_) => None,
            HighCardinality::Policy(policy) => Some(policy),
        }
    }
}

/// A semantic model: named dimensions, measures and joins over a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticModel {
    pub name: String,
    pub dataset: String,
    /// SQL alias for the fact relation; defaults to the model name.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub high_cardinality: Option<HighCardinality>,
}

impl SemanticModel {
    pub fn new(name: &str, dataset: &str) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            alias: None,
            dimensions: vec![],
            measures: vec![],
            joins: vec![],
            tags: vec![],
            high_cardinality: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_high_cardinality(mut self, setting: HighCardinality) -> Self {
        self.high_cardinality = Some(setting);
        self
    }

    /// The SQL alias for the fact relation.
    pub fn sql_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    pub fn join(&self, name: &str) -> Option<&Join> {
        self.joins.iter().find(|j| j.name == name)
    }

    /// Whether the static configuration pre-selects partitioned execution,
    /// independent of any live estimate.
    pub fn partitioning_preselected(&self) -> bool {
        if let Some(setting) = &self.high_cardinality {
            return setting.is_enabled();
        }
        self.tags.iter().any(|t| t == HIGH_CARDINALITY_TAG)
    }

    /// Planner overrides from the high-cardinality policy, if any.
    pub fn high_cardinality_policy(&self) -> Option<&HighCardinalityPolicy> {
        self.high_cardinality.as_ref().and_then(|s| s.policy())
    }
}
