//! Measure definitions.

use serde::{Deserialize, Serialize};

/// Aggregation kind of a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Count,
    CountDistinct,
    Avg,
    Min,
    Max,
    /// Formula over other measures, evaluated after the aggregation layer.
    Derived,
}

/// Which slice of the non-additive dimension represents a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowChoice {
    #[default]
    Max,
    Min,
    /// First in dimension order; equivalent to `min` of the ordering value.
    First,
    /// Last in dimension order; equivalent to `max` of the ordering value.
    Last,
}

impl WindowChoice {
    /// The aggregate used to pick the boundary value.
    pub fn boundary_function(&self) -> &'static str {
        match self {
            WindowChoice::Max | WindowChoice::Last => "max",
            WindowChoice::Min | WindowChoice::First => "min",
        }
    }
}

/// Marks a measure as semi-additive: it must not be summed across the named
/// dimension (typically a snapshot date). When that dimension is absent from
/// the query output, aggregation is restricted to one representative slice
/// per group instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonAdditiveDimension {
    pub dimension: String,
    #[serde(default)]
    pub window_choice: WindowChoice,
    /// Explicit grouping keys for the boundary computation. When empty, the
    /// query's requested dimensions (minus the non-additive one) are used.
    #[serde(default)]
    pub window_groupings: Vec<String>,
}

/// A measure of a semantic model.
///
/// For base aggregations `expr` is the aggregate argument (`v.valor`); for
/// `derived` it is a formula over other measures using `${name}` references
/// (`"${receita} / ${pedidos}"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub agg: Aggregation,
    pub expr: String,
    /// Row-filter predicate rendered as `FILTER (WHERE ...)` on the aggregate.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub non_additive_dimension: Option<NonAdditiveDimension>,
}

impl Measure {
    pub fn new(name: &str, agg: Aggregation, expr: &str) -> Self {
        Self {
            name: name.into(),
            agg,
            expr: expr.into(),
            filter: None,
            non_additive_dimension: None,
        }
    }

    pub fn sum(name: &str, expr: &str) -> Self {
        Self::new(name, Aggregation::Sum, expr)
    }

    pub fn derived(name: &str, formula: &str) -> Self {
        Self::new(name, Aggregation::Derived, formula)
    }

    pub fn with_filter(mut self, predicate: &str) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    pub fn with_non_additive(mut self, spec: NonAdditiveDimension) -> Self {
        self.non_additive_dimension = Some(spec);
        self
    }

    pub fn is_derived(&self) -> bool {
        self.agg == Aggregation::Derived
    }
}
