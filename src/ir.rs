//! Caller-facing query description.
//!
//! A [`QueryIR`] is the engine-agnostic request the compiler turns into SQL:
//! which model, which dimensions and measures, filters, ordering and
//! pagination. It is built fresh per execution and carries no identity
//! beyond the call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::TimeGrain;

/// Raw passthrough vs. semantic compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Raw,
    #[default]
    Semantic,
}

/// Filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "like")]
    Like,
}

/// Filter literal. Strings are quoted when rendered; numerics and booleans
/// are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<FilterValue>),
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::String(s.into())
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Int(n)
    }
}

impl From<f64> for FilterValue {
    fn from(f: f64) -> Self {
        FilterValue::Float(f)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

/// One filter condition over a dimension (row filter) or a measure
/// (post-aggregation filter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
    /// Granularity tag for time fields; non-day grains rewrite comparisons
    /// into half-open period intervals.
    #[serde(default)]
    pub granularity: Option<TimeGrain>,
}

impl FilterCondition {
    pub fn new(field: &str, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            granularity: None,
        }
    }

    pub fn eq(field: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn with_granularity(mut self, grain: TimeGrain) -> Self {
        self.granularity = Some(grain);
        self
    }
}

/// Sort direction for an order-by entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Order the result by an output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl OrderSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// The caller-facing query request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIR {
    #[serde(default)]
    pub mode: QueryMode,
    /// Target model name (semantic mode) or dataset id (raw mode).
    pub model: String,
    /// Raw-mode projection; empty means `*`.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    /// Post-aggregation filters over measure values.
    #[serde(default)]
    pub measure_filters: Vec<FilterCondition>,
    /// Per-dimension granularity overrides for time dimensions.
    #[serde(default)]
    pub granularity: BTreeMap<String, TimeGrain>,
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryIR {
    /// A semantic query against a model.
    pub fn semantic(model: &str) -> Self {
        Self {
            mode: QueryMode::Semantic,
            model: model.into(),
            columns: vec![],
            dimensions: vec![],
            measures: vec![],
            filters: vec![],
            measure_filters: vec![],
            granularity: BTreeMap::new(),
            order_by: vec![],
            limit: None,
            offset: None,
        }
    }

    /// A raw query against a dataset.
    pub fn raw(dataset: &str) -> Self {
        Self {
            mode: QueryMode::Raw,
            ..Self::semantic(dataset)
        }
    }

    pub fn with_column(mut self, column: &str) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn with_dimension(mut self, dimension: &str) -> Self {
        self.dimensions.push(dimension.into());
        self
    }

    pub fn with_measure(mut self, measure: &str) -> Self {
        self.measures.push(measure.into());
        self
    }

    pub fn with_filter(mut self, filter: FilterCondition) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_measure_filter(mut self, filter: FilterCondition) -> Self {
        self.measure_filters.push(filter);
        self
    }

    pub fn with_granularity(mut self, dimension: &str, grain: TimeGrain) -> Self {
        self.granularity.insert(dimension.into(), grain);
        self
    }

    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}
