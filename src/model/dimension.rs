//! Dimension definitions.

use serde::{Deserialize, Serialize};

/// Semantic kind of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    #[default]
    Categorical,
    Time,
    Numerical,
}

/// Time granularity for truncation and period filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGrain {
    Day,
    Month,
    Quarter,
    Year,
}

impl TimeGrain {
    /// The unit string passed to `date_trunc`.
    pub fn date_trunc_unit(&self) -> &'static str {
        match self {
            TimeGrain::Day => "day",
            TimeGrain::Month => "month",
            TimeGrain::Quarter => "quarter",
            TimeGrain::Year => "year",
        }
    }
}

impl std::fmt::Display for TimeGrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.date_trunc_unit())
    }
}

/// A dimension of a semantic model.
///
/// `expr` is a SQL fragment evaluated against the model's relation (and its
/// join aliases), e.g. `v.uf` or `p.nome`. Dimensions whose expression lives
/// on a joined table carry the join's name in `join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default)]
    pub kind: DimensionKind,
    pub expr: String,
    #[serde(default)]
    pub join: Option<String>,
    /// Default granularity for time dimensions; a query may override it.
    #[serde(default)]
    pub granularity: Option<TimeGrain>,
}

impl Dimension {
    pub fn new(name: &str, expr: &str) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Categorical,
            expr: expr.into(),
            join: None,
            granularity: None,
        }
    }

    pub fn time(name: &str, expr: &str) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Time,
            expr: expr.into(),
            join: None,
            granularity: None,
        }
    }

    pub fn with_kind(mut self, kind: DimensionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_join(mut self, join: &str) -> Self {
        self.join = Some(join.into());
        self
    }

    pub fn with_granularity(mut self, grain: TimeGrain) -> Self {
        self.granularity = Some(grain);
        self
    }

    pub fn is_time(&self) -> bool {
        self.kind == DimensionKind::Time
    }
}
