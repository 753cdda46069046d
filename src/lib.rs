//! facet - a semantic query compiler and adaptive runner for an embedded
//! analytical engine.
//!
//! Models declare dimensions, measures and joins over datasets; callers
//! describe queries in those terms and facet compiles them to DuckDB-dialect
//! SQL, decides whether the result is too wide to aggregate in one pass, and
//! executes either a single statement or a sequence of hash-bucket
//! statements behind one result stream.
//!
//! # Architecture
//!
//! ```text
//! QueryIR ──> SqlBuilder ──────────> SQL ──> QueryRunner ──> batches
//!                │                               │
//!                │ estimation SQL                │ on OOM / preselection
//!                └────────> SafetyPlanner <──────┘
//!                            (bucket grid)
//! ```
//!
//! - [`registry`]: models and datasets, loaded from TOML.
//! - [`ir`]: the caller-facing query description.
//! - [`sql`]: token-based SQL construction (expressions, queries).
//! - [`compile`]: [`compile::SqlBuilder`], semantic compilation.
//! - [`plan`]: [`plan::SafetyPlanner`], adaptive partition planning.
//! - [`run`]: [`run::QueryRunner`], execution with OOM fallback.

pub mod compile;
pub mod error;
pub mod ir;
pub mod model;
pub mod plan;
pub mod registry;
pub mod run;
pub mod sql;

pub mod prelude {
    pub use crate::compile::SqlBuilder;
    pub use crate::error::{CompileError, EngineError, QueryError};
    pub use crate::ir::{FilterCondition, FilterOp, OrderSpec, QueryIR};
    pub use crate::model::{Dimension, Measure, SemanticModel, TimeGrain};
    pub use crate::plan::{PartitionPlan, SafetyPlanner};
    pub use crate::registry::Registry;
    pub use crate::run::{Connection, QueryRunner, RunOptions};
}
