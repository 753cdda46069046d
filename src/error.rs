//! Error taxonomy for compilation and execution.
//!
//! Compilation errors are synchronous and fatal: no partial or best-effort
//! SQL is ever returned. Execution errors are classified by message content
//! so the runner can distinguish an out-of-memory failure (retried once
//! through the partitioned path) from everything else (propagated as-is).

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Result type for query compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while compiling a query description into SQL.
///
/// Unresolved-reference variants carry the name that failed to resolve;
/// unsupported-query variants describe the construct the compiler rejects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown model: '{0}'")]
    UnknownModel(String),

    #[error("unknown dataset: '{0}'")]
    UnknownDataset(String),

    #[error("unknown dimension '{dimension}' on model '{model}'")]
    UnknownDimension { model: String, dimension: String },

    #[error("unknown measure '{measure}' on model '{model}'")]
    UnknownMeasure { model: String, measure: String },

    #[error("unknown join '{join}' on model '{model}'")]
    UnknownJoin { model: String, join: String },

    /// A filter/order-by field that resolves against neither the requested
    /// dimensions nor the requested measures.
    #[error("field '{field}' is not part of the query output")]
    UnknownQueryField { field: String },

    /// Derived measures may reference other derived measures, but the
    /// reference graph must be acyclic.
    #[error("circular derived-measure reference: {}", path.join(" -> "))]
    DerivedCycle { path: Vec<String> },

    #[error("derived measure '{measure}': {message}")]
    InvalidFormula { measure: String, message: String },

    /// Two requested measures activate different non-additive dimensions
    /// (or the same dimension with different window choices).
    #[error("conflicting non-additive dimension specs: '{first}' vs '{second}'")]
    ConflictingNonAdditive { first: String, second: String },

    #[error("filter on '{field}': cannot parse '{value}' as a {granularity} period")]
    InvalidTimeLiteral {
        field: String,
        value: String,
        granularity: String,
    },
}

/// A statement the embedded engine rejected or failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("engine execution failed: {message}")]
pub struct EngineError {
    pub message: String,
}

static OOM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)out of memory|failed to allocate|memory limit|allocation fail|cannot allocate")
        .expect("invalid OOM pattern")
});

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Whether the failure message indicates memory exhaustion.
    ///
    /// The embedded engine has no structured error codes; allocation
    /// failures are recognizable only by message text.
    pub fn is_out_of_memory(&self) -> bool {
        OOM_PATTERN.is_match(&self.message)
    }
}

/// Top-level error for a `run()` invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Cooperative abort observed at a suspension point. A clean stop,
    /// not a failure to report.
    #[error("query cancelled")]
    Cancelled,
}
