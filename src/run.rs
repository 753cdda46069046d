//! Query execution: direct attempt, partitioned fallback.
//!
//! [`QueryRunner::run`] returns a stream of record batches. The happy path
//! is one statement straight through the engine. When that statement dies
//! with an out-of-memory error, the runner re-plans through the
//! [`SafetyPlanner`](crate::plan::SafetyPlanner) and replays the query as a
//! sequence of hash-bucket statements on the same connection, concatenating
//! their batches. Callers see one stream either way.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compile::SqlBuilder;
use crate::error::{EngineError, QueryError};
use crate::ir::{QueryIR, QueryMode};
use crate::plan::{PartitionPlan, SafetyPlanner};
use crate::registry::Registry;

/// A chunk of result rows produced by the engine.
pub trait RowBatch {
    fn row_count(&self) -> usize;
}

/// One scalar cell of a small result table.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Int(n) if *n >= 0 => Some(*n as u64),
            Scalar::UInt(n) => Some(*n),
            Scalar::Float(f) if *f >= 0.0 => Some(*f as u64),
            _ => None,
        }
    }
}

/// A small fully-materialized result, used for planner probes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Self { columns, rows }
    }

    /// The named column's value in the first row, as u64.
    pub fn u64(&self, column: &str) -> Option<u64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.first()?.get(index)?.as_u64()
    }
}

/// Streaming result of one statement.
pub type BatchStream<B> = Pin<Box<dyn Stream<Item = Result<B, EngineError>> + Send>>;

/// One engine connection. Statements on a connection run sequentially; the
/// runner never interleaves bucket statements.
#[async_trait]
pub trait Connection: Send + Sync {
    type Batch: RowBatch + Send + 'static;

    /// Execute a statement, streaming result batches.
    async fn send(&self, sql: &str) -> Result<BatchStream<Self::Batch>, EngineError>;

    /// Execute a statement and materialize the (small) result.
    async fn query(&self, sql: &str) -> Result<Table, EngineError>;

    /// Interrupt whatever the connection is currently executing.
    fn cancel(&self);
}

/// Per-invocation execution options.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Skip the direct attempt and go straight to the planner.
    pub force_partition: bool,
    /// Human-readable progress callback (planning, bucket i/n, retry).
    pub on_status: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn with_force_partition(mut self, force: bool) -> Self {
        self.force_partition = force;
        self
    }

    pub fn on_status(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn report(&self, message: &str) {
        info!("{message}");
        if let Some(callback) = &self.on_status {
            callback(message);
        }
    }
}

fn check_cancel<C: Connection>(options: &RunOptions, conn: &C) -> Result<(), QueryError> {
    if options.cancel.is_cancelled() {
        conn.cancel();
        return Err(QueryError::Cancelled);
    }
    Ok(())
}

/// Executes compiled queries against a connection.
#[derive(Debug, Clone, Copy)]
pub struct QueryRunner<'a> {
    registry: &'a Registry,
}

impl<'a> QueryRunner<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Run a query, yielding result batches.
    ///
    /// Cancellation is observed at every suspension point; a cancelled run
    /// ends with [`QueryError::Cancelled`] after interrupting the engine.
    pub fn run<C>(
        &self,
        conn: &'a C,
        ir: QueryIR,
        options: RunOptions,
    ) -> impl Stream<Item = Result<C::Batch, QueryError>> + 'a
    where
        C: Connection,
    {
        let registry = self.registry;
        try_stream! {
            let builder = SqlBuilder::new(registry);
            let planner = SafetyPlanner::new(registry);
            check_cancel(&options, conn)?;

            let preselected = match ir.mode {
                QueryMode::Semantic => registry.model(&ir.model)?.partitioning_preselected(),
                QueryMode::Raw => false,
            };

            // A static high-cardinality policy is a hint: the live estimate
            // still decides, and a below-threshold model runs direct. Only
            // an explicit caller request forces the grid.
            let mut plan: Option<PartitionPlan> = None;
            if preselected || options.force_partition {
                options.report("planning partitioned execution");
                let probed = planner
                    .plan_execution(conn, &ir, options.force_partition)
                    .await?;
                check_cancel(&options, conn)?;
                if probed.enabled {
                    plan = Some(probed);
                }
            }

            // Direct attempt. An out-of-memory failure before the first
            // batch is replayed through the partitioned path; once batches
            // have been delivered a retry would duplicate rows, so any
            // later failure propagates.
            if plan.is_none() {
                let sql = builder.build(&ir)?;
                options.report("executing query");
                let mut oom: Option<EngineError> = None;
                match conn.send(&sql).await {
                    Ok(mut stream) => {
                        let mut delivered = false;
                        loop {
                            check_cancel(&options, conn)?;
                            match stream.next().await {
                                Some(Ok(batch)) => {
                                    delivered = true;
                                    yield batch;
                                }
                                Some(Err(err)) if err.is_out_of_memory() && !delivered => {
                                    oom = Some(err);
                                    break;
                                }
                                Some(Err(err)) => Err(QueryError::Engine(err))?,
                                None => break,
                            }
                        }
                    }
                    Err(err) if err.is_out_of_memory() => oom = Some(err),
                    Err(err) => Err(QueryError::Engine(err))?,
                }

                if let Some(err) = oom {
                    warn!(error = %err, "direct execution hit the memory limit");
                    options.report("memory limit hit; retrying partitioned");
                    check_cancel(&options, conn)?;
                    let probed = planner.plan_execution(conn, &ir, true).await?;
                    if !probed.enabled {
                        // No group keys to hash on. Nothing left to try.
                        Err(QueryError::Engine(err))?;
                    }
                    plan = Some(probed);
                }
            }

            if let Some(plan) = plan {
                debug!(
                    buckets = plan.bucket_count,
                    keys = ?plan.bucket_keys,
                    estimated_groups = plan.estimated_groups,
                    "partitioned execution"
                );
                let mut remaining = ir.limit;
                for bucket in 0..plan.bucket_count {
                    check_cancel(&options, conn)?;
                    if remaining == Some(0) {
                        break;
                    }
                    let sql = builder.build_partitioned_query(
                        &ir,
                        &plan.bucket_keys,
                        plan.bucket_count,
                        bucket,
                        remaining,
                    )?;
                    options.report(&format!(
                        "bucket {}/{}",
                        bucket + 1,
                        plan.bucket_count
                    ));
                    let mut stream = conn.send(&sql).await.map_err(QueryError::Engine)?;
                    loop {
                        check_cancel(&options, conn)?;
                        let Some(batch) = stream.next().await else {
                            break;
                        };
                        let batch = batch.map_err(QueryError::Engine)?;
                        if let Some(quota) = remaining.as_mut() {
                            *quota = quota.saturating_sub(batch.row_count() as u64);
                        }
                        yield batch;
                    }
                    // Let other tasks on this runtime breathe between buckets.
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
